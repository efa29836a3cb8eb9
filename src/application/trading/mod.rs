pub mod decider;
pub mod executor;
pub mod order_monitor;
pub mod sweeper;

pub use decider::TradeDecider;
pub use executor::TradeExecutor;
pub use order_monitor::OrderMonitor;
pub use sweeper::ReconciliationSweeper;
