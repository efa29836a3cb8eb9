// System orchestrator
pub mod bootstrap;

// Control surface (no transport attached)
pub mod control;

// Realized P&L and position tracking
pub mod ledger;

// Market data caching
pub mod market_data;

// Global safety limits
pub mod safety;

// Signal scoring and evaluation
pub mod signals;

// Trade decisioning and execution
pub mod trading;
