pub mod gateway;
pub mod mock;
pub mod websocket;

pub use gateway::BinanceGateway;
pub use mock::MockGateway;
