pub mod core;
pub mod event_bus;
pub mod exchange;
pub mod mutex;
pub mod observability;
pub mod persistence;

pub use event_bus::EventBus;
