// Bot configuration and lifecycle
pub mod bot;

// Confirmation state machine
pub mod confirmation;

// Domain-specific error types
pub mod errors;

// In-process events fanned out on the EventBus
pub mod events;

// Tickers, candles, account balances
pub mod market;

// Port interfaces (ExchangeGateway, Clock)
pub mod ports;

// Repository traits (BotRepository, TradeRepository)
pub mod repositories;

// Signal kinds, scoring results, temperature classification
pub mod signal;

// Trade records and status
pub mod trade;
