pub mod evaluator;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use evaluator::{SignalEvaluator, TemperatureThresholds};
