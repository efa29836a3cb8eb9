use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sum type over the signal kinds the evaluator knows how to score.
/// New kinds are added here and in the dispatch function in
/// `application::signals::evaluator`; no string-keyed registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Rsi,
    Ma,
    Macd,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Rsi => "RSI",
            SignalKind::Ma => "MA",
            SignalKind::Macd => "MACD",
        }
    }
}

/// The action a combined score resolves to. Sign convention across the
/// whole system: negative score = buy pressure, positive = sell pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Action {
    #[default]
    Hold,
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::Buy => "buy",
            Action::Sell => "sell",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "hold" => Ok(Action::Hold),
            _ => Err(()),
        }
    }
}

/// Qualitative bucket of `|combined_score|`, display-only. Never authorizes
/// a trade on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Temperature {
    Hot,
    Warm,
    Cool,
    Frozen,
}

impl Temperature {
    pub fn classify(abs_combined: Decimal, hot: Decimal, warm: Decimal, cool: Decimal) -> Self {
        if abs_combined >= hot {
            Temperature::Hot
        } else if abs_combined >= warm {
            Temperature::Warm
        } else if abs_combined >= cool {
            Temperature::Cool
        } else {
            Temperature::Frozen
        }
    }
}

/// Result of scoring a single signal: score in [-1, 1], a confidence in
/// [0, 1], and free-form diagnostics for the historical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub kind: SignalKind,
    pub score: Decimal,
    pub confidence: Decimal,
    pub diagnostics: serde_json::Value,
}

/// A historical record of one evaluation pass for a bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvaluation {
    pub bot_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub scores: Vec<SignalScore>,
    pub combined_score: Decimal,
    pub action: Action,
    pub confirming: bool,
    pub progress: Decimal,
}
