use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::confirmation::ConfirmationState;
use crate::domain::signal::SignalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Running,
    Stopped,
    Error,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Running => "RUNNING",
            BotStatus::Stopped => "STOPPED",
            BotStatus::Error => "ERROR",
        }
    }
}

/// Per-signal weight and parameters, as configured on a bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub enabled: bool,
    pub weight: Decimal,
    pub params: HashMap<String, Decimal>,
}

/// A configured decision engine bound to one trading pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: String,
    pub name: String,
    pub pair: String,
    pub status: BotStatus,

    pub signals: HashMap<SignalKind, SignalConfig>,

    pub confirmation_seconds: i64,
    pub cooldown_seconds: i64,
    pub position_size_usd: Decimal,
    pub buy_threshold: Decimal,
    pub sell_threshold: Decimal,
    pub skip_on_low_balance: bool,

    /// Only `confirmation_start_at` and `last_action_being_confirmed` are
    /// persisted transient fields; this is rehydrated into a
    /// `ConfirmationState` by `SignalEvaluator` on load.
    pub confirmation_start_at: Option<DateTime<Utc>>,
    pub last_action_being_confirmed: Option<String>,
    pub last_combined_score: Option<Decimal>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl Bot {
    /// Validates that enabled signal weights sum to at most 1.0.
    pub fn validate_weights(&self) -> Result<(), String> {
        let sum: Decimal = self
            .signals
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.weight)
            .sum();
        if sum > Decimal::ONE {
            return Err(format!("enabled signal weights sum to {sum}, exceeds 1.0"));
        }
        Ok(())
    }

    pub fn confirmation_state(&self) -> ConfirmationState {
        match (&self.last_action_being_confirmed, self.confirmation_start_at) {
            (Some(action), Some(started_at)) => ConfirmationState::Confirming {
                action: action.parse().unwrap_or_default(),
                started_at,
            },
            _ => ConfirmationState::Idle,
        }
    }

    /// Resets confirmation atomically with a strategy/threshold change, per
    /// the bot config mutation policy. `position_size_usd` and
    /// `cooldown_seconds` changes must NOT call this.
    pub fn reset_confirmation(&mut self) {
        self.confirmation_start_at = None;
        self.last_action_being_confirmed = None;
    }
}
