//! Global safety limits, modeled as an explicit value passed into the
//! decider rather than a hidden singleton. Generalizes the teacher's
//! `domain::risk::state::RiskState` (session/daily equity tracking) into
//! the emergency-stop flag and daily counters this spec calls for.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyState {
    pub emergency_stop: bool,
    pub daily_trade_count: u32,
    pub daily_realized_loss_usd: Decimal,
    pub reference_date: NaiveDate,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            emergency_stop: false,
            daily_trade_count: 0,
            daily_realized_loss_usd: Decimal::ZERO,
            reference_date: Utc::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SafetyLimits {
    pub max_daily_loss_usd: Decimal,
    pub max_daily_trades: u32,
}

impl SafetyState {
    /// Rolls daily counters over to a fresh reference date if the wall
    /// clock has advanced to a new day since the last reset.
    pub fn roll_if_new_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.reference_date {
            self.reference_date = today;
            self.daily_trade_count = 0;
            self.daily_realized_loss_usd = Decimal::ZERO;
        }
    }

    pub fn check(&self, limits: &SafetyLimits) -> Result<(), &'static str> {
        if self.emergency_stop {
            return Err("emergency_stop");
        }
        if self.daily_trade_count >= limits.max_daily_trades {
            return Err("daily_trade_cap");
        }
        if self.daily_realized_loss_usd >= limits.max_daily_loss_usd {
            return Err("daily_loss_cap");
        }
        Ok(())
    }

    pub fn record_trade(&mut self, realized_loss_usd: Decimal) {
        self.daily_trade_count += 1;
        if realized_loss_usd > Decimal::ZERO {
            self.daily_realized_loss_usd += realized_loss_usd;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn emergency_stop_blocks_regardless_of_counters() {
        let state = SafetyState {
            emergency_stop: true,
            ..Default::default()
        };
        let limits = SafetyLimits {
            max_daily_loss_usd: dec!(1000),
            max_daily_trades: 100,
        };
        assert_eq!(state.check(&limits), Err("emergency_stop"));
    }

    #[test]
    fn daily_trade_cap_trips_at_threshold() {
        let state = SafetyState {
            daily_trade_count: 10,
            ..Default::default()
        };
        let limits = SafetyLimits {
            max_daily_loss_usd: dec!(1000),
            max_daily_trades: 10,
        };
        assert_eq!(state.check(&limits), Err("daily_trade_cap"));
    }
}
