//! TradeDecider: given a `CONFIRMED(action)` from the evaluator, decides
//! whether to actually trade, with no side effects on the exchange. Gates
//! are applied in order; the first failure short-circuits with a verbatim
//! reason code, mirroring the teacher's early-return gating style in
//! `application::strategies::advanced` (there expressed as booleans; here
//! as `Result` so the reason survives to the control API).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::bot::{Bot, BotStatus};
use crate::domain::errors::reason_codes;
use crate::domain::signal::Action;

use crate::application::safety::{SafetyLimits, SafetyState};

#[derive(Debug, Clone, Copy)]
pub struct Sizing {
    pub size_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub approved: bool,
    pub reason: Option<&'static str>,
    pub sizing: Option<Sizing>,
}

impl Decision {
    fn rejected(reason: &'static str) -> Self {
        Self {
            approved: false,
            reason: Some(reason),
            sizing: None,
        }
    }
}

pub struct BalanceSnapshot {
    pub available_usd: Decimal,
    pub available_crypto: Decimal,
    pub last_price: Decimal,
}

pub struct TradeDecider;

impl TradeDecider {
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        bot: &Bot,
        action: Action,
        now: DateTime<Utc>,
        has_pending_trade: bool,
        last_completed_filled_at: Option<DateTime<Utc>>,
        balance: &BalanceSnapshot,
        min_exchange_lot: Decimal,
        safety: &SafetyState,
        safety_limits: &SafetyLimits,
    ) -> Decision {
        // Gate 1: bot running.
        if bot.status != BotStatus::Running {
            return Decision::rejected(reason_codes::BOT_NOT_RUNNING);
        }

        // Gate 2: no pending order.
        if has_pending_trade {
            return Decision::rejected(reason_codes::PENDING_ORDER_EXISTS);
        }

        // Gate 3: cooldown, measured from fill time.
        if let Some(filled_at) = last_completed_filled_at {
            let elapsed = (now - filled_at).num_seconds();
            if elapsed < bot.cooldown_seconds {
                return Decision::rejected(reason_codes::COOLDOWN_ACTIVE);
            }
        }

        // Gate 4: balance pre-check (skippable).
        if bot.skip_on_low_balance {
            match action {
                Action::Buy => {
                    let min_required = Decimal::new(5, 0).max(bot.position_size_usd * Decimal::new(1, 1));
                    if balance.available_usd < min_required {
                        return Decision::rejected(reason_codes::INSUFFICIENT_BALANCE);
                    }
                }
                Action::Sell => {
                    if balance.available_crypto < min_exchange_lot {
                        return Decision::rejected(reason_codes::INSUFFICIENT_BALANCE);
                    }
                }
                Action::Hold => {}
            }
        }

        // Gate 5: global safety.
        if let Err(reason) = safety.check(safety_limits) {
            return Decision::rejected(match reason {
                "emergency_stop" => reason_codes::EMERGENCY_STOP,
                "daily_trade_cap" => reason_codes::DAILY_TRADE_CAP,
                "daily_loss_cap" => reason_codes::DAILY_LOSS_CAP,
                _ => reason_codes::EMERGENCY_STOP,
            });
        }

        let sizing = match action {
            Action::Buy => Sizing {
                size_usd: bot.position_size_usd,
            },
            Action::Sell => {
                if balance.last_price.is_zero() {
                    return Decision::rejected(reason_codes::INSUFFICIENT_BALANCE);
                }
                let max_sellable_crypto = bot.position_size_usd / balance.last_price;
                let sell_crypto = balance.available_crypto.min(max_sellable_crypto);
                if sell_crypto < min_exchange_lot {
                    return Decision::rejected("below_min_sell");
                }
                Sizing {
                    size_usd: sell_crypto * balance.last_price,
                }
            }
            Action::Hold => return Decision::rejected(reason_codes::CONFIRMING),
        };

        Decision {
            approved: true,
            reason: None,
            sizing: Some(sizing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn bot() -> Bot {
        Bot {
            id: "b1".into(),
            name: "B1".into(),
            pair: "BTC-USD".into(),
            status: BotStatus::Running,
            signals: HashMap::new(),
            confirmation_seconds: 300,
            cooldown_seconds: 900,
            position_size_usd: dec!(10),
            buy_threshold: dec!(-0.05),
            sell_threshold: dec!(0.05),
            skip_on_low_balance: true,
            confirmation_start_at: None,
            last_action_being_confirmed: None,
            last_combined_score: None,
            last_evaluated_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn cooldown_respected_scenario() {
        let b = bot();
        let t0 = now();
        let balance = BalanceSnapshot {
            available_usd: dec!(1000),
            available_crypto: dec!(1),
            last_price: dec!(40000),
        };
        let safety = SafetyState::default();
        let limits = SafetyLimits {
            max_daily_loss_usd: dec!(1_000_000),
            max_daily_trades: 1000,
        };

        let d1 = TradeDecider::decide(
            &b,
            Action::Sell,
            t0 + ChronoDuration::seconds(600),
            false,
            Some(t0),
            &balance,
            dec!(0.0001),
            &safety,
            &limits,
        );
        assert_eq!(d1.reason, Some(reason_codes::COOLDOWN_ACTIVE));

        let d2 = TradeDecider::decide(
            &b,
            Action::Sell,
            t0 + ChronoDuration::seconds(901),
            false,
            Some(t0),
            &balance,
            dec!(0.0001),
            &safety,
            &limits,
        );
        assert!(d2.approved);
    }

    #[test]
    fn sell_with_zero_crypto_rejected_as_insufficient_balance() {
        let b = bot();
        let balance = BalanceSnapshot {
            available_usd: dec!(1000),
            available_crypto: Decimal::ZERO,
            last_price: dec!(40000),
        };
        let safety = SafetyState::default();
        let limits = SafetyLimits {
            max_daily_loss_usd: dec!(1_000_000),
            max_daily_trades: 1000,
        };
        let d = TradeDecider::decide(
            &b,
            Action::Sell,
            now(),
            false,
            None,
            &balance,
            dec!(0.0001),
            &safety,
            &limits,
        );
        assert_eq!(d.reason, Some(reason_codes::INSUFFICIENT_BALANCE));
    }

    #[test]
    fn pending_order_blocks_regardless_of_other_gates() {
        let b = bot();
        let balance = BalanceSnapshot {
            available_usd: dec!(1000),
            available_crypto: dec!(1),
            last_price: dec!(40000),
        };
        let safety = SafetyState::default();
        let limits = SafetyLimits {
            max_daily_loss_usd: dec!(1_000_000),
            max_daily_trades: 1000,
        };
        let d = TradeDecider::decide(
            &b,
            Action::Buy,
            now(),
            true,
            None,
            &balance,
            dec!(0.0001),
            &safety,
            &limits,
        );
        assert_eq!(d.reason, Some(reason_codes::PENDING_ORDER_EXISTS));
    }
}
