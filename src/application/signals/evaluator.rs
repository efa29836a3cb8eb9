use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::application::market_data::cache::MarketDataCache;
use crate::domain::bot::Bot;
use crate::domain::confirmation::ConfirmationState;
use crate::domain::market::Granularity;
use crate::domain::ports::{Clock, ExchangeGateway};
use crate::domain::signal::{Action, SignalEvaluation, SignalKind, SignalScore, Temperature};

use super::{macd, moving_average, rsi};

#[derive(Debug, Clone, Copy)]
pub struct TemperatureThresholds {
    pub hot: Decimal,
    pub warm: Decimal,
    pub cool: Decimal,
}

/// Produces, for one bot, a decision signal and a confirmation state, using
/// cached market data. Stateless: every field it needs (weights, thresholds,
/// the prior confirmation state) is passed in or read from the `Bot`.
pub struct SignalEvaluator {
    cache: Arc<MarketDataCache>,
    gateway: Arc<dyn ExchangeGateway>,
    clock: Arc<dyn Clock>,
    temperature: TemperatureThresholds,
}

impl SignalEvaluator {
    pub fn new(
        cache: Arc<MarketDataCache>,
        gateway: Arc<dyn ExchangeGateway>,
        clock: Arc<dyn Clock>,
        temperature: TemperatureThresholds,
    ) -> Self {
        Self {
            cache,
            gateway,
            clock,
            temperature,
        }
    }

    /// Runs one evaluation pass for `bot`. Fetches candles through the
    /// shared cache (single-flight + TTL), scores every enabled signal,
    /// aggregates, and advances the confirmation state machine. Returns the
    /// evaluation plus the bot's updated transient fields (callers persist
    /// them through `BotRepository::update_evaluation_state`).
    pub async fn evaluate(&self, bot: &Bot) -> anyhow::Result<(SignalEvaluation, ConfirmationState)> {
        let candles = self
            .cache
            .get(
                self.gateway.as_ref(),
                &bot.pair,
                Granularity::OneHour,
                200,
            )
            .await?;

        let mut scores = Vec::new();
        for (kind, config) in &bot.signals {
            if !config.enabled {
                continue;
            }
            let s = dispatch(*kind, &candles.candles, config);
            scores.push(s);
        }

        let combined: Decimal = scores
            .iter()
            .zip(bot.signals.values())
            .filter(|(s, _)| s.confidence > Decimal::ZERO)
            .map(|(s, cfg)| s.score * cfg.weight)
            .sum();

        let action = if combined <= bot.buy_threshold {
            Action::Buy
        } else if combined >= bot.sell_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let now = self.clock.now();
        let prior = bot.confirmation_state();
        let transition = prior.advance(action, now, bot.confirmation_seconds);

        let progress =
            Decimal::from_f64(transition.progress).unwrap_or(Decimal::ZERO);

        let evaluation = SignalEvaluation {
            bot_id: bot.id.clone(),
            evaluated_at: now,
            scores,
            combined_score: combined,
            action,
            confirming: matches!(transition.next, ConfirmationState::Confirming { .. }),
            progress,
        };

        Ok((evaluation, transition.next))
    }

    pub fn temperature_of(&self, combined: Decimal) -> Temperature {
        Temperature::classify(
            combined.abs(),
            self.temperature.hot,
            self.temperature.warm,
            self.temperature.cool,
        )
    }
}

fn dispatch(
    kind: SignalKind,
    candles: &[crate::domain::market::Candle],
    config: &crate::domain::bot::SignalConfig,
) -> SignalScore {
    match kind {
        SignalKind::Rsi => {
            let params = rsi::RsiParams {
                period: param_usize(config, "period", 14),
                oversold: param_f64(config, "oversold", 30.0),
                overbought: param_f64(config, "overbought", 70.0),
            };
            rsi::score(candles, &params)
        }
        SignalKind::Ma => {
            let params = moving_average::MaParams {
                fast_period: param_usize(config, "fast_period", 20),
                slow_period: param_usize(config, "slow_period", 50),
            };
            moving_average::score(candles, &params)
        }
        SignalKind::Macd => {
            let params = macd::MacdParams {
                fast_period: param_usize(config, "fast_period", 12),
                slow_period: param_usize(config, "slow_period", 26),
                signal_period: param_usize(config, "signal_period", 9),
                normalization_window: param_usize(config, "normalization_window", 20),
            };
            macd::score(candles, &params)
        }
    }
}

fn param_usize(config: &crate::domain::bot::SignalConfig, key: &str, default: usize) -> usize {
    config
        .params
        .get(key)
        .and_then(|d| d.to_string().parse::<usize>().ok())
        .unwrap_or(default)
}

fn param_f64(config: &crate::domain::bot::SignalConfig, key: &str, default: f64) -> f64 {
    config
        .params
        .get(key)
        .and_then(|d| rust_decimal::prelude::ToPrimitive::to_f64(d))
        .unwrap_or(default)
}
