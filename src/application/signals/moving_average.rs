use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

use crate::domain::market::Candle;
use crate::domain::signal::{SignalKind, SignalScore};

#[derive(Debug, Clone, Copy)]
pub struct MaParams {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for MaParams {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
        }
    }
}

pub fn required_periods(params: &MaParams) -> usize {
    params.slow_period
}

/// `score = clip(-1, 1, 2/(1+exp(-2*sep%))-1)` where
/// `sep% = (fast - slow)/slow * 100`. Fast above slow is bullish, so the
/// sign of `sep%` is flipped before scoring: buy pressure is negative.
pub fn score(candles: &[Candle], params: &MaParams) -> SignalScore {
    if candles.len() < required_periods(params) {
        return zero(SignalKind::Ma, "insufficient_data");
    }

    let (Ok(mut fast), Ok(mut slow)) = (
        SimpleMovingAverage::new(params.fast_period),
        SimpleMovingAverage::new(params.slow_period),
    ) else {
        return zero(SignalKind::Ma, "invalid_params");
    };

    let (mut fast_val, mut slow_val) = (0.0, 0.0);
    for c in candles {
        let Some(close) = c.close.to_f64() else {
            return zero(SignalKind::Ma, "nan_or_inf");
        };
        fast_val = fast.next(close);
        slow_val = slow.next(close);
    }

    if !fast_val.is_finite() || !slow_val.is_finite() || slow_val == 0.0 {
        return zero(SignalKind::Ma, "nan_or_inf");
    }

    let sep_pct = (fast_val - slow_val) / slow_val * 100.0;
    let bullish_negative = -sep_pct;
    let raw = 2.0 / (1.0 + (-2.0 * bullish_negative).exp()) - 1.0;

    SignalScore {
        kind: SignalKind::Ma,
        score: Decimal::from_f64_retain(raw.clamp(-1.0, 1.0)).unwrap_or(Decimal::ZERO),
        confidence: Decimal::ONE,
        diagnostics: serde_json::json!({"fast": fast_val, "slow": slow_val, "sep_pct": sep_pct}),
    }
}

fn zero(kind: SignalKind, reason: &str) -> SignalScore {
    SignalScore {
        kind,
        score: Decimal::ZERO,
        confidence: Decimal::ZERO,
        diagnostics: serde_json::json!({"reason": reason}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Candle {
        Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fast_above_slow_is_buy_pressure_negative() {
        let mut candles = Vec::new();
        let mut price = dec!(100);
        for _ in 0..60 {
            candles.push(candle(price));
            price += dec!(1);
        }
        let s = score(&candles, &MaParams::default());
        assert!(s.score < Decimal::ZERO, "got {}", s.score);
    }

    #[test]
    fn insufficient_data_is_disabled() {
        let candles = vec![candle(dec!(100)); 5];
        let s = score(&candles, &MaParams::default());
        assert_eq!(s.confidence, Decimal::ZERO);
    }
}
