use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::RelativeStrengthIndex;

use crate::domain::market::Candle;
use crate::domain::signal::SignalScore;
use crate::domain::signal::SignalKind;

#[derive(Debug, Clone, Copy)]
pub struct RsiParams {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

pub fn required_periods(params: &RsiParams) -> usize {
    params.period + 1
}

/// Standard Wilder RSI over `period` candles, fed fresh each evaluation
/// pass since the score must be a pure function of the candle window.
/// Below `oversold`: negative (buy pressure), scaled by
/// `(oversold - rsi)/30` clamped to `[-1, -0.1]`. Above `overbought`:
/// positive by symmetry. Neutral band: 0.
pub fn score(candles: &[Candle], params: &RsiParams) -> SignalScore {
    if candles.len() < required_periods(params) {
        return SignalScore {
            kind: SignalKind::Rsi,
            score: Decimal::ZERO,
            confidence: Decimal::ZERO,
            diagnostics: serde_json::json!({"reason": "insufficient_data"}),
        };
    }

    let Ok(mut rsi) = RelativeStrengthIndex::new(params.period) else {
        return SignalScore {
            kind: SignalKind::Rsi,
            score: Decimal::ZERO,
            confidence: Decimal::ZERO,
            diagnostics: serde_json::json!({"reason": "invalid_params"}),
        };
    };

    let mut last = 0.0;
    for c in candles {
        let Some(close) = c.close.to_f64() else {
            return nan_result();
        };
        last = rsi.next(close);
    }

    if !last.is_finite() {
        return nan_result();
    }

    let raw = if last < params.oversold {
        ((params.oversold - last) / 30.0).clamp(0.1, 1.0) * -1.0
    } else if last > params.overbought {
        ((last - params.overbought) / 30.0).clamp(0.1, 1.0)
    } else {
        0.0
    };

    SignalScore {
        kind: SignalKind::Rsi,
        score: Decimal::from_f64_retain(raw.clamp(-1.0, 1.0)).unwrap_or(Decimal::ZERO),
        confidence: Decimal::ONE,
        diagnostics: serde_json::json!({"rsi": last}),
    }
}

fn nan_result() -> SignalScore {
    SignalScore {
        kind: SignalKind::Rsi,
        score: Decimal::ZERO,
        confidence: Decimal::ZERO,
        diagnostics: serde_json::json!({"reason": "nan_or_inf"}),
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
    fn insufficient_data_scores_zero_with_zero_confidence() {
        let candles = vec![candle(dec!(100))];
        let s = score(&candles, &RsiParams::default());
        assert_eq!(s.score, Decimal::ZERO);
        assert_eq!(s.confidence, Decimal::ZERO);
    }

    #[test]
    fn sustained_downtrend_scores_negative() {
        let mut candles = Vec::new();
        let mut price = dec!(100);
        for _ in 0..30 {
            candles.push(candle(price));
            price -= dec!(1);
        }
        let s = score(&candles, &RsiParams::default());
        assert!(s.score < Decimal::ZERO, "expected buy pressure, got {}", s.score);
    }

    #[test]
    fn sustained_uptrend_scores_positive() {
        let mut candles = Vec::new();
        let mut price = dec!(100);
        for _ in 0..30 {
            candles.push(candle(price));
            price += dec!(1);
        }
        let s = score(&candles, &RsiParams::default());
        assert!(s.score > Decimal::ZERO, "expected sell pressure, got {}", s.score);
    }
}
