use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use ta::Next;
use ta::indicators::MovingAverageConvergenceDivergence;

use crate::domain::market::Candle;
use crate::domain::signal::{SignalKind, SignalScore};

#[derive(Debug, Clone, Copy)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    /// Window over which the rolling absolute mean of the histogram
    /// normalizes the raw score.
    pub normalization_window: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            normalization_window: 20,
        }
    }
}

pub fn required_periods(params: &MacdParams) -> usize {
    params.slow_period + params.signal_period + params.normalization_window
}

/// Computes MACD line, signal line, histogram. Score combines histogram
/// magnitude and the sign of the histogram, normalized by a recent rolling
/// absolute mean, clipped to `[-1, 1]`. Same sign convention as the other
/// signals: buy pressure negative.
pub fn score(candles: &[Candle], params: &MacdParams) -> SignalScore {
    if candles.len() < required_periods(params) {
        return zero("insufficient_data");
    }

    let Ok(mut macd) = MovingAverageConvergenceDivergence::new(
        params.fast_period,
        params.slow_period,
        params.signal_period,
    ) else {
        return zero("invalid_params");
    };

    let mut histograms: Vec<f64> = Vec::with_capacity(candles.len());
    for c in candles {
        let Some(close) = c.close.to_f64() else {
            return zero("nan_or_inf");
        };
        let out = macd.next(close);
        histograms.push(out.histogram);
    }

    let Some(&last_hist) = histograms.last() else {
        return zero("insufficient_data");
    };
    if !last_hist.is_finite() {
        return zero("nan_or_inf");
    }

    let window = &histograms[histograms.len().saturating_sub(params.normalization_window)..];
    let rolling_abs_mean = window.iter().map(|h| h.abs()).sum::<f64>() / window.len() as f64;

    let raw = if rolling_abs_mean > 0.0 {
        // Bullish crossovers (positive histogram) are buy pressure, hence
        // the sign flip to keep the system-wide convention.
        -(last_hist / rolling_abs_mean)
    } else {
        0.0
    };

    SignalScore {
        kind: SignalKind::Macd,
        score: Decimal::from_f64_retain(raw.clamp(-1.0, 1.0)).unwrap_or(Decimal::ZERO),
        confidence: Decimal::ONE,
        diagnostics: serde_json::json!({"histogram": last_hist, "rolling_abs_mean": rolling_abs_mean}),
    }
}

fn zero(reason: &str) -> SignalScore {
    SignalScore {
        kind: SignalKind::Macd,
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
    fn insufficient_data_is_disabled() {
        let candles = vec![candle(dec!(100)); 10];
        let s = score(&candles, &MacdParams::default());
        assert_eq!(s.confidence, Decimal::ZERO);
    }

    #[test]
    fn score_stays_within_bounds() {
        let mut candles = Vec::new();
        let mut price = dec!(100);
        for i in 0..80 {
            price += if i % 2 == 0 { dec!(2) } else { dec!(-1) };
            candles.push(candle(price));
        }
        let s = score(&candles, &MacdParams::default());
        assert!(s.score >= dec!(-1) && s.score <= dec!(1));
    }
}
