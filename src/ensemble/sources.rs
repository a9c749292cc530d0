//! Vote + strength formulas for the closed set of signal sources.
//!
//! Each source maps one [`SignalReading`] to a directional vote in
//! {-1, 0, +1} and a strength in [0, 1]. Every scaling constant comes
//! from [`EnsembleConfig`] so the formulas stay documented, testable
//! configuration rather than magic numbers.

use crate::config::EnsembleConfig;
use crate::domain::{IndicatorKind, SignalReading};

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Evaluate one reading into a (vote, strength) pair.
pub fn evaluate(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    match reading.indicator {
        IndicatorKind::Rsi => rsi(reading, cfg),
        IndicatorKind::EmaCross => ema_cross(reading, cfg),
        IndicatorKind::Bollinger => bollinger(reading, cfg),
        IndicatorKind::Vwap => vwap(reading, cfg),
        IndicatorKind::OrderFlow => order_flow(reading, cfg),
    }
}

/// RSI mean reversion: long below the oversold level, short above the
/// overbought level. Strength is the normalized distance beyond the
/// band; a divergence flag multiplies it by `divergence_boost`.
fn rsi(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    let value = reading.value;
    let (vote, raw) = if value <= cfg.rsi_oversold {
        (1, (cfg.rsi_oversold - value) / cfg.rsi_oversold)
    } else if value >= cfg.rsi_overbought {
        (-1, (value - cfg.rsi_overbought) / (100.0 - cfg.rsi_overbought))
    } else {
        return (0, 0.0);
    };
    let boosted = if reading.divergence {
        raw * cfg.divergence_boost
    } else {
        raw
    };
    (vote, clamp01(boosted))
}

/// EMA crossover momentum: vote follows the sign of the fast-slow
/// spread; strength is the spread magnitude over `ema_spread_scale`.
fn ema_cross(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    let spread = reading.value;
    if spread == 0.0 {
        return (0, 0.0);
    }
    let vote = if spread > 0.0 { 1 } else { -1 };
    (vote, clamp01(spread.abs() / cfg.ema_spread_scale))
}

/// Bollinger mean reversion: `value` is the band-relative position
/// ((price - mid) / half width). Beyond +/-1 the price is outside the
/// band; strength grows with the overshoot over `bollinger_scale`. A
/// squeeze-breakout flag scales strength by `squeeze_boost`.
fn bollinger(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    let pos = reading.value;
    let (vote, overshoot) = if pos <= -1.0 {
        (1, -1.0 - pos)
    } else if pos >= 1.0 {
        (-1, pos - 1.0)
    } else {
        return (0, 0.0);
    };
    let raw = overshoot / cfg.bollinger_scale;
    let boosted = if reading.divergence {
        raw * cfg.squeeze_boost
    } else {
        raw
    };
    (vote, clamp01(boosted))
}

/// VWAP reversion: `value` is the signed distance from VWAP as a
/// fraction of price; the vote points back toward VWAP once the
/// distance clears `vwap_min_distance`.
fn vwap(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    let distance = reading.value;
    if distance.abs() < cfg.vwap_min_distance {
        return (0, 0.0);
    }
    let vote = if distance > 0.0 { -1 } else { 1 };
    (vote, clamp01(distance.abs() / cfg.vwap_band_scale))
}

/// Order-flow imbalance: `value` is already a unit-interval imbalance
/// in [-1, 1]; it votes with its own sign once past `order_flow_floor`.
fn order_flow(reading: &SignalReading, cfg: &EnsembleConfig) -> (i8, f64) {
    let imbalance = reading.value;
    if imbalance.abs() < cfg.order_flow_floor {
        return (0, 0.0);
    }
    let vote = if imbalance > 0.0 { 1 } else { -1 };
    (vote, clamp01(imbalance.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::Utc;

    fn reading(indicator: IndicatorKind, value: f64, divergence: bool) -> SignalReading {
        SignalReading {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M5,
            indicator,
            timestamp: Utc::now(),
            value,
            divergence,
        }
    }

    #[test]
    fn rsi_votes_long_when_oversold() {
        let cfg = EnsembleConfig::default();
        let (vote, strength) = evaluate(&reading(IndicatorKind::Rsi, 20.0, false), &cfg);
        assert_eq!(vote, 1);
        assert!(strength > 0.0 && strength <= 1.0);
    }

    #[test]
    fn rsi_neutral_inside_band() {
        let cfg = EnsembleConfig::default();
        assert_eq!(evaluate(&reading(IndicatorKind::Rsi, 50.0, false), &cfg), (0, 0.0));
    }

    #[test]
    fn rsi_divergence_boosts_strength() {
        let cfg = EnsembleConfig::default();
        let (_, plain) = evaluate(&reading(IndicatorKind::Rsi, 22.0, false), &cfg);
        let (_, boosted) = evaluate(&reading(IndicatorKind::Rsi, 22.0, true), &cfg);
        assert!(boosted > plain);
    }

    #[test]
    fn ema_strength_saturates() {
        let cfg = EnsembleConfig::default();
        let (vote, strength) = evaluate(&reading(IndicatorKind::EmaCross, 0.05, false), &cfg);
        assert_eq!(vote, 1);
        assert_eq!(strength, 1.0);
    }

    #[test]
    fn bollinger_reverts_from_upper_band() {
        let cfg = EnsembleConfig::default();
        let (vote, _) = evaluate(&reading(IndicatorKind::Bollinger, 1.3, false), &cfg);
        assert_eq!(vote, -1);
    }

    #[test]
    fn vwap_ignores_small_distance() {
        let cfg = EnsembleConfig::default();
        assert_eq!(evaluate(&reading(IndicatorKind::Vwap, 0.0005, false), &cfg), (0, 0.0));
    }

    #[test]
    fn order_flow_votes_with_imbalance_sign() {
        let cfg = EnsembleConfig::default();
        let (vote, strength) = evaluate(&reading(IndicatorKind::OrderFlow, -0.6, false), &cfg);
        assert_eq!(vote, -1);
        assert!((strength - 0.6).abs() < 1e-9);
    }
}
