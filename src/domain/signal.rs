use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    /// Signed representation: Long = +1, Short = -1, Flat = 0
    pub fn sign(&self) -> i32 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
            Direction::Flat => 0,
        }
    }

    pub fn from_sign(sign: f64) -> Self {
        if sign > 0.0 {
            Direction::Long
        } else if sign < 0.0 {
            Direction::Short
        } else {
            Direction::Flat
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Flat => Direction::Flat,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Direction::Flat)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::Flat => write!(f, "FLAT"),
        }
    }
}

/// Chart timeframe of a signal reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::M1 => write!(f, "1m"),
            Timeframe::M5 => write!(f, "5m"),
            Timeframe::M15 => write!(f, "15m"),
            Timeframe::H1 => write!(f, "1h"),
        }
    }
}

/// The closed set of signal sources feeding the ensemble.
///
/// New indicators are added by extending this enum, not by runtime
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    EmaCross,
    Bollinger,
    Vwap,
    OrderFlow,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Rsi => write!(f, "rsi"),
            IndicatorKind::EmaCross => write!(f, "ema_cross"),
            IndicatorKind::Bollinger => write!(f, "bollinger"),
            IndicatorKind::Vwap => write!(f, "vwap"),
            IndicatorKind::OrderFlow => write!(f, "order_flow"),
        }
    }
}

/// A single timestamped indicator reading, produced by the signal
/// source adapter. Immutable; consumed once per ensemble pass.
///
/// The meaning of `value` depends on the indicator:
/// - `Rsi`: the RSI level (0..100)
/// - `EmaCross`: fast-slow EMA spread as a fraction of price
/// - `Bollinger`: band-relative position ((price - mid) / half width)
/// - `Vwap`: distance from VWAP as a fraction of price
/// - `OrderFlow`: bid/ask imbalance in [-1, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReading {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub indicator: IndicatorKind,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Divergence (RSI) or squeeze-breakout (Bollinger) flag
    #[serde(default)]
    pub divergence: bool,
}
