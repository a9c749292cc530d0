use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Direction, IndicatorKind, Timeframe};

/// One source's contribution to an ensemble pass, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalContribution {
    pub indicator: IndicatorKind,
    pub timeframe: Timeframe,
    /// Directional vote in {-1, 0, +1}
    pub vote: i8,
    /// Strength in [0, 1]
    pub strength: f64,
    pub weight: f64,
}

/// The combined directional decision for one symbol at one instant.
///
/// Derived, not persisted beyond decision time except through the
/// audit snapshot it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDecision {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Normalized magnitude of the weighted vote sum, in [0, 1]
    pub confidence: f64,
    /// Contributing (non-stale) signals at decision time
    pub snapshot: Vec<SignalContribution>,
}

impl EnsembleDecision {
    pub fn flat(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            direction: Direction::Flat,
            confidence: 0.0,
            snapshot: Vec::new(),
        }
    }

    pub fn is_actionable(&self) -> bool {
        !self.direction.is_flat()
    }
}

/// Enumerated reasons a non-flat decision was declined.
///
/// Structured (never free text) so the metrics collaborator can
/// aggregate rejections by reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    ConfidenceBelowThreshold,
    ExposureCapExceeded,
    PositionLimitReached,
    TradingHalted,
    InvalidVolatility,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ConfidenceBelowThreshold => write!(f, "confidence-below-threshold"),
            RejectReason::ExposureCapExceeded => write!(f, "exposure-cap-exceeded"),
            RejectReason::PositionLimitReached => write!(f, "position-limit-reached"),
            RejectReason::TradingHalted => write!(f, "trading-halted"),
            RejectReason::InvalidVolatility => write!(f, "invalid-volatility"),
        }
    }
}
