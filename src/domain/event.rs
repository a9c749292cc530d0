use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PositionId, SignalReading};

/// One traded price observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Account equity as reported by the account collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub equity: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Volatility context supplied alongside signals; the sizing policy
/// derives stop distances from it rather than hardcoding them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityContext {
    /// ATR-like absolute spread in price units
    pub atr: Decimal,
}

/// A full set of indicator readings for one symbol at one instant,
/// with the price and volatility context needed to size a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalBatch {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<SignalReading>,
    pub price: Decimal,
    pub volatility: VolatilityContext,
}

/// The single timestamped event stream the engine consumes.
///
/// Replay and live feeds both deliver these in strict timestamp
/// order; the engine is mode-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Tick(PriceTick),
    Fill(super::FillConfirmation),
    GatewayReject {
        correlation_id: Uuid,
        symbol: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    Signals(SignalBatch),
    Equity(EquitySnapshot),
    FlattenAll {
        timestamp: DateTime<Utc>,
    },
    /// Operator acknowledgment that resumes a frozen position.
    Acknowledge {
        position_id: PositionId,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::Tick(t) => t.timestamp,
            EngineEvent::Fill(f) => f.timestamp,
            EngineEvent::GatewayReject { timestamp, .. } => *timestamp,
            EngineEvent::Signals(b) => b.timestamp,
            EngineEvent::Equity(e) => e.timestamp,
            EngineEvent::FlattenAll { timestamp } => *timestamp,
            EngineEvent::Acknowledge { timestamp, .. } => *timestamp,
        }
    }

    /// Symbol this event routes to; None for broadcast events.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            EngineEvent::Tick(t) => Some(&t.symbol),
            EngineEvent::Fill(f) => Some(&f.symbol),
            EngineEvent::GatewayReject { symbol, .. } => Some(symbol),
            EngineEvent::Signals(b) => Some(&b.symbol),
            EngineEvent::Equity(_)
            | EngineEvent::FlattenAll { .. }
            | EngineEvent::Acknowledge { .. } => None,
        }
    }
}
