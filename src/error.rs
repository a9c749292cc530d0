use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::PositionId;

/// Main error type for the decision engine
#[derive(Error, Debug)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors (snapshots, replay files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Order intent errors
    #[error("Intent error: {0}")]
    Intent(#[from] IntentError),

    // Exposure ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid risk plan: {0}")]
    InvalidPlan(String),

    // Invariant violations are fatal for the affected position and
    // halt new entries globally (fail closed).
    #[error("Invariant violation on position {position_id}: {detail}")]
    InvariantViolation {
        position_id: PositionId,
        detail: String,
    },

    #[error("Engine halted: {0}")]
    Halted(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors on the order-intent emission path
#[derive(Error, Debug, Clone)]
pub enum IntentError {
    #[error("Gateway rejected intent {correlation_id}: {reason}")]
    GatewayRejected {
        correlation_id: uuid::Uuid,
        reason: String,
    },

    #[error("Retries exhausted for intent {correlation_id} after {attempts} attempts")]
    RetriesExhausted {
        correlation_id: uuid::Uuid,
        attempts: u32,
    },

    #[error("Intent timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Errors from the exposure ledger
///
/// These are programming-error conditions, not policy rejections.
/// Policy rejections are surfaced as [`crate::domain::RejectReason`].
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    #[error("Double release of reservation for position {position_id}")]
    DoubleRelease { position_id: PositionId },

    #[error("Unknown reservation for position {position_id}")]
    UnknownReservation { position_id: PositionId },

    #[error("Reduce of {delta} exceeds reservation {reserved} for position {position_id}")]
    ReduceExceedsReservation {
        position_id: PositionId,
        reserved: Decimal,
        delta: Decimal,
    },
}
