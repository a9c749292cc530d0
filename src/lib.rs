//! Scalpex: a signal-ensemble decision engine for short-horizon
//! crypto futures trading.
//!
//! The engine combines multi-timeframe indicator signals into ranked
//! directional decisions, sizes them under portfolio exposure limits,
//! and manages each resulting position through a deterministic
//! lifecycle state machine. Live feeds and historical replays share
//! one ordered event-source interface, so backtest decisions match
//! live decisions exactly.

pub mod config;
pub mod domain;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod persistence;
pub mod risk;

pub use config::AppConfig;
pub use domain::{
    CloseReason, Direction, EngineEvent, EnsembleDecision, FillConfirmation, LifecycleEvent,
    OrderIntent, Position, PositionId, PositionState, RejectReason, RiskPlan, SignalBatch,
    SignalReading,
};
pub use engine::{
    spawn_live, ChannelFeed, CollectingReporter, Engine, EventFeed, ExecutionGateway, LiveHandle,
    LogReporter, ReplayDriver, ReplayFeed, Reporter, SimGateway, SymbolWorker,
};
pub use ensemble::EnsembleCombiner;
pub use error::{EngineError, IntentError, LedgerError, Result};
pub use lifecycle::PositionManager;
pub use persistence::Snapshot;
pub use risk::{ExposureLedger, RiskSizer};
