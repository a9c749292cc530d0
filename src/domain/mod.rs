//! Shared data model: signals, decisions, plans, positions, orders,
//! and the engine event stream.

mod decision;
mod event;
mod order;
mod plan;
mod position;
mod signal;

pub use decision::{EnsembleDecision, RejectReason, SignalContribution};
pub use event::{EngineEvent, EquitySnapshot, PriceTick, SignalBatch, VolatilityContext};
pub use order::{FillConfirmation, IntentKind, OrderIntent, Side};
pub use plan::{RiskPlan, TakeProfitLeg, TrailingRule};
pub use position::{
    CloseReason, LifecycleEvent, Position, PositionId, PositionState, TransitionCause,
};
pub use signal::{Direction, IndicatorKind, SignalReading, Timeframe};
