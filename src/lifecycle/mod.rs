//! Position lifecycle management: the per-symbol state machine and
//! bounded intent retry state.

mod manager;
mod retry;

pub use manager::{Action, PositionManager};
pub use retry::{IntentTracker, PendingIntent, RetryOutcome};
