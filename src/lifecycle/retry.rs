//! Bounded retry state for pending order intents.
//!
//! Each intent awaiting confirmation is tracked with an attempt count
//! and an explicit next-retry time, instead of a blocking retry loop.
//! Backoff doubles per attempt from a configured base delay.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{CloseReason, IntentKind, OrderIntent, PositionId};

#[derive(Debug, Clone)]
pub struct PendingIntent {
    pub intent: OrderIntent,
    pub position_id: PositionId,
    /// Submission attempts so far (the initial submit counts)
    pub attempts: u32,
    /// When the next resubmission is due, if a retry is scheduled
    pub next_retry_at: Option<DateTime<Utc>>,
    /// For close intents: the terminal reason their fill will carry
    pub close_reason: Option<CloseReason>,
    /// For reduce intents: the take-profit leg being filled
    pub leg: Option<u8>,
}

#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Scheduled {
        position_id: PositionId,
        at: DateTime<Utc>,
        attempt: u32,
    },
    Exhausted {
        position_id: PositionId,
        attempts: u32,
    },
}

pub struct IntentTracker {
    max_attempts: u32,
    base_delay_ms: u64,
    pending: HashMap<Uuid, PendingIntent>,
}

impl IntentTracker {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            pending: HashMap::new(),
        }
    }

    pub fn track(
        &mut self,
        intent: OrderIntent,
        position_id: PositionId,
        close_reason: Option<CloseReason>,
        leg: Option<u8>,
    ) {
        self.pending.insert(
            intent.correlation_id,
            PendingIntent {
                intent,
                position_id,
                attempts: 1,
                next_retry_at: None,
                close_reason,
                leg,
            },
        );
    }

    /// Remove and return a pending intent once its fill confirms.
    pub fn complete(&mut self, correlation_id: Uuid) -> Option<PendingIntent> {
        self.pending.remove(&correlation_id)
    }

    /// Record a gateway rejection: schedule a backoff retry, or drop
    /// the intent once the attempt bound is exhausted.
    pub fn fail(&mut self, correlation_id: Uuid, now: DateTime<Utc>) -> Option<RetryOutcome> {
        let entry = self.pending.get_mut(&correlation_id)?;
        if entry.attempts >= self.max_attempts {
            let outcome = RetryOutcome::Exhausted {
                position_id: entry.position_id,
                attempts: entry.attempts,
            };
            self.pending.remove(&correlation_id);
            return Some(outcome);
        }
        entry.attempts += 1;
        // 100ms, 200ms, 400ms, ... per additional attempt
        let delay = self.base_delay_ms << (entry.attempts - 2).min(16);
        let at = now + Duration::milliseconds(delay as i64);
        entry.next_retry_at = Some(at);
        Some(RetryOutcome::Scheduled {
            position_id: entry.position_id,
            at,
            attempt: entry.attempts,
        })
    }

    /// Intents whose scheduled retry time has arrived. Each is
    /// returned once; a further failure must reschedule it.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<OrderIntent> {
        let mut due = Vec::new();
        for entry in self.pending.values_mut() {
            if let Some(at) = entry.next_retry_at {
                if at <= now {
                    entry.next_retry_at = None;
                    due.push(entry.intent.clone());
                }
            }
        }
        // Stable ordering for deterministic replay
        due.sort_by_key(|i| i.correlation_id);
        due
    }

    /// True if the position has a reduce/close intent awaiting
    /// confirmation (new exit emission must wait for it).
    pub fn has_exit_pending(&self, position_id: PositionId) -> bool {
        self.pending
            .values()
            .any(|p| p.position_id == position_id && p.intent.kind != IntentKind::Entry)
    }

    /// Drop all tracked intents for a position (timeout, flatten).
    pub fn cancel_position(&mut self, position_id: PositionId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.position_id != position_id);
        before - self.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
