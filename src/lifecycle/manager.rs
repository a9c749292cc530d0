//! Position lifecycle manager.
//!
//! Owns the state machine of every position for one symbol. Events
//! arrive in timestamp order; each transition is caused by exactly
//! one event (price tick or fill confirmation) and is deterministic
//! given that event and the prior state.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::domain::{
    CloseReason, FillConfirmation, IntentKind, LifecycleEvent, OrderIntent, Position, PositionId,
    PositionState, PriceTick, RiskPlan, TransitionCause,
};
use crate::error::EngineError;
use crate::lifecycle::retry::{IntentTracker, RetryOutcome};

/// Effects of applying one event, executed by the caller: intent
/// submission goes to the gateway, transitions to the reporter,
/// exposure updates to the ledger.
#[derive(Debug, Clone)]
pub enum Action {
    Submit(OrderIntent),
    Transition(LifecycleEvent),
    ReduceExposure {
        position_id: PositionId,
        delta: Decimal,
    },
    ReleaseExposure {
        position_id: PositionId,
    },
    Alert {
        position_id: PositionId,
        message: String,
    },
}

pub struct PositionManager {
    symbol: String,
    entry_timeout: Duration,
    /// Shared registry so persistence and flatten-all can observe open
    /// positions; this manager only ever touches its own symbol's ids.
    registry: Arc<DashMap<PositionId, Position>>,
    /// Insertion-ordered ids owned by this manager (deterministic
    /// iteration, unlike the registry)
    own: Vec<PositionId>,
    intents: IntentTracker,
    /// Correlation ids of fills already applied, keyed to the owning
    /// position so entries are pruned when it closes (idempotence)
    seen_fills: HashMap<Uuid, PositionId>,
    /// Most recent traded price seen for this symbol
    last_price: Option<Decimal>,
    /// PnL booked across closed positions
    realized_total: Decimal,
}

impl PositionManager {
    pub fn new(
        symbol: impl Into<String>,
        execution: &ExecutionConfig,
        registry: Arc<DashMap<PositionId, Position>>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            entry_timeout: Duration::seconds(execution.entry_timeout_secs),
            registry,
            own: Vec::new(),
            intents: IntentTracker::new(execution.max_retries, execution.retry_base_ms),
            seen_fills: HashMap::new(),
            last_price: None,
            realized_total: Decimal::ZERO,
        }
    }

    pub fn open_ids(&self) -> &[PositionId] {
        &self.own
    }

    pub fn realized_total(&self) -> Decimal {
        self.realized_total
    }

    /// Re-adopt a position restored from a snapshot.
    pub fn adopt(&mut self, position: Position) {
        let id = position.id;
        self.registry.insert(id, position);
        self.own.push(id);
    }

    /// Seed a new position from an accepted risk plan and emit its
    /// entry intent. The caller must already hold an exposure
    /// reservation for `id`.
    pub fn open(
        &mut self,
        id: PositionId,
        plan: RiskPlan,
        now: DateTime<Utc>,
    ) -> Result<Vec<Action>, EngineError> {
        plan.validate()?;
        let intent = OrderIntent::entry(&plan.symbol, plan.direction, plan.notional, plan.entry_price);
        let position = Position::from_plan(id, plan, now);
        info!(
            position_id = %id,
            symbol = %position.symbol,
            direction = %position.direction,
            notional = %position.initial_size,
            stop = %position.stop_price,
            "position opened (pending entry)"
        );
        self.registry.insert(id, position);
        self.own.push(id);
        self.intents.track(intent.clone(), id, None, None);
        Ok(vec![Action::Submit(intent)])
    }

    /// Apply a price tick to every position of this symbol.
    pub fn on_tick(&mut self, tick: &PriceTick) -> Vec<Action> {
        self.last_price = Some(tick.price);
        let mut actions = Vec::new();
        let mut closed = Vec::new();

        for id in self.own.clone() {
            let Some(mut pos) = self.registry.get_mut(&id) else {
                continue;
            };

            match pos.state {
                PositionState::PendingEntry => {
                    if tick.timestamp - pos.opened_at >= self.entry_timeout {
                        self.intents.cancel_position(id);
                        transition(
                            &mut pos,
                            PositionState::Closed(CloseReason::EntryTimeout),
                            TransitionCause::EntryTimeout,
                            tick.timestamp,
                            &mut actions,
                        );
                        actions.push(Action::ReleaseExposure { position_id: id });
                        closed.push(id);
                    }
                }
                PositionState::OpenFull
                | PositionState::PartialExit(_)
                | PositionState::Trailing => {
                    manage_open(
                        &mut pos,
                        tick.price,
                        tick.timestamp,
                        &mut self.intents,
                        &mut actions,
                    );
                }
                PositionState::Closed(_) => {}
            }
        }

        self.forget(&closed);

        for intent in self.intents.due(tick.timestamp) {
            debug!(correlation_id = %intent.correlation_id, "resubmitting intent after backoff");
            actions.push(Action::Submit(intent));
        }

        actions
    }

    /// Apply a fill confirmation. Re-delivered fills are ignored.
    pub fn on_fill(&mut self, fill: &FillConfirmation) -> Result<Vec<Action>, EngineError> {
        if self.seen_fills.contains_key(&fill.correlation_id) {
            debug!(correlation_id = %fill.correlation_id, "duplicate fill ignored");
            return Ok(Vec::new());
        }
        let Some(pending) = self.intents.complete(fill.correlation_id) else {
            warn!(correlation_id = %fill.correlation_id, "fill for unknown or cancelled intent");
            return Ok(Vec::new());
        };
        let id = pending.position_id;
        self.seen_fills.insert(fill.correlation_id, id);
        let Some(mut pos) = self.registry.get_mut(&id) else {
            warn!(position_id = %id, "fill for unknown position");
            return Ok(Vec::new());
        };

        let mut actions = Vec::new();
        let mut terminal = false;

        match pending.intent.kind {
            IntentKind::Entry => {
                // Partial entry fill: the unfilled remainder never
                // opened, so the position and its reservation shrink.
                if fill.filled_size < pos.initial_size {
                    let unfilled = pos.initial_size - fill.filled_size;
                    pos.initial_size = fill.filled_size;
                    pos.remaining_size = fill.filled_size;
                    actions.push(Action::ReduceExposure {
                        position_id: id,
                        delta: unfilled,
                    });
                }
                pos.entry_price = fill.fill_price;
                pos.high_water = fill.fill_price;
                transition(
                    &mut pos,
                    PositionState::OpenFull,
                    TransitionCause::EntryFilled,
                    fill.timestamp,
                    &mut actions,
                );
            }
            IntentKind::Reduce => {
                if fill.filled_size > pos.remaining_size {
                    return Err(EngineError::InvariantViolation {
                        position_id: id,
                        detail: format!(
                            "reduce fill {} exceeds remaining size {}",
                            fill.filled_size, pos.remaining_size
                        ),
                    });
                }
                pos.remaining_size -= fill.filled_size;
                let booked = pos.pnl_for(fill.filled_size, fill.fill_price);
                pos.realized_pnl += booked;
                let leg = pending.leg.unwrap_or(pos.next_leg as u8);
                pos.next_leg += 1;
                actions.push(Action::ReduceExposure {
                    position_id: id,
                    delta: fill.filled_size,
                });

                if pos.remaining_size.is_zero() {
                    transition(
                        &mut pos,
                        PositionState::Closed(CloseReason::TargetReached),
                        TransitionCause::TakeProfitFilled { leg },
                        fill.timestamp,
                        &mut actions,
                    );
                    actions.push(Action::ReleaseExposure { position_id: id });
                    self.realized_total += pos.realized_pnl;
                    terminal = true;
                } else if pos.state != PositionState::Trailing {
                    let exits = pos.next_leg as u8;
                    transition(
                        &mut pos,
                        PositionState::PartialExit(exits),
                        TransitionCause::TakeProfitFilled { leg },
                        fill.timestamp,
                        &mut actions,
                    );
                }
            }
            IntentKind::Close => {
                let reason = pending.close_reason.unwrap_or(CloseReason::StoppedOut);
                if fill.filled_size < pos.remaining_size {
                    // Partial close fill: book the filled part and
                    // immediately chase the remainder.
                    pos.remaining_size -= fill.filled_size;
                    let booked = pos.pnl_for(fill.filled_size, fill.fill_price);
                    pos.realized_pnl += booked;
                    actions.push(Action::ReduceExposure {
                        position_id: id,
                        delta: fill.filled_size,
                    });
                    let chase =
                        OrderIntent::close(&pos.symbol, pos.direction, pos.remaining_size);
                    self.intents.track(chase.clone(), id, Some(reason), None);
                    actions.push(Action::Submit(chase));
                } else {
                    let booked = pos.pnl_for(pos.remaining_size, fill.fill_price);
                    pos.realized_pnl += booked;
                    pos.remaining_size = Decimal::ZERO;
                    let cause = match reason {
                        CloseReason::Flattened => TransitionCause::FlattenAll,
                        _ => TransitionCause::StopFilled,
                    };
                    transition(
                        &mut pos,
                        PositionState::Closed(reason),
                        cause,
                        fill.timestamp,
                        &mut actions,
                    );
                    actions.push(Action::ReleaseExposure { position_id: id });
                    self.realized_total += pos.realized_pnl;
                    terminal = true;
                }
            }
        }

        // Ticks seen while this confirmation was pending were held
        // back; re-apply the latest price now that it has resolved.
        if !terminal && pos.state.is_open() {
            if let Some(price) = self.last_price {
                manage_open(&mut pos, price, fill.timestamp, &mut self.intents, &mut actions);
            }
        }

        drop(pos);
        if terminal {
            self.forget(&[id]);
        }
        Ok(actions)
    }

    /// Handle a gateway rejection of a submitted intent: schedule a
    /// bounded backoff retry, or escalate and freeze the position.
    pub fn on_gateway_reject(&mut self, correlation_id: Uuid, now: DateTime<Utc>) -> Vec<Action> {
        match self.intents.fail(correlation_id, now) {
            None => {
                warn!(%correlation_id, "rejection for unknown intent");
                Vec::new()
            }
            Some(RetryOutcome::Scheduled {
                position_id,
                at,
                attempt,
            }) => {
                warn!(%correlation_id, %position_id, attempt, retry_at = %at, "gateway rejected intent, retry scheduled");
                Vec::new()
            }
            Some(RetryOutcome::Exhausted {
                position_id,
                attempts,
            }) => {
                if let Some(mut pos) = self.registry.get_mut(&position_id) {
                    pos.frozen = true;
                }
                vec![Action::Alert {
                    position_id,
                    message: format!(
                        "order intent {correlation_id} abandoned after {attempts} attempts; automated management frozen"
                    ),
                }]
            }
        }
    }

    /// Clear a position's frozen flag after manual acknowledgment.
    /// Ignores ids this manager does not own, so the engine can fan
    /// the acknowledgment out to every symbol worker.
    pub fn acknowledge(&mut self, position_id: PositionId) {
        if !self.own.contains(&position_id) {
            return;
        }
        if let Some(mut pos) = self.registry.get_mut(&position_id) {
            info!(%position_id, "freeze acknowledged, automated management resumed");
            pos.frozen = false;
        }
    }

    /// Force every position toward closure: pending entries are
    /// abandoned outright, open positions get market-close intents.
    /// The caller halts the ledger before invoking this.
    pub fn flatten(&mut self, now: DateTime<Utc>) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut closed = Vec::new();

        for id in self.own.clone() {
            let Some(mut pos) = self.registry.get_mut(&id) else {
                continue;
            };
            match pos.state {
                PositionState::PendingEntry => {
                    self.intents.cancel_position(id);
                    transition(
                        &mut pos,
                        PositionState::Closed(CloseReason::Flattened),
                        TransitionCause::FlattenAll,
                        now,
                        &mut actions,
                    );
                    actions.push(Action::ReleaseExposure { position_id: id });
                    closed.push(id);
                }
                PositionState::OpenFull
                | PositionState::PartialExit(_)
                | PositionState::Trailing => {
                    self.intents.cancel_position(id);
                    let intent = OrderIntent::close(&pos.symbol, pos.direction, pos.remaining_size);
                    self.intents
                        .track(intent.clone(), id, Some(CloseReason::Flattened), None);
                    actions.push(Action::Submit(intent));
                }
                PositionState::Closed(_) => {}
            }
        }

        self.forget(&closed);
        info!(symbol = %self.symbol, "flatten-all issued");
        actions
    }

    fn forget(&mut self, ids: &[PositionId]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.registry.remove(id);
        }
        self.own.retain(|id| !ids.contains(id));
        // Fill ids of a closed position can never recur meaningfully;
        // dropping them keeps the dedup set bounded by open positions.
        self.seen_fills.retain(|_, owner| !ids.contains(owner));
    }
}

/// Evaluate one open position against a price. Stop before
/// take-profit: a tick gapping through both resolves stop-first
/// (capital preservation). Runs on every tick and again when a
/// pending confirmation resolves.
fn manage_open(
    pos: &mut Position,
    price: Decimal,
    now: DateTime<Utc>,
    intents: &mut IntentTracker,
    actions: &mut Vec<Action>,
) {
    if pos.crossed_favorably(price, pos.high_water) {
        pos.high_water = price;
    }

    // A frozen position (retries exhausted) makes no automated moves
    // until acknowledged.
    if pos.frozen {
        return;
    }
    // An exit intent is in flight; its confirmation re-runs this
    // evaluation, so the latest price is never lost.
    if intents.has_exit_pending(pos.id) {
        return;
    }

    if pos.crossed_stop(price) {
        let intent = OrderIntent::close(&pos.symbol, pos.direction, pos.remaining_size);
        debug!(position_id = %pos.id, %price, stop = %pos.stop_price, "stop crossed");
        intents.track(intent.clone(), pos.id, Some(CloseReason::StoppedOut), None);
        actions.push(Action::Submit(intent));
        return;
    }

    if let Some(leg) = pos.next_take_profit().cloned() {
        if pos.crossed_favorably(price, leg.price) {
            let size = (leg.fraction * pos.initial_size).min(pos.remaining_size);
            let intent = OrderIntent::reduce(&pos.symbol, pos.direction, size, leg.price);
            debug!(position_id = %pos.id, leg = pos.next_leg, price = %leg.price, "take-profit crossed");
            intents.track(intent.clone(), pos.id, None, Some(pos.next_leg as u8));
            actions.push(Action::Submit(intent));
            return;
        }
    }

    maybe_trail(pos, now, actions);
}

/// Advance the stop once trailing has activated; monotonic tightening
/// only. The first advance is the one lifecycle transition into
/// `Trailing`; later advances mutate the stop in place.
fn maybe_trail(pos: &mut Position, now: DateTime<Utc>, actions: &mut Vec<Action>) {
    let stop_distance = pos.plan.stop_distance();
    let activation = pos.plan.trailing.activation_multiple * stop_distance;
    let gain = pos.peak_gain();
    if gain < activation || activation.is_zero() {
        return;
    }

    let locked = pos.plan.trailing.lock_fraction * gain;
    let candidate = match pos.direction {
        crate::domain::Direction::Long => pos.entry_price + locked,
        crate::domain::Direction::Short => pos.entry_price - locked,
        crate::domain::Direction::Flat => return,
    };
    let tighter = match pos.direction {
        crate::domain::Direction::Long => candidate > pos.stop_price,
        crate::domain::Direction::Short => candidate < pos.stop_price,
        crate::domain::Direction::Flat => false,
    };
    if !tighter {
        return;
    }

    debug!(position_id = %pos.id, old = %pos.stop_price, new = %candidate, "trailing stop advanced");
    pos.stop_price = candidate;
    if pos.state != PositionState::Trailing {
        transition(
            pos,
            PositionState::Trailing,
            TransitionCause::TrailingActivated,
            now,
            actions,
        );
    }
}

fn transition(
    pos: &mut Position,
    to: PositionState,
    cause: TransitionCause,
    timestamp: DateTime<Utc>,
    actions: &mut Vec<Action>,
) {
    let from = pos.state;
    pos.state = to;
    info!(
        position_id = %pos.id,
        symbol = %pos.symbol,
        %from,
        %to,
        "position transition"
    );
    actions.push(Action::Transition(LifecycleEvent {
        position_id: pos.id,
        symbol: pos.symbol.clone(),
        from,
        to,
        timestamp,
        cause,
    }));
}
