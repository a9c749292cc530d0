//! Per-symbol event processing.
//!
//! One worker owns all positions of one symbol and applies that
//! symbol's events strictly in arrival order. Workers for different
//! symbols are independent; the exposure ledger is the only shared
//! mutable resource between them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::AppConfig;
use crate::domain::{EngineEvent, Position, PositionId, RiskPlan, SignalBatch};
use crate::ensemble::EnsembleCombiner;
use crate::error::{EngineError, Result};
use crate::lifecycle::{Action, PositionManager};
use crate::risk::{ExposureLedger, RiskSizer};

use super::gateway::ExecutionGateway;
use super::reporter::Reporter;

pub struct SymbolWorker {
    symbol: String,
    combiner: EnsembleCombiner,
    sizer: RiskSizer,
    manager: PositionManager,
    ledger: Arc<ExposureLedger>,
    gateway: Arc<dyn ExecutionGateway>,
    reporter: Arc<dyn Reporter>,
}

impl SymbolWorker {
    pub fn new(
        symbol: impl Into<String>,
        config: &AppConfig,
        registry: Arc<DashMap<PositionId, Position>>,
        ledger: Arc<ExposureLedger>,
        gateway: Arc<dyn ExecutionGateway>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            combiner: EnsembleCombiner::new(config.ensemble.clone(), &config.engine),
            sizer: RiskSizer::new(config.risk.clone()),
            manager: PositionManager::new(&symbol, &config.execution, registry),
            symbol,
            ledger,
            gateway,
            reporter,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Re-adopt a restored position after a snapshot load.
    pub fn adopt(&mut self, position: Position) {
        self.manager.adopt(position);
    }

    /// Clear a frozen position's flag after manual acknowledgment.
    pub fn acknowledge(&mut self, position_id: PositionId) {
        self.manager.acknowledge(position_id);
    }

    /// Apply one event for this symbol.
    pub async fn handle_event(&mut self, event: &EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Tick(tick) => {
                let actions = self.manager.on_tick(tick);
                self.execute(actions, tick.timestamp).await
            }
            EngineEvent::Fill(fill) => match self.manager.on_fill(fill) {
                Ok(actions) => self.execute(actions, fill.timestamp).await,
                Err(e) => self.fail_closed(e),
            },
            EngineEvent::GatewayReject {
                correlation_id,
                timestamp,
                reason,
                ..
            } => {
                warn!(%correlation_id, %reason, "gateway rejection event");
                let actions = self.manager.on_gateway_reject(*correlation_id, *timestamp);
                self.execute(actions, *timestamp).await
            }
            EngineEvent::Signals(batch) => self.on_signals(batch).await,
            EngineEvent::Equity(snapshot) => {
                self.ledger.set_equity(snapshot.equity);
                Ok(())
            }
            EngineEvent::FlattenAll { timestamp } => {
                // The halt takes the ledger lock, so no concurrent
                // entry can race the sweep.
                self.ledger.halt("flatten-all");
                if let Err(e) = self.gateway.cancel_all(&self.symbol).await {
                    warn!(symbol = %self.symbol, error = %e, "cancel-all failed");
                }
                let actions = self.manager.flatten(*timestamp);
                self.execute(actions, *timestamp).await
            }
            EngineEvent::Acknowledge { position_id, .. } => {
                self.manager.acknowledge(*position_id);
                Ok(())
            }
        }
    }

    /// Run one full ensemble pass: combine, size, reserve, open.
    async fn on_signals(&mut self, batch: &SignalBatch) -> Result<()> {
        for stale in self.combiner.stale(&batch.readings, batch.timestamp) {
            self.reporter.data_quality(stale);
        }

        let decision = self
            .combiner
            .combine(&self.symbol, &batch.readings, batch.timestamp);
        if !decision.is_actionable() {
            debug!(symbol = %self.symbol, "ensemble pass flat, no trade");
            return Ok(());
        }

        let plan = match self.sizer.evaluate(
            &decision,
            batch.price,
            &batch.volatility,
            self.ledger.equity(),
        ) {
            Ok(plan) => plan,
            Err(reason) => {
                self.reporter.rejection(&self.symbol, reason);
                return Ok(());
            }
        };

        self.try_open(plan, batch.timestamp).await
    }

    async fn try_open(&mut self, plan: RiskPlan, now: DateTime<Utc>) -> Result<()> {
        let id = PositionId::new();
        if let Err(reason) = self.ledger.try_reserve(id, plan.notional) {
            self.reporter.rejection(&self.symbol, reason);
            return Ok(());
        }
        match self.manager.open(id, plan, now) {
            Ok(actions) => self.execute(actions, now).await,
            Err(e) => {
                // The plan never became a position; hand back the
                // reservation before surfacing the error.
                let _ = self.ledger.release(id);
                Err(e)
            }
        }
    }

    /// Apply the effects of a batch of lifecycle actions. Gateway
    /// rejections at submit time feed straight back into the retry
    /// state, which may produce further actions.
    async fn execute(&mut self, actions: Vec<Action>, now: DateTime<Utc>) -> Result<()> {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Submit(intent) => {
                    if let Err(e) = self.gateway.submit(&intent).await {
                        warn!(correlation_id = %intent.correlation_id, error = %e, "intent submission failed");
                        queue.extend(self.manager.on_gateway_reject(intent.correlation_id, now));
                    }
                }
                Action::Transition(event) => {
                    self.reporter.lifecycle(&event);
                }
                Action::ReduceExposure { position_id, delta } => {
                    if let Err(e) = self.ledger.reduce(position_id, delta) {
                        return self.fail_closed(e.into());
                    }
                }
                Action::ReleaseExposure { position_id } => {
                    if let Err(e) = self.ledger.release(position_id) {
                        return self.fail_closed(e.into());
                    }
                }
                Action::Alert {
                    position_id,
                    message,
                } => {
                    self.reporter.alert(position_id, &message);
                }
            }
        }
        Ok(())
    }

    /// Invariant violations are never recovered automatically: block
    /// new entries globally, alert, and surface the error.
    fn fail_closed(&mut self, e: EngineError) -> Result<()> {
        error!(symbol = %self.symbol, error = %e, "invariant violation, failing closed");
        if !self.ledger.is_halted() {
            self.ledger.halt(format!("invariant violation: {e}"));
        }
        Err(e)
    }

    /// Open (non-terminal) positions currently owned by this worker.
    pub fn open_position_count(&self) -> usize {
        self.manager.open_ids().len()
    }

    /// Realized PnL booked across this worker's closed positions.
    pub fn realized_pnl(&self) -> Decimal {
        self.manager.realized_total()
    }
}
