//! Engine orchestration: event routing, per-symbol workers, and the
//! replay driver.

mod feed;
mod gateway;
mod replay;
mod reporter;
mod worker;

pub use feed::{ChannelFeed, EventFeed, ReplayFeed};
pub use gateway::{ExecutionGateway, RejectingGateway, SimGateway};
pub use replay::ReplayDriver;
pub use reporter::{CollectingReporter, LogReporter, Reporter};
pub use worker::SymbolWorker;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::domain::{EngineEvent, Position, PositionId};
use crate::error::{EngineError, Result};
use crate::persistence::Snapshot;
use crate::risk::ExposureLedger;

/// The decision engine: one worker per configured symbol, one shared
/// exposure ledger, one shared open-position registry.
pub struct Engine {
    config: Arc<AppConfig>,
    ledger: Arc<ExposureLedger>,
    registry: Arc<DashMap<PositionId, Position>>,
    workers: HashMap<String, SymbolWorker>,
}

impl Engine {
    pub fn new(
        config: AppConfig,
        initial_equity: Decimal,
        gateway: Arc<dyn ExecutionGateway>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let config = Arc::new(config);
        let ledger = Arc::new(ExposureLedger::new(
            config.risk.max_positions,
            config.risk.max_exposure_fraction,
            initial_equity,
        ));
        let registry: Arc<DashMap<PositionId, Position>> = Arc::new(DashMap::new());

        let workers = config
            .engine
            .symbols
            .iter()
            .map(|symbol| {
                let worker = SymbolWorker::new(
                    symbol,
                    &config,
                    Arc::clone(&registry),
                    Arc::clone(&ledger),
                    Arc::clone(&gateway),
                    Arc::clone(&reporter),
                );
                (symbol.clone(), worker)
            })
            .collect();

        Self {
            config,
            ledger,
            registry,
            workers,
        }
    }

    pub fn ledger(&self) -> &Arc<ExposureLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Route one event to its symbol's worker, or broadcast it.
    pub async fn dispatch(&mut self, event: &EngineEvent) -> Result<()> {
        match event.symbol() {
            Some(symbol) => match self.workers.get_mut(symbol) {
                Some(worker) => worker.handle_event(event).await,
                None => {
                    // Same policy as the live router: an unconfigured
                    // symbol never aborts the stream.
                    warn!(%symbol, "event for unconfigured symbol dropped");
                    Ok(())
                }
            },
            None => {
                // Broadcast (equity, flatten-all) in configured symbol
                // order for deterministic replay.
                for symbol in &self.config.engine.symbols {
                    if let Some(worker) = self.workers.get_mut(symbol) {
                        worker.handle_event(event).await?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Drain an ordered feed sequentially. Used by replay; live mode
    /// uses [`spawn_live`] for per-symbol concurrency.
    pub async fn run<F: EventFeed>(&mut self, feed: &mut F) -> Result<()> {
        while let Some(event) = feed.next_event().await {
            self.dispatch(&event).await?;
        }
        Ok(())
    }

    /// Total realized PnL across all workers.
    pub fn realized_pnl(&self) -> Decimal {
        self.workers.values().map(|w| w.realized_pnl()).sum()
    }

    pub fn open_positions(&self) -> usize {
        self.workers.values().map(|w| w.open_position_count()).sum()
    }

    /// Resume automated management of a frozen position. Fans out to
    /// every worker; only the owner acts on it.
    pub fn acknowledge(&mut self, position_id: PositionId) {
        for worker in self.workers.values_mut() {
            worker.acknowledge(position_id);
        }
    }

    /// Capture the minimal state needed to resume after restart: open
    /// positions and the ledger aggregate.
    pub fn snapshot(&self) -> Snapshot {
        let mut positions: Vec<Position> = self
            .registry
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap iteration order is arbitrary; sort for stable output
        positions.sort_by_key(|p| (p.opened_at, p.id.0));
        Snapshot {
            taken_at: Utc::now(),
            positions,
            ledger: self.ledger.export(),
        }
    }

    /// Rebuild engine state from a snapshot.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<()> {
        self.ledger.restore(snapshot.ledger);
        for position in snapshot.positions {
            match self.workers.get_mut(&position.symbol) {
                Some(worker) => worker.adopt(position),
                None => return Err(EngineError::UnknownSymbol(position.symbol)),
            }
        }
        info!(open_positions = self.open_positions(), "engine state restored");
        Ok(())
    }
}

/// Handle to a live engine: the inbound event sender plus the worker
/// task handles.
pub struct LiveHandle {
    pub tx: mpsc::Sender<EngineEvent>,
    pub router: JoinHandle<()>,
}

/// Spawn the engine in live mode: one task per symbol, each applying
/// its symbol's events sequentially, plus a router task that fans
/// events out. Broadcast events go to every symbol; flatten-all halts
/// the ledger in the router before any worker sees it, so no entry
/// can race the sweep.
pub fn spawn_live(
    config: AppConfig,
    initial_equity: Decimal,
    gateway: Arc<dyn ExecutionGateway>,
    reporter: Arc<dyn Reporter>,
    buffer: usize,
) -> LiveHandle {
    let config = Arc::new(config);
    let ledger = Arc::new(ExposureLedger::new(
        config.risk.max_positions,
        config.risk.max_exposure_fraction,
        initial_equity,
    ));
    let registry: Arc<DashMap<PositionId, Position>> = Arc::new(DashMap::new());

    let mut symbol_txs: HashMap<String, mpsc::Sender<EngineEvent>> = HashMap::new();
    for symbol in &config.engine.symbols {
        let (tx, mut feed) = ChannelFeed::channel(buffer);
        symbol_txs.insert(symbol.clone(), tx);
        let mut worker = SymbolWorker::new(
            symbol,
            &config,
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&gateway),
            Arc::clone(&reporter),
        );
        let symbol = symbol.clone();
        tokio::spawn(async move {
            while let Some(event) = feed.next_event().await {
                if let Err(e) = worker.handle_event(&event).await {
                    // Data corruption on one position must not take
                    // down the other symbols; the ledger is already
                    // halted against new entries.
                    error!(%symbol, error = %e, "worker error, continuing");
                }
            }
        });
    }

    let (tx, mut rx) = mpsc::channel::<EngineEvent>(buffer);
    let router_ledger = Arc::clone(&ledger);
    let router = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.symbol().map(str::to_owned) {
                Some(symbol) => {
                    if let Some(stx) = symbol_txs.get(&symbol) {
                        if stx.send(event).await.is_err() {
                            warn!(%symbol, "symbol worker channel closed");
                        }
                    } else {
                        warn!(%symbol, "event for unconfigured symbol dropped");
                    }
                }
                None => {
                    if matches!(event, EngineEvent::FlattenAll { .. }) {
                        router_ledger.halt("flatten-all");
                    }
                    for stx in symbol_txs.values() {
                        let _ = stx.send(event.clone()).await;
                    }
                }
            }
        }
    });

    LiveHandle { tx, router }
}
