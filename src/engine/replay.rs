//! Deterministic replay driver.
//!
//! Feeds recorded events through the engine one at a time and turns
//! each intent the [`SimGateway`] accepts into an immediate fill
//! confirmation, applied before the next feed event. Order intents
//! fill at their limit price; market closes fill at the symbol's last
//! seen price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{EngineEvent, FillConfirmation, OrderIntent};
use crate::error::Result;

use super::feed::EventFeed;
use super::gateway::SimGateway;
use super::Engine;

pub struct ReplayDriver {
    engine: Engine,
    sim: Arc<SimGateway>,
    last_price: HashMap<String, Decimal>,
}

impl ReplayDriver {
    pub fn new(engine: Engine, sim: Arc<SimGateway>) -> Self {
        Self {
            engine,
            sim,
            last_price: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub async fn run<F: EventFeed>(&mut self, feed: &mut F) -> Result<()> {
        let mut count = 0usize;
        while let Some(event) = feed.next_event().await {
            self.step(event).await?;
            count += 1;
        }
        info!(
            events = count,
            realized_pnl = %self.engine.realized_pnl(),
            open_positions = self.engine.open_positions(),
            "replay complete"
        );
        Ok(())
    }

    /// Apply one event, then drain the synthetic fills it produced
    /// (which may themselves produce further intents, e.g. a partial
    /// close chasing its remainder).
    pub async fn step(&mut self, event: EngineEvent) -> Result<()> {
        self.observe_price(&event);
        let timestamp = event.timestamp();
        self.engine.dispatch(&event).await?;

        while let Some(intent) = self.sim.pop() {
            match self.fill_for(&intent, timestamp) {
                Some(fill) => self.engine.dispatch(&EngineEvent::Fill(fill)).await?,
                None => {
                    warn!(
                        correlation_id = %intent.correlation_id,
                        symbol = %intent.symbol,
                        "no price seen for symbol yet, intent dropped"
                    );
                }
            }
        }
        Ok(())
    }

    fn observe_price(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Tick(tick) => {
                self.last_price.insert(tick.symbol.clone(), tick.price);
            }
            EngineEvent::Signals(batch) => {
                self.last_price.insert(batch.symbol.clone(), batch.price);
            }
            _ => {}
        }
    }

    fn fill_for(&self, intent: &OrderIntent, timestamp: DateTime<Utc>) -> Option<FillConfirmation> {
        let price = match intent.price {
            Some(price) => price,
            None => *self.last_price.get(&intent.symbol)?,
        };
        Some(FillConfirmation {
            correlation_id: intent.correlation_id,
            symbol: intent.symbol.clone(),
            fill_price: price,
            filled_size: intent.size,
            timestamp,
        })
    }
}
