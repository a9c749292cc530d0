//! Event feed abstraction shared by live and replay modes.
//!
//! Both modes implement one ordered event source; the engine itself
//! is mode-agnostic, which is what makes backtest decisions match
//! live decisions bit for bit.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

use crate::domain::EngineEvent;
use crate::error::Result;

/// Ordered source of engine events.
///
/// Implementors must deliver events in strict timestamp order across
/// all symbols. Returns `None` when the source is exhausted (replay)
/// or closed (live).
#[async_trait]
pub trait EventFeed: Send {
    async fn next_event(&mut self) -> Option<EngineEvent>;
}

/// Historical feed replaying pre-loaded events in timestamp order.
///
/// All events are loaded upfront and sorted, guaranteeing
/// deterministic replay with no lookahead.
pub struct ReplayFeed {
    events: VecDeque<EngineEvent>,
}

impl ReplayFeed {
    pub fn new(mut events: Vec<EngineEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp());
        Self {
            events: events.into(),
        }
    }

    /// Load newline-delimited JSON events from a recorded session.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        info!(count = events.len(), path = %path.display(), "replay feed loaded");
        Ok(Self::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl EventFeed for ReplayFeed {
    async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }
}

/// Live feed backed by an mpsc channel fed by the market-data and
/// execution adapters.
pub struct ChannelFeed {
    rx: mpsc::Receiver<EngineEvent>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<EngineEvent>) -> Self {
        Self { rx }
    }

    pub fn channel(buffer: usize) -> (mpsc::Sender<EngineEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl EventFeed for ChannelFeed {
    async fn next_event(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceTick;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn tick(offset_secs: i64) -> EngineEvent {
        EngineEvent::Tick(PriceTick {
            symbol: "BTCUSDT".into(),
            price: dec!(100),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        })
    }

    #[tokio::test]
    async fn replay_feed_sorts_by_timestamp() {
        let mut feed = ReplayFeed::new(vec![tick(30), tick(10), tick(20)]);
        let mut last = None;
        while let Some(event) = feed.next_event().await {
            if let Some(prev) = last {
                assert!(event.timestamp() >= prev);
            }
            last = Some(event.timestamp());
        }
    }

    #[tokio::test]
    async fn channel_feed_ends_when_sender_drops() {
        let (tx, mut feed) = ChannelFeed::channel(8);
        tx.send(tick(0)).await.unwrap();
        drop(tx);
        assert!(feed.next_event().await.is_some());
        assert!(feed.next_event().await.is_none());
    }
}
