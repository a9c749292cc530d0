//! Outbound boundary to the reporting/metrics collaborator.
//!
//! Every state transition, rejection and alert resolves to a reported
//! outcome; nothing is silently dropped.

use std::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{LifecycleEvent, PositionId, RejectReason, SignalReading};

pub trait Reporter: Send + Sync {
    fn lifecycle(&self, event: &LifecycleEvent);
    fn rejection(&self, symbol: &str, reason: RejectReason);
    fn data_quality(&self, reading: &SignalReading);
    fn alert(&self, position_id: PositionId, message: &str);
}

/// Reporter that forwards everything to structured logs.
#[derive(Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn lifecycle(&self, event: &LifecycleEvent) {
        info!(
            position_id = %event.position_id,
            symbol = %event.symbol,
            from = %event.from,
            to = %event.to,
            cause = ?event.cause,
            "lifecycle event"
        );
    }

    fn rejection(&self, symbol: &str, reason: RejectReason) {
        info!(%symbol, %reason, "entry rejected");
    }

    fn data_quality(&self, reading: &SignalReading) {
        warn!(
            symbol = %reading.symbol,
            indicator = %reading.indicator,
            timeframe = %reading.timeframe,
            timestamp = %reading.timestamp,
            "stale signal excluded from ensemble pass"
        );
    }

    fn alert(&self, position_id: PositionId, message: &str) {
        warn!(%position_id, message, "ALERT");
    }
}

/// Reporter that records everything in memory; used by the backtest
/// binary for its end-of-run summary and by tests for assertions.
#[derive(Default)]
pub struct CollectingReporter {
    pub lifecycle_events: Mutex<Vec<LifecycleEvent>>,
    pub rejections: Mutex<Vec<(String, RejectReason)>>,
    pub stale_signals: Mutex<Vec<SignalReading>>,
    pub alerts: Mutex<Vec<(PositionId, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle_events(&self) -> Vec<LifecycleEvent> {
        self.lifecycle_events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn rejections(&self) -> Vec<(String, RejectReason)> {
        self.rejections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn alerts(&self) -> Vec<(PositionId, String)> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Reporter for CollectingReporter {
    fn lifecycle(&self, event: &LifecycleEvent) {
        LogReporter.lifecycle(event);
        self.lifecycle_events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }

    fn rejection(&self, symbol: &str, reason: RejectReason) {
        LogReporter.rejection(symbol, reason);
        self.rejections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((symbol.to_string(), reason));
    }

    fn data_quality(&self, reading: &SignalReading) {
        LogReporter.data_quality(reading);
        self.stale_signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reading.clone());
    }

    fn alert(&self, position_id: PositionId, message: &str) {
        LogReporter.alert(position_id, message);
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((position_id, message.to_string()));
    }
}
