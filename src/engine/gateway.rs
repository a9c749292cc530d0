//! Outbound boundary to the execution gateway collaborator.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::domain::OrderIntent;
use crate::error::IntentError;

/// The execution gateway the engine emits order intents to.
///
/// Network placement and exchange acknowledgment happen behind this
/// trait; fills and rejections come back as engine events.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<(), IntentError>;

    /// Cancel every unconfirmed intent for a symbol (flatten-all).
    async fn cancel_all(&self, symbol: &str) -> Result<(), IntentError>;
}

/// Gateway for deterministic replay: accepted intents queue up for
/// the replay driver, which converts them into fill confirmations.
#[derive(Default)]
pub struct SimGateway {
    queue: Mutex<VecDeque<OrderIntent>>,
}

impl SimGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<OrderIntent> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ExecutionGateway for SimGateway {
    async fn submit(&self, intent: &OrderIntent) -> Result<(), IntentError> {
        debug!(correlation_id = %intent.correlation_id, kind = ?intent.kind, "sim gateway accepted intent");
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(intent.clone());
        Ok(())
    }

    async fn cancel_all(&self, _symbol: &str) -> Result<(), IntentError> {
        Ok(())
    }
}

/// Gateway that rejects everything; used to exercise retry/backoff
/// paths in tests.
#[derive(Default)]
pub struct RejectingGateway;

#[async_trait]
impl ExecutionGateway for RejectingGateway {
    async fn submit(&self, intent: &OrderIntent) -> Result<(), IntentError> {
        Err(IntentError::GatewayRejected {
            correlation_id: intent.correlation_id,
            reason: "rejected by test gateway".into(),
        })
    }

    async fn cancel_all(&self, _symbol: &str) -> Result<(), IntentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use rust_decimal_macros::dec;

    #[test]
    fn sim_gateway_queues_in_submission_order() {
        let sim = SimGateway::new();
        let first = OrderIntent::entry("BTCUSDT", Direction::Long, dec!(1000), dec!(100));
        let second = OrderIntent::close("BTCUSDT", Direction::Long, dec!(1000));
        tokio_test::block_on(async {
            sim.submit(&first).await.unwrap();
            sim.submit(&second).await.unwrap();
        });
        assert_eq!(sim.pending(), 2);
        assert_eq!(sim.pop().unwrap().correlation_id, first.correlation_id);
        assert_eq!(sim.pop().unwrap().correlation_id, second.correlation_id);
        assert!(sim.pop().is_none());
    }
}
