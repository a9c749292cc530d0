//! Portfolio exposure ledger.
//!
//! The only shared mutable resource across symbols. All checks and
//! mutations happen under one mutex so that two simultaneous entry
//! attempts can never jointly exceed the exposure cap or the open
//! position count.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::{PositionId, RejectReason};
use crate::error::LedgerError;

#[derive(Debug, Default)]
struct LedgerInner {
    equity: Decimal,
    reservations: HashMap<PositionId, Decimal>,
    /// Set on invariant violation or flatten; blocks new reservations
    halted: Option<String>,
}

/// Serializable ledger state for snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub equity: Decimal,
    pub reservations: Vec<(PositionId, Decimal)>,
    pub halted: Option<String>,
}

pub struct ExposureLedger {
    max_positions: u32,
    max_exposure_fraction: Decimal,
    inner: Mutex<LedgerInner>,
}

impl ExposureLedger {
    pub fn new(max_positions: u32, max_exposure_fraction: Decimal, equity: Decimal) -> Self {
        Self {
            max_positions,
            max_exposure_fraction,
            inner: Mutex::new(LedgerInner {
                equity,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        // A poisoned ledger lock means a panic mid-mutation; trading
        // on that state would be worse than propagating the panic.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomic check-and-reserve for a candidate entry.
    ///
    /// Count is checked before exposure so each limit surfaces as its
    /// own rejection reason.
    pub fn try_reserve(
        &self,
        position_id: PositionId,
        notional: Decimal,
    ) -> Result<(), RejectReason> {
        let mut inner = self.lock();

        if inner.halted.is_some() {
            return Err(RejectReason::TradingHalted);
        }
        if inner.reservations.len() as u32 >= self.max_positions {
            return Err(RejectReason::PositionLimitReached);
        }
        let aggregate: Decimal = inner.reservations.values().copied().sum();
        let cap = inner.equity * self.max_exposure_fraction;
        if aggregate + notional > cap {
            return Err(RejectReason::ExposureCapExceeded);
        }

        inner.reservations.insert(position_id, notional);
        info!(%position_id, %notional, aggregate = %(aggregate + notional), %cap, "exposure reserved");
        Ok(())
    }

    /// Release a reservation on the position's terminal transition.
    ///
    /// A double release is an invariant violation: the ledger halts
    /// new entries (fail closed) and reports the error.
    pub fn release(&self, position_id: PositionId) -> Result<Decimal, LedgerError> {
        let mut inner = self.lock();
        match inner.reservations.remove(&position_id) {
            Some(notional) => {
                info!(%position_id, %notional, "exposure released");
                Ok(notional)
            }
            None => {
                error!(%position_id, "double release of exposure reservation");
                inner.halted = Some(format!("double release for position {position_id}"));
                Err(LedgerError::DoubleRelease { position_id })
            }
        }
    }

    /// Shrink a live reservation as partial exits fill.
    pub fn reduce(&self, position_id: PositionId, delta: Decimal) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        let reserved = inner
            .reservations
            .get_mut(&position_id)
            .ok_or(LedgerError::UnknownReservation { position_id })?;
        if delta > *reserved {
            let reserved = *reserved;
            inner.halted = Some(format!("reservation underflow for position {position_id}"));
            return Err(LedgerError::ReduceExceedsReservation {
                position_id,
                reserved,
                delta,
            });
        }
        *reserved -= delta;
        Ok(())
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.lock().equity = equity;
    }

    pub fn equity(&self) -> Decimal {
        self.lock().equity
    }

    /// Current aggregate open notional.
    pub fn aggregate(&self) -> Decimal {
        self.lock().reservations.values().copied().sum()
    }

    pub fn open_count(&self) -> usize {
        self.lock().reservations.len()
    }

    /// Block new reservations (flatten-all, invariant violations).
    pub fn halt(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "ledger halted, new entries blocked");
        self.lock().halted = Some(reason);
    }

    /// Manual acknowledgment that clears a halt.
    pub fn resume(&self) {
        info!("ledger resumed");
        self.lock().halted = None;
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted.is_some()
    }

    pub fn export(&self) -> LedgerState {
        let inner = self.lock();
        LedgerState {
            equity: inner.equity,
            reservations: inner.reservations.iter().map(|(k, v)| (*k, *v)).collect(),
            halted: inner.halted.clone(),
        }
    }

    pub fn restore(&self, state: LedgerState) {
        let mut inner = self.lock();
        inner.equity = state.equity;
        inner.reservations = state.reservations.into_iter().collect();
        inner.halted = state.halted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn ledger() -> ExposureLedger {
        // equity 10_000, cap 10% => 1_000 notional
        ExposureLedger::new(3, dec!(0.10), dec!(10000))
    }

    #[test]
    fn reserve_within_cap_passes() {
        let l = ledger();
        assert!(l.try_reserve(PositionId::new(), dec!(400)).is_ok());
        assert_eq!(l.aggregate(), dec!(400));
        assert_eq!(l.open_count(), 1);
    }

    #[test]
    fn exposure_cap_rejects() {
        let l = ledger();
        l.try_reserve(PositionId::new(), dec!(800)).unwrap();
        assert_eq!(
            l.try_reserve(PositionId::new(), dec!(300)),
            Err(RejectReason::ExposureCapExceeded)
        );
    }

    #[test]
    fn position_limit_rejects_before_exposure() {
        let l = ledger();
        for _ in 0..3 {
            l.try_reserve(PositionId::new(), dec!(100)).unwrap();
        }
        assert_eq!(
            l.try_reserve(PositionId::new(), dec!(100)),
            Err(RejectReason::PositionLimitReached)
        );
    }

    #[test]
    fn release_frees_capacity() {
        let l = ledger();
        let id = PositionId::new();
        l.try_reserve(id, dec!(900)).unwrap();
        assert_eq!(l.release(id).unwrap(), dec!(900));
        assert!(l.try_reserve(PositionId::new(), dec!(900)).is_ok());
    }

    #[test]
    fn double_release_halts_ledger() {
        let l = ledger();
        let id = PositionId::new();
        l.try_reserve(id, dec!(100)).unwrap();
        l.release(id).unwrap();
        assert!(matches!(
            l.release(id),
            Err(LedgerError::DoubleRelease { .. })
        ));
        assert!(l.is_halted());
        assert_eq!(
            l.try_reserve(PositionId::new(), dec!(100)),
            Err(RejectReason::TradingHalted)
        );
    }

    #[test]
    fn reduce_shrinks_aggregate() {
        let l = ledger();
        let id = PositionId::new();
        l.try_reserve(id, dec!(500)).unwrap();
        l.reduce(id, dec!(150)).unwrap();
        assert_eq!(l.aggregate(), dec!(350));
    }

    #[tokio::test]
    async fn concurrent_reserves_never_exceed_cap() {
        let l = Arc::new(ExposureLedger::new(100, dec!(0.10), dec!(10000)));
        let mut handles = Vec::new();
        // 40 tasks of 100 each; cap admits at most 10.
        for _ in 0..40 {
            let l = Arc::clone(&l);
            handles.push(tokio::spawn(async move {
                l.try_reserve(PositionId::new(), dec!(100)).is_ok()
            }));
        }
        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 10);
        assert!(l.aggregate() <= dec!(1000));
    }
}
