use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Direction, RiskPlan};

/// Opaque position identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a position reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    EntryTimeout,
    StoppedOut,
    TargetReached,
    Flattened,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::EntryTimeout => write!(f, "entry-timeout"),
            CloseReason::StoppedOut => write!(f, "stopped-out"),
            CloseReason::TargetReached => write!(f, "target-reached"),
            CloseReason::Flattened => write!(f, "flattened"),
        }
    }
}

/// Position lifecycle state.
///
/// PendingEntry -> OpenFull -> PartialExit(n) -> Trailing -> Closed.
/// Partial-exit states exist only for legs actually filled; a plan
/// with fewer legs skips states. The transition into `Trailing`
/// happens on the first trailing stop advance; subsequent advances
/// mutate the stop price without changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionState {
    PendingEntry,
    OpenFull,
    PartialExit(u8),
    Trailing,
    Closed(CloseReason),
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PositionState::OpenFull | PositionState::PartialExit(_) | PositionState::Trailing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed(_))
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::PendingEntry => write!(f, "pending-entry"),
            PositionState::OpenFull => write!(f, "open-full"),
            PositionState::PartialExit(n) => write!(f, "partial-exit-{n}"),
            PositionState::Trailing => write!(f, "trailing"),
            PositionState::Closed(reason) => write!(f, "closed({reason})"),
        }
    }
}

/// The external event that caused a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionCause {
    EntryFilled,
    EntryTimeout,
    TakeProfitFilled { leg: u8 },
    StopFilled,
    TrailingActivated,
    FlattenAll,
}

/// Outbound lifecycle record for the reporting/metrics collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub position_id: PositionId,
    pub symbol: String,
    pub from: PositionState,
    pub to: PositionState,
    pub timestamp: DateTime<Utc>,
    pub cause: TransitionCause,
}

/// One open position, exclusively owned by the lifecycle manager
/// handling its symbol's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub opened_at: DateTime<Utc>,
    /// Planned entry price until the entry fill confirms, then actual
    pub entry_price: Decimal,
    /// Quote-currency notional at entry
    pub initial_size: Decimal,
    /// Strictly non-increasing; zero exactly at closure
    pub remaining_size: Decimal,
    pub realized_pnl: Decimal,
    /// Current stop; only ever tightens after trailing activates
    pub stop_price: Decimal,
    /// Index of the next pending take-profit leg
    pub next_leg: usize,
    pub state: PositionState,
    /// Set when intent retries are exhausted; blocks automated
    /// trailing until manually acknowledged
    pub frozen: bool,
    /// Best favorable price seen since entry (trailing reference)
    pub high_water: Decimal,
    pub plan: RiskPlan,
}

impl Position {
    pub fn from_plan(id: PositionId, plan: RiskPlan, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            symbol: plan.symbol.clone(),
            direction: plan.direction,
            opened_at,
            entry_price: plan.entry_price,
            initial_size: plan.notional,
            remaining_size: plan.notional,
            realized_pnl: Decimal::ZERO,
            stop_price: plan.stop_price,
            next_leg: 0,
            state: PositionState::PendingEntry,
            frozen: false,
            high_water: plan.entry_price,
            plan,
        }
    }

    /// True if `price` is at least as favorable as `level` for this
    /// position's direction.
    pub fn crossed_favorably(&self, price: Decimal, level: Decimal) -> bool {
        match self.direction {
            Direction::Long => price >= level,
            Direction::Short => price <= level,
            Direction::Flat => false,
        }
    }

    /// True if `price` has hit the current stop.
    pub fn crossed_stop(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_price,
            Direction::Short => price >= self.stop_price,
            Direction::Flat => false,
        }
    }

    /// Unrealized favorable move per unit of entry price, based on the
    /// best price seen (non-negative).
    pub fn peak_gain(&self) -> Decimal {
        let gain = match self.direction {
            Direction::Long => self.high_water - self.entry_price,
            Direction::Short => self.entry_price - self.high_water,
            Direction::Flat => Decimal::ZERO,
        };
        gain.max(Decimal::ZERO)
    }

    /// PnL in quote currency for `notional` of the position exiting at
    /// `exit_price`.
    pub fn pnl_for(&self, notional: Decimal, exit_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let units = notional / self.entry_price;
        match self.direction {
            Direction::Long => units * (exit_price - self.entry_price),
            Direction::Short => units * (self.entry_price - exit_price),
            Direction::Flat => Decimal::ZERO,
        }
    }

    pub fn next_take_profit(&self) -> Option<&super::TakeProfitLeg> {
        self.plan.take_profits.get(self.next_leg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TakeProfitLeg, TrailingRule};
    use rust_decimal_macros::dec;

    fn short_position() -> Position {
        let plan = RiskPlan {
            symbol: "ETHUSDT".into(),
            direction: Direction::Short,
            entry_price: dec!(2000),
            notional: dec!(4000),
            stop_price: dec!(2020),
            take_profits: vec![TakeProfitLeg { price: dec!(1960), fraction: dec!(1) }],
            trailing: TrailingRule {
                activation_multiple: dec!(1),
                lock_fraction: dec!(0.5),
            },
        };
        Position::from_plan(PositionId::new(), plan, Utc::now())
    }

    #[test]
    fn short_crossings_are_mirrored() {
        let pos = short_position();
        assert!(pos.crossed_favorably(dec!(1960), dec!(1960)));
        assert!(!pos.crossed_favorably(dec!(1961), dec!(1960)));
        assert!(pos.crossed_stop(dec!(2020)));
        assert!(!pos.crossed_stop(dec!(2019)));
    }

    #[test]
    fn short_pnl_sign() {
        let pos = short_position();
        // 4000 notional at 2000 = 2 units; exit 40 below entry = +80
        assert_eq!(pos.pnl_for(dec!(4000), dec!(1960)), dec!(80));
        assert_eq!(pos.pnl_for(dec!(4000), dec!(2020)), dec!(-40));
    }

    #[test]
    fn peak_gain_never_negative() {
        let mut pos = short_position();
        pos.high_water = dec!(2050);
        assert_eq!(pos.peak_gain(), Decimal::ZERO);
        pos.high_water = dec!(1950);
        assert_eq!(pos.peak_gain(), dec!(50));
    }
}
