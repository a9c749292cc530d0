use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Direction;
use crate::error::EngineError;

/// A partial close at a predefined favorable price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLeg {
    pub price: Decimal,
    /// Fraction of the initial size closed at this leg
    pub fraction: Decimal,
}

/// When and how far the stop is advanced as unrealized gain grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Trailing activates once unrealized gain per unit reaches this
    /// multiple of the stop distance
    pub activation_multiple: Decimal,
    /// Fraction of the peak gain the advanced stop locks in
    pub lock_fraction: Decimal,
}

/// Immutable order-plan template produced by the risk sizing policy.
/// Consumed once to seed a [`super::Position`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPlan {
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    /// Quote-currency notional
    pub notional: Decimal,
    pub stop_price: Decimal,
    /// Ordered by distance from entry; fractions sum to <= 1
    pub take_profits: Vec<TakeProfitLeg>,
    pub trailing: TrailingRule,
}

impl RiskPlan {
    /// Absolute distance between entry and stop.
    pub fn stop_distance(&self) -> Decimal {
        (self.entry_price - self.stop_price).abs()
    }

    /// Check the structural invariants of the plan.
    ///
    /// Legs must be strictly ordered by distance from entry, leg
    /// fractions must sum to at most 1.0, and the stop distance must
    /// be positive.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.direction.is_flat() {
            return Err(EngineError::InvalidPlan("flat direction".into()));
        }
        if self.stop_distance() <= Decimal::ZERO {
            return Err(EngineError::InvalidPlan("non-positive stop distance".into()));
        }
        if self.notional <= Decimal::ZERO {
            return Err(EngineError::InvalidPlan("non-positive notional".into()));
        }

        let mut last_distance = Decimal::ZERO;
        let mut total_fraction = Decimal::ZERO;
        for leg in &self.take_profits {
            let distance = (leg.price - self.entry_price).abs();
            if distance <= last_distance {
                return Err(EngineError::InvalidPlan(
                    "take-profit legs not ordered by distance from entry".into(),
                ));
            }
            let favorable = match self.direction {
                Direction::Long => leg.price > self.entry_price,
                Direction::Short => leg.price < self.entry_price,
                Direction::Flat => false,
            };
            if !favorable {
                return Err(EngineError::InvalidPlan(
                    "take-profit leg on the adverse side of entry".into(),
                ));
            }
            if leg.fraction <= Decimal::ZERO {
                return Err(EngineError::InvalidPlan("non-positive leg fraction".into()));
            }
            last_distance = distance;
            total_fraction += leg.fraction;
        }
        if total_fraction > Decimal::ONE {
            return Err(EngineError::InvalidPlan(format!(
                "leg fractions sum to {total_fraction}, must be <= 1"
            )));
        }
        Ok(())
    }
}
