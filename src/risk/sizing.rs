//! Risk sizing policy: maps an actionable ensemble decision to an
//! order plan sized against account equity and volatility context.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::RiskConfig;
use crate::domain::{
    Direction, EnsembleDecision, RejectReason, RiskPlan, TakeProfitLeg, TrailingRule,
    VolatilityContext,
};

pub struct RiskSizer {
    config: RiskConfig,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Risk fraction of equity for a given confidence: linear between
    /// the configured floor and ceiling.
    pub fn risk_fraction(&self, confidence: f64) -> Decimal {
        let conf = Decimal::from_f64(confidence.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);
        self.config.risk_floor + conf * (self.config.risk_ceiling - self.config.risk_floor)
    }

    /// Turn a non-flat decision into a risk plan, or reject it.
    ///
    /// Exposure and position-count limits are NOT checked here; the
    /// exposure ledger's atomic `try_reserve` is the single authority
    /// for those, so two symbols sizing concurrently cannot both pass
    /// a stale check.
    pub fn evaluate(
        &self,
        decision: &EnsembleDecision,
        entry_price: Decimal,
        volatility: &VolatilityContext,
        equity: Decimal,
    ) -> Result<RiskPlan, RejectReason> {
        debug_assert!(!decision.direction.is_flat());

        if decision.confidence < self.config.min_confidence {
            return Err(RejectReason::ConfidenceBelowThreshold);
        }

        let stop_distance = volatility.atr * self.config.atr_stop_multiple;
        if stop_distance <= Decimal::ZERO || entry_price <= Decimal::ZERO {
            return Err(RejectReason::InvalidVolatility);
        }

        let risk_fraction = self.risk_fraction(decision.confidence);
        let risk_amount = risk_fraction * equity;
        // notional = risk / stop distance as a fraction of price
        let notional = risk_amount * entry_price / stop_distance;

        let stop_price = match decision.direction {
            Direction::Long => entry_price - stop_distance,
            Direction::Short => entry_price + stop_distance,
            Direction::Flat => unreachable!("flat decisions are filtered upstream"),
        };

        let target_distance = stop_distance * self.config.reward_risk;
        let take_profits = self
            .config
            .tp_milestones
            .iter()
            .zip(self.config.tp_fractions.iter())
            .map(|(milestone, fraction)| {
                let offset = target_distance * *milestone;
                let price = match decision.direction {
                    Direction::Short => entry_price - offset,
                    _ => entry_price + offset,
                };
                TakeProfitLeg {
                    price,
                    fraction: *fraction,
                }
            })
            .collect();

        let plan = RiskPlan {
            symbol: decision.symbol.clone(),
            direction: decision.direction,
            entry_price,
            notional,
            stop_price,
            take_profits,
            trailing: TrailingRule {
                activation_multiple: self.config.trailing_activation_multiple,
                lock_fraction: self.config.trailing_lock_fraction,
            },
        };

        debug!(
            symbol = %plan.symbol,
            direction = %plan.direction,
            %notional,
            %stop_price,
            risk_fraction = %risk_fraction,
            "risk plan sized"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn decision(confidence: f64) -> EnsembleDecision {
        EnsembleDecision {
            symbol: "BTCUSDT".into(),
            timestamp: Utc::now(),
            direction: Direction::Long,
            confidence,
            snapshot: vec![],
        }
    }

    fn sizer() -> RiskSizer {
        RiskSizer::new(RiskConfig {
            atr_stop_multiple: dec!(1),
            ..RiskConfig::default()
        })
    }

    #[test]
    fn confidence_scales_risk_linearly() {
        let s = sizer();
        assert_eq!(s.risk_fraction(0.0), dec!(0.015));
        assert_eq!(s.risk_fraction(1.0), dec!(0.03));
        assert_eq!(s.risk_fraction(0.8), dec!(0.027));
    }

    #[test]
    fn scenario_a_notional() {
        // confidence 0.8, equity 10_000, stop distance 1% of price
        // risk fraction = 1.5% + 0.8 * 1.5% = 2.7% => 270 at risk
        // notional = 270 / 0.01 = 27_000
        let s = sizer();
        let plan = s
            .evaluate(
                &decision(0.8),
                dec!(100),
                &VolatilityContext { atr: dec!(1) },
                dec!(10000),
            )
            .unwrap();
        assert_eq!(plan.notional, dec!(27000));
        assert_eq!(plan.stop_price, dec!(99));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn low_confidence_rejected() {
        let s = sizer();
        assert_eq!(
            s.evaluate(
                &decision(0.1),
                dec!(100),
                &VolatilityContext { atr: dec!(1) },
                dec!(10000),
            )
            .unwrap_err(),
            RejectReason::ConfidenceBelowThreshold
        );
    }

    #[test]
    fn zero_atr_rejected() {
        let s = sizer();
        assert_eq!(
            s.evaluate(
                &decision(0.8),
                dec!(100),
                &VolatilityContext { atr: dec!(0) },
                dec!(10000),
            )
            .unwrap_err(),
            RejectReason::InvalidVolatility
        );
    }

    #[test]
    fn short_plan_mirrors_levels() {
        let s = sizer();
        let mut d = decision(0.8);
        d.direction = Direction::Short;
        let plan = s
            .evaluate(&d, dec!(100), &VolatilityContext { atr: dec!(1) }, dec!(10000))
            .unwrap();
        assert_eq!(plan.stop_price, dec!(101));
        assert!(plan.take_profits.iter().all(|leg| leg.price < dec!(100)));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn legs_follow_configured_milestones() {
        let s = sizer();
        let plan = s
            .evaluate(
                &decision(0.8),
                dec!(100),
                &VolatilityContext { atr: dec!(1) },
                dec!(10000),
            )
            .unwrap();
        // target distance = 1 * 2 (reward_risk); milestones 0.5/0.75/1.0
        assert_eq!(plan.take_profits[0].price, dec!(101.0));
        assert_eq!(plan.take_profits[1].price, dec!(101.5));
        assert_eq!(plan.take_profits[2].price, dec!(102.0));
        let total: Decimal = plan.take_profits.iter().map(|l| l.fraction).sum();
        assert_eq!(total, dec!(1.0));
    }
}
