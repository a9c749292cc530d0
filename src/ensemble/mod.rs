//! Signal ensemble combiner.
//!
//! Normalizes and weights the independent indicator votes for one
//! symbol into a single directional decision with a confidence score.
//! Pure: no side effects and no clock reads; the caller supplies `now`.

pub mod sources;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::{EngineConfig, EnsembleConfig};
use crate::domain::{
    Direction, EnsembleDecision, SignalContribution, SignalReading, Timeframe,
};

pub struct EnsembleCombiner {
    config: EnsembleConfig,
    primary: Timeframe,
    confirmation: Timeframe,
    staleness: Duration,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig, engine: &EngineConfig) -> Self {
        Self {
            config,
            primary: engine.primary_timeframe,
            confirmation: engine.confirmation_timeframe,
            staleness: Duration::seconds(engine.staleness_secs),
        }
    }

    /// Combine the current readings for one symbol into a decision.
    ///
    /// Stale readings (older than the staleness bound relative to
    /// `now`) are excluded from the sum, not treated as zero votes.
    /// The caller is responsible for reporting them as a data-quality
    /// condition; [`Self::stale`] identifies them.
    pub fn combine(
        &self,
        symbol: &str,
        readings: &[SignalReading],
        now: DateTime<Utc>,
    ) -> EnsembleDecision {
        let fresh: Vec<&SignalReading> = readings
            .iter()
            .filter(|r| now - r.timestamp <= self.staleness)
            .collect();

        let (primary_sum, primary_weight, snapshot) =
            self.weighted_sum(&fresh, self.primary, true);
        let (confirm_sum, confirm_weight, _) =
            self.weighted_sum(&fresh, self.confirmation, false);

        if primary_weight == 0.0 {
            debug!(symbol, "no fresh primary-timeframe signals, staying flat");
            return EnsembleDecision::flat(symbol, now);
        }

        // Exactly at the activation threshold is flat: bias toward
        // inaction under ambiguity.
        let direction = if primary_sum.abs() > self.config.activation_threshold {
            Direction::from_sign(primary_sum)
        } else {
            Direction::Flat
        };

        let confirm_direction = if confirm_weight > 0.0
            && confirm_sum.abs() > self.config.activation_threshold
        {
            Direction::from_sign(confirm_sum)
        } else {
            Direction::Flat
        };

        // Multi-timeframe confirmation: the confirmation timeframe
        // must agree or be neutral, otherwise the decision is flat.
        let direction = match (direction, confirm_direction) {
            (d, Direction::Flat) => d,
            (d, c) if d == c => d,
            _ => Direction::Flat,
        };

        let confidence = if direction.is_flat() {
            0.0
        } else {
            (primary_sum.abs() / primary_weight).clamp(0.0, 1.0)
        };

        EnsembleDecision {
            symbol: symbol.to_string(),
            timestamp: now,
            direction,
            confidence,
            snapshot,
        }
    }

    /// Readings excluded from a pass because they exceed the
    /// staleness bound.
    pub fn stale<'a>(
        &self,
        readings: &'a [SignalReading],
        now: DateTime<Utc>,
    ) -> Vec<&'a SignalReading> {
        readings
            .iter()
            .filter(|r| now - r.timestamp > self.staleness)
            .collect()
    }

    fn weighted_sum(
        &self,
        readings: &[&SignalReading],
        timeframe: Timeframe,
        keep_snapshot: bool,
    ) -> (f64, f64, Vec<SignalContribution>) {
        let mut sum = 0.0;
        let mut total_weight = 0.0;
        let mut snapshot = Vec::new();

        for reading in readings.iter().filter(|r| r.timeframe == timeframe) {
            let (vote, strength) = sources::evaluate(reading, &self.config);
            let weight = self.config.weights.get(reading.indicator);
            sum += f64::from(vote) * strength * weight;
            total_weight += weight;
            if keep_snapshot {
                snapshot.push(SignalContribution {
                    indicator: reading.indicator,
                    timeframe: reading.timeframe,
                    vote,
                    strength,
                    weight,
                });
            }
        }

        (sum, total_weight, snapshot)
    }
}
