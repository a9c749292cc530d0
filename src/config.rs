use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

use crate::domain::Timeframe;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Symbols the engine routes events for (e.g. "BTCUSDT")
    pub symbols: Vec<String>,
    /// Timeframe whose signals drive the weighted sum
    pub primary_timeframe: Timeframe,
    /// Timeframe that must agree (or be neutral) for a trade
    pub confirmation_timeframe: Timeframe,
    /// Readings older than this are excluded from the ensemble pass
    pub staleness_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            primary_timeframe: Timeframe::M5,
            confirmation_timeframe: Timeframe::M15,
            staleness_secs: 120,
        }
    }
}

/// Per-source ensemble weights (fixed configuration, not learned)
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeights {
    pub rsi: f64,
    pub ema: f64,
    pub bollinger: f64,
    pub vwap: f64,
    pub order_flow: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            rsi: 0.20,
            ema: 0.25,
            bollinger: 0.20,
            vwap: 0.20,
            order_flow: 0.15,
        }
    }
}

impl SourceWeights {
    pub fn get(&self, kind: crate::domain::IndicatorKind) -> f64 {
        use crate::domain::IndicatorKind::*;
        match kind {
            Rsi => self.rsi,
            EmaCross => self.ema,
            Bollinger => self.bollinger,
            Vwap => self.vwap,
            OrderFlow => self.order_flow,
        }
    }
}

/// Ensemble combiner configuration.
///
/// Every strength formula is parameterized here so that no indicator
/// scaling is an undocumented constant in the combiner itself.
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// |weighted sum| must strictly exceed this for a non-flat decision
    pub activation_threshold: f64,
    #[serde(default)]
    pub weights: SourceWeights,
    /// RSI level at or below which the source votes long
    pub rsi_oversold: f64,
    /// RSI level at or above which the source votes short
    pub rsi_overbought: f64,
    /// Strength multiplier applied when a divergence flag is set
    pub divergence_boost: f64,
    /// EMA fast-slow spread (fraction of price) that maps to strength 1.0
    pub ema_spread_scale: f64,
    /// Band-widths beyond the Bollinger band that map to strength 1.0
    pub bollinger_scale: f64,
    /// Strength multiplier applied on a squeeze breakout
    pub squeeze_boost: f64,
    /// Distance from VWAP (fraction of price) that maps to strength 1.0
    pub vwap_band_scale: f64,
    /// Minimum VWAP distance before the source votes at all
    pub vwap_min_distance: f64,
    /// Minimum |order-flow imbalance| before the source votes
    pub order_flow_floor: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            activation_threshold: 0.25,
            weights: SourceWeights::default(),
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            divergence_boost: 1.25,
            ema_spread_scale: 0.004,
            bollinger_scale: 0.5,
            squeeze_boost: 1.15,
            vwap_band_scale: 0.006,
            vwap_min_distance: 0.001,
            order_flow_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Minimum actionable confidence; below this the decision is rejected
    pub min_confidence: f64,
    /// Risk fraction of equity at confidence 0.0
    pub risk_floor: Decimal,
    /// Risk fraction of equity at confidence 1.0
    pub risk_ceiling: Decimal,
    /// Stop distance = ATR x this multiple
    pub atr_stop_multiple: Decimal,
    /// Full target distance = stop distance x this multiple
    pub reward_risk: Decimal,
    /// Cumulative take-profit milestones as fractions of the target distance
    pub tp_milestones: Vec<Decimal>,
    /// Exit fraction of initial size at each milestone (must sum to <= 1)
    pub tp_fractions: Vec<Decimal>,
    /// Trailing activates once unrealized gain >= this multiple of stop distance
    pub trailing_activation_multiple: Decimal,
    /// Fraction of the peak gain locked in by the advanced stop
    pub trailing_lock_fraction: Decimal,
    /// Maximum concurrent open positions system-wide
    pub max_positions: u32,
    /// Aggregate open notional must stay <= this fraction of equity
    pub max_exposure_fraction: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            risk_floor: dec!(0.015),
            risk_ceiling: dec!(0.03),
            atr_stop_multiple: dec!(1.5),
            reward_risk: dec!(2),
            tp_milestones: vec![dec!(0.5), dec!(0.75), dec!(1.0)],
            tp_fractions: vec![dec!(0.3), dec!(0.4), dec!(0.3)],
            trailing_activation_multiple: dec!(1),
            trailing_lock_fraction: dec!(0.5),
            max_positions: 3,
            max_exposure_fraction: dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Seconds a pending entry may wait for its fill before being abandoned
    pub entry_timeout_secs: i64,
    /// Maximum submission attempts per order intent
    pub max_retries: u32,
    /// Base delay for exponential retry backoff
    pub retry_base_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            entry_timeout_secs: 60,
            max_retries: 3,
            retry_base_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter directive (e.g. "info", "scalpex=debug")
    pub level: String,
    /// Emit JSON-formatted log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus `SCALPEX__*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(p) => builder.add_source(File::from(p)),
            None => builder.add_source(File::with_name("config/default").required(false)),
        };

        builder
            .add_source(Environment::with_prefix("SCALPEX").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.risk.max_positions, 3);
        assert_eq!(cfg.risk.max_exposure_fraction, dec!(0.10));
        assert_eq!(cfg.risk.tp_milestones.len(), cfg.risk.tp_fractions.len());
        let total: Decimal = cfg.risk.tp_fractions.iter().sum();
        assert!(total <= dec!(1.0));
    }

    #[test]
    fn weights_sum_to_one() {
        let w = SourceWeights::default();
        let sum = w.rsi + w.ema + w.bollinger + w.vwap + w.order_flow;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
