use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Direction;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that opens a position in `direction`.
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Short => Side::Sell,
            _ => Side::Buy,
        }
    }

    /// The side that reduces or closes a position in `direction`.
    pub fn closing(direction: Direction) -> Self {
        Self::opening(direction).flip()
    }

    pub fn flip(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// What an order intent does to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Entry,
    Reduce,
    Close,
}

/// Outbound order intent for the execution gateway.
///
/// The correlation id is client-assigned and echoed back on the fill
/// confirmation, which is how fills are matched to intents (and how
/// re-delivered fills are deduplicated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub correlation_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub kind: IntentKind,
    /// Quote-currency notional
    pub size: Decimal,
    /// Limit price for entries/reductions; None for market closes
    pub price: Option<Decimal>,
}

impl OrderIntent {
    pub fn entry(symbol: impl Into<String>, direction: Direction, size: Decimal, price: Decimal) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: Side::opening(direction),
            kind: IntentKind::Entry,
            size,
            price: Some(price),
        }
    }

    pub fn reduce(symbol: impl Into<String>, direction: Direction, size: Decimal, price: Decimal) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: Side::closing(direction),
            kind: IntentKind::Reduce,
            size,
            price: Some(price),
        }
    }

    pub fn close(symbol: impl Into<String>, direction: Direction, size: Decimal) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: Side::closing(direction),
            kind: IntentKind::Close,
            size,
            price: None,
        }
    }
}

/// Inbound acknowledgment that an intent executed on the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfirmation {
    pub correlation_id: Uuid,
    pub symbol: String,
    pub fill_price: Decimal,
    /// Quote-currency notional filled
    pub filled_size: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sides_mirror_direction() {
        assert_eq!(Side::opening(Direction::Long), Side::Buy);
        assert_eq!(Side::opening(Direction::Short), Side::Sell);
        assert_eq!(Side::closing(Direction::Long), Side::Sell);
        assert_eq!(Side::closing(Direction::Short), Side::Buy);
    }

    #[test]
    fn close_intent_is_market() {
        let intent = OrderIntent::close("BTCUSDT", Direction::Long, dec!(1000));
        assert_eq!(intent.kind, IntentKind::Close);
        assert_eq!(intent.side, Side::Sell);
        assert!(intent.price.is_none());
    }
}
