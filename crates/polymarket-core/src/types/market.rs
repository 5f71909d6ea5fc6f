//! Market-related types for Polymarket data.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum price increment accepted by the exchange.
pub const PRICE_TICK: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// Highest price a limit order may carry.
pub const MAX_PRICE: Decimal = Decimal::from_parts(99, 0, 0, false, 2); // 0.99

/// Lowest price a limit order may carry.
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Which outcome of a binary up/down market an instrument represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    Up,
    Down,
}

impl OutcomeSide {
    /// Evaluation order used when scanning for opportunities.
    pub const ALL: [OutcomeSide; 2] = [OutcomeSide::Up, OutcomeSide::Down];
}

impl fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeSide::Up => write!(f, "UP"),
            OutcomeSide::Down => write!(f, "DOWN"),
        }
    }
}

/// A tradable outcome token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub token_id: String,
    pub side: OutcomeSide,
}

/// The two outcome tokens of the market currently being traded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPair {
    pub condition_id: String,
    pub question: String,
    pub up: Instrument,
    pub down: Instrument,
}

impl MarketPair {
    pub fn instrument(&self, side: OutcomeSide) -> &Instrument {
        match side {
            OutcomeSide::Up => &self.up,
            OutcomeSide::Down => &self.down,
        }
    }

    /// Find the side a token id belongs to.
    pub fn side_of(&self, token_id: &str) -> Option<OutcomeSide> {
        if self.up.token_id == token_id {
            Some(OutcomeSide::Up)
        } else if self.down.token_id == token_id {
            Some(OutcomeSide::Down)
        } else {
            None
        }
    }

    pub fn token_ids(&self) -> Vec<String> {
        vec![self.up.token_id.clone(), self.down.token_id.clone()]
    }
}

/// Origin of a reconciled price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// External probability feed.
    Feed,
    /// Exchange order book.
    Market,
}

/// Latest observed price for one instrument from one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciledPrice {
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Real-time order book for one outcome token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub asset_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Returns the best bid price (highest buy order).
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Returns the best ask price (lowest sell order).
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }
}

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// True when `value` lies in the probability range (0, 1].
pub fn is_probability(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}

/// Mid price of a book top, accepted only when `0 < bid <= ask <= 1`.
pub fn mid_price(best_bid: Decimal, best_ask: Decimal) -> Option<Decimal> {
    if best_bid > Decimal::ZERO && best_bid <= best_ask && best_ask <= Decimal::ONE {
        Some((best_bid + best_ask) / Decimal::TWO)
    } else {
        None
    }
}

/// Round a price to the exchange tick.
pub fn round_to_tick(price: Decimal) -> Decimal {
    (price / PRICE_TICK).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        * PRICE_TICK
}

/// Clamp a limit price into `[MIN_PRICE, MAX_PRICE]` and round it to the tick.
pub fn clamp_limit_price(price: Decimal) -> Decimal {
    round_to_tick(price.max(MIN_PRICE).min(MAX_PRICE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> MarketPair {
        MarketPair {
            condition_id: "0xcond".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            up: Instrument {
                token_id: "111".to_string(),
                side: OutcomeSide::Up,
            },
            down: Instrument {
                token_id: "222".to_string(),
                side: OutcomeSide::Down,
            },
        }
    }

    #[test]
    fn test_side_lookup() {
        let pair = pair();
        assert_eq!(pair.side_of("111"), Some(OutcomeSide::Up));
        assert_eq!(pair.side_of("222"), Some(OutcomeSide::Down));
        assert_eq!(pair.side_of("333"), None);
        assert_eq!(pair.instrument(OutcomeSide::Down).token_id, "222");
    }

    #[test]
    fn test_mid_price_rule() {
        assert_eq!(
            mid_price(Decimal::new(59, 2), Decimal::new(61, 2)),
            Some(Decimal::new(60, 2))
        );
        // Crossed book
        assert_eq!(mid_price(Decimal::new(62, 2), Decimal::new(61, 2)), None);
        // Zero bid
        assert_eq!(mid_price(Decimal::ZERO, Decimal::new(61, 2)), None);
        // Ask above one
        assert_eq!(mid_price(Decimal::new(99, 2), Decimal::new(101, 2)), None);
        // Locked book at the boundary is fine
        assert_eq!(mid_price(Decimal::ONE, Decimal::ONE), Some(Decimal::ONE));
    }

    #[test]
    fn test_round_to_tick() {
        assert_eq!(round_to_tick(Decimal::new(606, 3)), Decimal::new(606, 3));
        assert_eq!(round_to_tick(Decimal::new(33633, 5)), Decimal::new(336, 3));
        assert_eq!(round_to_tick(Decimal::new(12345, 5)), Decimal::new(123, 3));
        assert_eq!(clamp_limit_price(Decimal::new(101, 2)), MAX_PRICE);
        assert_eq!(clamp_limit_price(Decimal::new(-5, 3)), MIN_PRICE);
    }

    #[test]
    fn test_is_probability() {
        assert!(is_probability(Decimal::ONE));
        assert!(is_probability(Decimal::new(1, 3)));
        assert!(!is_probability(Decimal::ZERO));
        assert!(!is_probability(Decimal::new(1001, 3)));
    }
}
