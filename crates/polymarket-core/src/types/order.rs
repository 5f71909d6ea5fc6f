//! Order types for trading execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Numeric encoding used by the CTF exchange contract.
    pub fn as_u8(self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Time in force for submitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Good-till-cancelled limit order.
    #[default]
    Gtc,
    /// Fill-or-kill order.
    Fok,
}

/// A limit order to be placed on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub price: Decimal,
    /// Size in outcome shares.
    pub size: Decimal,
    pub side: OrderSide,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn buy(token_id: impl Into<String>, price: Decimal, size: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            price,
            size,
            side: OrderSide::Buy,
            order_type: OrderType::Gtc,
        }
    }

    pub fn sell(token_id: impl Into<String>, price: Decimal, size: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            price,
            size,
            side: OrderSide::Sell,
            order_type: OrderType::Gtc,
        }
    }

    /// USDC value of the order at its limit price.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    /// Exchange status, e.g. "live" or "matched".
    pub status: String,
    pub transaction_hash: Option<String>,
}
