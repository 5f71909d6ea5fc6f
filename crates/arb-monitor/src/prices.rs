//! Latest price per side and source.

use crate::feed::PriceUpdate;
use chrono::{DateTime, Utc};
use polymarket_core::types::{is_probability, mid_price, OutcomeSide, PriceSource, ReconciledPrice};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::warn;

/// Last-write-wins price table. No history is kept.
#[derive(Debug, Default)]
pub struct PriceStore {
    prices: HashMap<(PriceSource, OutcomeSide), ReconciledPrice>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a price. Values outside (0, 1] are rejected and the previous
    /// value is kept.
    pub fn set_price(
        &mut self,
        source: PriceSource,
        side: OutcomeSide,
        value: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        if !is_probability(value) {
            warn!(?source, side = %side, value = %value, "Rejecting out-of-range price");
            return false;
        }
        self.prices.insert(
            (source, side),
            ReconciledPrice {
                value,
                observed_at: now,
            },
        );
        true
    }

    /// Last value, or zero when nothing has been observed.
    pub fn get_price(&self, source: PriceSource, side: OutcomeSide) -> Decimal {
        self.prices
            .get(&(source, side))
            .map(|p| p.value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Record the mid of a book top as the market price. Crossed or
    /// out-of-range books are ignored.
    pub fn set_book(
        &mut self,
        side: OutcomeSide,
        best_bid: Decimal,
        best_ask: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        match mid_price(best_bid, best_ask) {
            Some(mid) => self.set_price(PriceSource::Market, side, mid, now),
            None => {
                warn!(
                    side = %side,
                    best_bid = %best_bid,
                    best_ask = %best_ask,
                    "Ignoring invalid book top"
                );
                false
            }
        }
    }

    pub fn apply(&mut self, update: &PriceUpdate, now: DateTime<Utc>) -> bool {
        match *update {
            PriceUpdate::Feed { side, value } => self.set_price(PriceSource::Feed, side, value, now),
            PriceUpdate::Book {
                side,
                best_bid,
                best_ask,
            } => self.set_book(side, best_bid, best_ask, now),
            PriceUpdate::Last { side, price } => {
                self.set_price(PriceSource::Market, side, price, now)
            }
        }
    }
}
