//! Divergence detection under a cooldown.

use crate::prices::PriceStore;
use chrono::{DateTime, Duration, Utc};
use polymarket_core::types::{Instrument, MarketPair, OutcomeSide, PriceSource};
use rust_decimal::Decimal;
use serde::Serialize;

/// The feed prices a side above the exchange by at least the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub instrument: Instrument,
    pub feed_price: Decimal,
    pub market_price: Decimal,
    /// `feed_price - market_price`
    pub difference: Decimal,
}

#[derive(Debug, Clone)]
pub struct OpportunityDetector {
    market: MarketPair,
    threshold: Decimal,
    cooldown: Duration,
    last_signal_time: Option<DateTime<Utc>>,
}

impl OpportunityDetector {
    pub fn new(market: MarketPair, threshold: Decimal, cooldown: Duration) -> Self {
        Self {
            market,
            threshold,
            cooldown,
            last_signal_time: None,
        }
    }

    pub fn market(&self) -> &MarketPair {
        &self.market
    }

    pub fn last_signal_time(&self) -> Option<DateTime<Utc>> {
        self.last_signal_time
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.last_signal_time
            .is_some_and(|last| now - last < self.cooldown)
    }

    /// First qualifying side, UP before DOWN. At most one signal per call and
    /// none during the cooldown.
    pub fn check(&self, prices: &PriceStore, now: DateTime<Utc>) -> Option<Signal> {
        if self.in_cooldown(now) {
            return None;
        }

        OutcomeSide::ALL.iter().find_map(|&side| {
            let feed_price = prices.get_price(PriceSource::Feed, side);
            let market_price = prices.get_price(PriceSource::Market, side);
            if feed_price <= Decimal::ZERO || market_price <= Decimal::ZERO {
                return None;
            }
            let difference = feed_price - market_price;
            (difference >= self.threshold).then(|| Signal {
                instrument: self.market.instrument(side).clone(),
                feed_price,
                market_price,
                difference,
            })
        })
    }

    /// Start the cooldown for a signal that was traded.
    pub fn mark_acted(&mut self, now: DateTime<Utc>) {
        self.last_signal_time = Some(now);
    }

    /// After a failed entry, allow the next signal after half the cooldown.
    pub fn recover_partial(&mut self, now: DateTime<Utc>) {
        self.last_signal_time = Some(now - self.cooldown / 2);
    }
}
