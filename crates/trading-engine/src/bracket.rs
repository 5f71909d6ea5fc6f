//! Bracket execution: an entry order followed by take-profit and stop-loss
//! exits of the same size.

use chrono::{DateTime, Utc};
use polymarket_core::config::ArbSettings;
use polymarket_core::orders::OrderPlacer;
use polymarket_core::types::{
    is_probability, round_to_tick, Instrument, OrderRequest, MAX_PRICE, MIN_PRICE,
};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BracketConfig {
    /// USDC committed per entry.
    pub notional: Decimal,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    /// Entry limit premium over the observed price, e.g. 0.01 = 1%.
    pub slippage: Decimal,
    /// Wait between the entry and the exit orders.
    pub settle_delay: Duration,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            notional: Decimal::new(5, 0),
            take_profit: Decimal::new(1, 2),
            stop_loss: Decimal::new(5, 3),
            slippage: Decimal::new(1, 2),
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl BracketConfig {
    pub fn from_settings(settings: &ArbSettings) -> Self {
        Self {
            notional: settings.default_trade_amount,
            take_profit: settings.take_profit_amount,
            stop_loss: settings.stop_loss_amount,
            settle_delay: settings.settle_delay(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum BracketError {
    #[error("entry price {0} outside (0, 1]")]
    InvalidPrice(Decimal),

    #[error("notional {notional} buys less than 0.01 shares at {price}")]
    SizeTooSmall { notional: Decimal, price: Decimal },

    #[error("entry order rejected: {0}")]
    EntryRejected(#[source] polymarket_core::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketStatus {
    Active,
    Closed,
    Failed,
}

/// A placed entry and whichever exit legs were accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketTrade {
    pub id: Uuid,
    pub instrument: Instrument,
    pub entry_order_id: String,
    pub take_profit_order_id: Option<String>,
    pub stop_loss_order_id: Option<String>,
    /// Observed market price the bracket is built around.
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_price: Decimal,
    pub size: Decimal,
    pub notional: Decimal,
    pub created_at: DateTime<Utc>,
    pub status: BracketStatus,
    /// Set when an exit leg is missing and needs manual follow-up.
    pub needs_reconciliation: bool,
}

/// The three orders of a bracket, computed before anything is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPlan {
    pub entry_price: Decimal,
    pub size: Decimal,
    pub entry: OrderRequest,
    pub take_profit: OrderRequest,
    pub stop_loss: OrderRequest,
}

impl BracketPlan {
    pub fn new(
        config: &BracketConfig,
        instrument: &Instrument,
        entry_price: Decimal,
    ) -> Result<Self, BracketError> {
        if !is_probability(entry_price) {
            return Err(BracketError::InvalidPrice(entry_price));
        }

        let size = (config.notional / entry_price)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);
        if size <= Decimal::ZERO {
            return Err(BracketError::SizeTooSmall {
                notional: config.notional,
                price: entry_price,
            });
        }

        let limit = round_to_tick((entry_price * (Decimal::ONE + config.slippage)).min(MAX_PRICE));
        // Exits sit at exact offsets from the entry, even off-tick.
        let target = (entry_price + config.take_profit).min(MAX_PRICE);
        let stop = (entry_price - config.stop_loss).max(MIN_PRICE);

        let token_id = instrument.token_id.as_str();
        Ok(Self {
            entry_price,
            size,
            entry: OrderRequest::buy(token_id, limit, size),
            take_profit: OrderRequest::sell(token_id, target, size),
            stop_loss: OrderRequest::sell(token_id, stop, size),
        })
    }
}

/// Places brackets and keeps the in-memory trade ledger.
pub struct BracketExecutor {
    placer: Arc<dyn OrderPlacer>,
    config: BracketConfig,
    trades: Vec<BracketTrade>,
}

impl BracketExecutor {
    pub fn new(placer: Arc<dyn OrderPlacer>, config: BracketConfig) -> Self {
        Self {
            placer,
            config,
            trades: Vec::new(),
        }
    }

    pub fn config(&self) -> &BracketConfig {
        &self.config
    }

    pub fn trades(&self) -> &[BracketTrade] {
        &self.trades
    }

    /// Enter at `entry_price` and attach both exits.
    ///
    /// Fails only when the entry cannot be placed; exit failures are recorded
    /// on the returned trade instead. The entry is never rolled back.
    pub async fn execute(
        &mut self,
        instrument: &Instrument,
        entry_price: Decimal,
    ) -> Result<BracketTrade, BracketError> {
        let plan = BracketPlan::new(&self.config, instrument, entry_price)?;
        info!(
            token_id = %instrument.token_id,
            side = %instrument.side,
            limit = %plan.entry.price,
            size = %plan.size,
            "Placing bracket entry"
        );

        let entry = self
            .placer
            .place_order(&plan.entry)
            .await
            .map_err(BracketError::EntryRejected)?;
        info!(order_id = %entry.order_id, "Entry accepted");

        tokio::time::sleep(self.config.settle_delay).await;

        let take_profit_order_id = self.place_exit("take-profit", &plan.take_profit).await;
        let stop_loss_order_id = self.place_exit("stop-loss", &plan.stop_loss).await;

        let status = if take_profit_order_id.is_none() && stop_loss_order_id.is_none() {
            BracketStatus::Failed
        } else {
            BracketStatus::Active
        };
        let needs_reconciliation = take_profit_order_id.is_none() || stop_loss_order_id.is_none();
        if needs_reconciliation {
            error!(
                token_id = %instrument.token_id,
                entry_order_id = %entry.order_id,
                "Bracket exit missing, position needs reconciliation"
            );
        }

        let trade = BracketTrade {
            id: Uuid::new_v4(),
            instrument: instrument.clone(),
            entry_order_id: entry.order_id,
            take_profit_order_id,
            stop_loss_order_id,
            entry_price: plan.entry_price,
            target_price: plan.take_profit.price,
            stop_price: plan.stop_loss.price,
            size: plan.size,
            notional: self.config.notional,
            created_at: Utc::now(),
            status,
            needs_reconciliation,
        };
        info!(
            trade_id = %trade.id,
            entry = %trade.entry_price,
            target = %trade.target_price,
            stop = %trade.stop_price,
            size = %trade.size,
            status = ?trade.status,
            "Bracket recorded"
        );
        self.trades.push(trade.clone());
        Ok(trade)
    }

    async fn place_exit(&self, leg: &str, request: &OrderRequest) -> Option<String> {
        match self.placer.place_order(request).await {
            Ok(placed) => {
                info!(leg = leg, order_id = %placed.order_id, price = %request.price, "Exit placed");
                Some(placed.order_id)
            }
            Err(e) => {
                warn!(leg = leg, price = %request.price, error = %e, "Exit order failed");
                None
            }
        }
    }

    /// Close an active trade after an exit fill was observed.
    pub fn mark_closed(&mut self, trade_id: Uuid) -> bool {
        match self.trades.iter_mut().find(|t| t.id == trade_id) {
            Some(trade) if trade.status == BracketStatus::Active => {
                trade.status = BracketStatus::Closed;
                true
            }
            _ => false,
        }
    }

    pub fn active_trades(&self) -> impl Iterator<Item = &BracketTrade> {
        self.trades
            .iter()
            .filter(|t| t.status == BracketStatus::Active)
    }
}
