//! Order sizing and submission for replicated trades.

use crate::copy_trader::ReplicationAction;
use anyhow::{anyhow, bail, Result};
use polymarket_core::orders::OrderPlacer;
use polymarket_core::types::{
    clamp_limit_price, is_probability, round_to_tick, ActivityRecord, OrderRequest, PlacedOrder,
    PositionSnapshot, MAX_PRICE,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{error, info};

/// Smallest order the exchange accepts, in USDC.
pub const MIN_ORDER_USDC: Decimal = Decimal::ONE;

/// Everything known about one source trade at execution time.
#[derive(Debug, Clone)]
pub struct ReplicationContext<'a> {
    pub record: &'a ActivityRecord,
    pub my_position: Option<&'a PositionSnapshot>,
    pub user_position: Option<&'a PositionSnapshot>,
    pub my_balance: Decimal,
    pub user_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationOutcome {
    Placed(PlacedOrder),
    /// Nothing to do for this trade; the reason is logged.
    Skipped(String),
}

pub struct ReplicationExecutor {
    placer: Arc<dyn OrderPlacer>,
    /// Premium paid over the source price on buys.
    slippage: Decimal,
}

impl ReplicationExecutor {
    pub fn new(placer: Arc<dyn OrderPlacer>) -> Self {
        Self {
            placer,
            slippage: Decimal::new(1, 2),
        }
    }

    pub async fn execute(
        &self,
        action: &ReplicationAction,
        ctx: &ReplicationContext<'_>,
    ) -> Result<ReplicationOutcome> {
        let request = match action {
            ReplicationAction::Buy => self.buy_order(ctx)?,
            ReplicationAction::Sell => sell_order(ctx)?,
            ReplicationAction::Merge => merge_order(ctx)?,
            ReplicationAction::Other(name) => {
                error!(
                    tx_hash = %ctx.record.transaction_hash,
                    action = %name,
                    "Unrecognized replication action"
                );
                bail!("unrecognized replication action '{}'", name);
            }
        };

        let request = match request {
            Ok(request) => request,
            Err(reason) => {
                info!(tx_hash = %ctx.record.transaction_hash, reason = %reason, "Skipping trade");
                return Ok(ReplicationOutcome::Skipped(reason));
            }
        };

        info!(
            tx_hash = %ctx.record.transaction_hash,
            side = %request.side,
            token_id = %request.token_id,
            price = %request.price,
            size = %request.size,
            "Replicating trade"
        );
        let placed = self.placer.place_order(&request).await?;
        Ok(ReplicationOutcome::Placed(placed))
    }

    /// Spend the same share of our balance as the source spent of theirs.
    fn buy_order(&self, ctx: &ReplicationContext<'_>) -> Result<Result<OrderRequest, String>> {
        let record = ctx.record;
        let price = source_price(record)?;

        let denominator = ctx.user_balance + record.usdc_size;
        if denominator <= Decimal::ZERO {
            return Ok(Err("source balance and trade size are zero".to_string()));
        }
        let ratio = ctx.my_balance / denominator;
        let amount = (record.usdc_size * ratio).min(ctx.my_balance);
        if amount < MIN_ORDER_USDC {
            return Ok(Err(format!(
                "buy amount {} below the {} USDC minimum",
                amount.round_dp(4),
                MIN_ORDER_USDC
            )));
        }

        let limit = round_to_tick((price * (Decimal::ONE + self.slippage)).min(MAX_PRICE));
        let size = round_shares(amount / limit);
        if size <= Decimal::ZERO {
            return Ok(Err(format!("buy amount {} rounds to zero shares", amount)));
        }
        Ok(Ok(OrderRequest::buy(&record.asset, limit, size)))
    }
}

/// Sell the same fraction of our position as the source sold of theirs.
fn sell_order(ctx: &ReplicationContext<'_>) -> Result<Result<OrderRequest, String>> {
    let record = ctx.record;
    let price = source_price(record)?;
    let Some(my_position) = ctx.my_position.filter(|p| p.size > Decimal::ZERO) else {
        return Ok(Err("no local position to sell".to_string()));
    };

    let user_size = ctx.user_position.map(|p| p.size).unwrap_or(Decimal::ZERO);
    let denominator = user_size + record.size;
    if denominator <= Decimal::ZERO {
        return Ok(Err("source trade has no size".to_string()));
    }
    let ratio = record.size / denominator;
    let size = round_shares((my_position.size * ratio).min(my_position.size));
    if size <= Decimal::ZERO {
        return Ok(Err("sell size rounds to zero".to_string()));
    }
    Ok(Ok(OrderRequest::sell(
        &my_position.asset,
        clamp_limit_price(price),
        size,
    )))
}

/// The source has exited the condition: close our whole position.
fn merge_order(ctx: &ReplicationContext<'_>) -> Result<Result<OrderRequest, String>> {
    let record = ctx.record;
    let price = source_price(record)?;
    let Some(my_position) = ctx.my_position.filter(|p| p.size > Decimal::ZERO) else {
        return Ok(Err("no local position to merge".to_string()));
    };
    let size = round_shares(my_position.size);
    if size <= Decimal::ZERO {
        return Ok(Err("position rounds to zero shares".to_string()));
    }
    Ok(Ok(OrderRequest::sell(
        &my_position.asset,
        clamp_limit_price(price),
        size,
    )))
}

fn source_price(record: &ActivityRecord) -> Result<Decimal> {
    if is_probability(record.price) {
        Ok(record.price)
    } else {
        Err(anyhow!(
            "trade {} has price {} outside (0, 1]",
            record.transaction_hash,
            record.price
        ))
    }
}

fn round_shares(size: Decimal) -> Decimal {
    size.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::orders::PaperOrderPlacer;
    use polymarket_core::types::{OrderSide, WalletActivity};

    fn record(side: &str, price: Decimal, size: Decimal, usdc_size: Decimal) -> ActivityRecord {
        ActivityRecord::from_activity(WalletActivity {
            transaction_hash: "0xabc".to_string(),
            proxy_wallet: "0xsource".to_string(),
            activity_type: "TRADE".to_string(),
            side: side.to_string(),
            condition_id: "0xcond".to_string(),
            asset: "111".to_string(),
            outcome: Some("Up".to_string()),
            price,
            size,
            usdc_size,
            timestamp: 1_700_000_000,
        })
    }

    fn position(size: Decimal) -> PositionSnapshot {
        PositionSnapshot {
            condition_id: "0xcond".to_string(),
            asset: "111".to_string(),
            size,
            avg_price: Decimal::new(5, 1),
            current_value: size / Decimal::TWO,
        }
    }

    fn ctx<'a>(
        record: &'a ActivityRecord,
        my_position: Option<&'a PositionSnapshot>,
        user_position: Option<&'a PositionSnapshot>,
        my_balance: Decimal,
        user_balance: Decimal,
    ) -> ReplicationContext<'a> {
        ReplicationContext {
            record,
            my_position,
            user_position,
            my_balance,
            user_balance,
        }
    }

    #[tokio::test]
    async fn test_buy_scales_by_balance_ratio() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        // Source spent 100 of 900 (+100); we hold 100 → spend 10.
        let trade = record("BUY", Decimal::new(5, 1), Decimal::new(200, 0), Decimal::new(100, 0));
        let context = ctx(&trade, None, None, Decimal::new(100, 0), Decimal::new(900, 0));

        let outcome = executor.execute(&ReplicationAction::Buy, &context).await.unwrap();
        assert!(matches!(outcome, ReplicationOutcome::Placed(_)));

        let orders = placer.placed().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert_eq!(orders[0].price, Decimal::new(505, 3));
        // 10 / 0.505 = 19.80..
        assert_eq!(orders[0].size, Decimal::new(1980, 2));
    }

    #[tokio::test]
    async fn test_buy_below_minimum_is_skipped() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        let trade = record("BUY", Decimal::new(5, 1), Decimal::new(10, 0), Decimal::new(5, 0));
        let context = ctx(&trade, None, None, Decimal::new(10, 0), Decimal::new(1000, 0));

        let outcome = executor.execute(&ReplicationAction::Buy, &context).await.unwrap();
        assert!(matches!(outcome, ReplicationOutcome::Skipped(_)));
        assert!(placer.placed().await.is_empty());
    }

    #[tokio::test]
    async fn test_sell_proportional_to_source_exit() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        // Source sold 50 and kept 50: sell half of our 30.
        let trade = record("SELL", Decimal::new(6, 1), Decimal::new(50, 0), Decimal::new(30, 0));
        let mine = position(Decimal::new(30, 0));
        let theirs = position(Decimal::new(50, 0));
        let context = ctx(&trade, Some(&mine), Some(&theirs), Decimal::ZERO, Decimal::ZERO);

        executor.execute(&ReplicationAction::Sell, &context).await.unwrap();
        let orders = placer.placed().await;
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[0].size, Decimal::new(15, 0));
        assert_eq!(orders[0].price, Decimal::new(6, 1));
    }

    #[tokio::test]
    async fn test_sell_without_position_is_skipped() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        let trade = record("SELL", Decimal::new(6, 1), Decimal::new(50, 0), Decimal::new(30, 0));
        let context = ctx(&trade, None, None, Decimal::ZERO, Decimal::ZERO);

        let outcome = executor.execute(&ReplicationAction::Sell, &context).await.unwrap();
        assert!(matches!(outcome, ReplicationOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_merge_sells_everything() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        let trade = record("MERGE", Decimal::new(45, 2), Decimal::new(10, 0), Decimal::ZERO);
        let mine = position(Decimal::new(1234, 2));
        let context = ctx(&trade, Some(&mine), None, Decimal::ZERO, Decimal::ZERO);

        executor.execute(&ReplicationAction::Merge, &context).await.unwrap();
        let orders = placer.placed().await;
        assert_eq!(orders[0].size, Decimal::new(1234, 2));
        assert_eq!(orders[0].price, Decimal::new(45, 2));
    }

    #[tokio::test]
    async fn test_unrecognized_action_is_an_error() {
        let placer = Arc::new(PaperOrderPlacer::new());
        let executor = ReplicationExecutor::new(placer.clone());
        let trade = record("REDEEM", Decimal::new(5, 1), Decimal::ONE, Decimal::ONE);
        let context = ctx(&trade, None, None, Decimal::ZERO, Decimal::ZERO);

        let result = executor
            .execute(&ReplicationAction::Other("redeem".to_string()), &context)
            .await;
        assert!(result.is_err());
        assert!(placer.placed().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_source_price_is_an_error() {
        let executor = ReplicationExecutor::new(Arc::new(PaperOrderPlacer::new()));
        let trade = record("BUY", Decimal::ZERO, Decimal::ONE, Decimal::ONE);
        let context = ctx(&trade, None, None, Decimal::new(100, 0), Decimal::new(100, 0));
        assert!(executor
            .execute(&ReplicationAction::Buy, &context)
            .await
            .is_err());
    }
}
