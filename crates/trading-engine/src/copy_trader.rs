//! Replication of a source wallet's trades.
//!
//! Each cycle walks the unprocessed activity records in insertion order,
//! classifies what the local wallet should do from the trade side and both
//! wallets' positions, and executes it. A record that errors is forced out
//! of the retry pool so one poisoned trade cannot stall the batch.

use crate::executor::{ReplicationContext, ReplicationExecutor, ReplicationOutcome};
use anyhow::Result;
use polymarket_core::api::{BalanceSource, WalletDataSource};
use polymarket_core::db::ActivityStore;
use polymarket_core::schedule::Ticker;
use polymarket_core::types::{ActivityRecord, PositionSnapshot};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the local wallet does in response to a source trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationAction {
    Buy,
    Sell,
    /// The source left a condition we still hold.
    Merge,
    /// Unrecognized source side, lower-cased.
    Other(String),
}

impl fmt::Display for ReplicationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationAction::Buy => write!(f, "buy"),
            ReplicationAction::Sell => write!(f, "sell"),
            ReplicationAction::Merge => write!(f, "merge"),
            ReplicationAction::Other(side) => write!(f, "{}", side),
        }
    }
}

/// Classify a source trade.
///
/// BUY and SELL map directly. Any other side is a merge when we hold the
/// condition and the source no longer does. Otherwise the lower-cased side
/// is the action, so a MERGE side still merges.
pub fn classify(
    record: &ActivityRecord,
    my_position: Option<&PositionSnapshot>,
    user_position: Option<&PositionSnapshot>,
) -> ReplicationAction {
    let side = record.side.trim();
    if side.eq_ignore_ascii_case("BUY") {
        return ReplicationAction::Buy;
    }
    if side.eq_ignore_ascii_case("SELL") {
        return ReplicationAction::Sell;
    }

    let held = |p: Option<&PositionSnapshot>| p.is_some_and(|p| p.size > Decimal::ZERO);
    if held(my_position) && !held(user_position) {
        return ReplicationAction::Merge;
    }
    match side.to_lowercase() {
        action if action == "merge" => ReplicationAction::Merge,
        action => ReplicationAction::Other(action),
    }
}

/// Totals for one replication cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub placed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct CopyTrader {
    store: Arc<dyn ActivityStore>,
    data: Arc<dyn WalletDataSource>,
    balances: Arc<dyn BalanceSource>,
    executor: ReplicationExecutor,
    /// Wallet being copied.
    user_address: String,
    /// Local wallet placing the copies.
    proxy_wallet: String,
    retry_limit: i32,
}

impl CopyTrader {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        data: Arc<dyn WalletDataSource>,
        balances: Arc<dyn BalanceSource>,
        executor: ReplicationExecutor,
        user_address: &str,
        proxy_wallet: &str,
        retry_limit: i32,
    ) -> Self {
        Self {
            store,
            data,
            balances,
            executor,
            user_address: user_address.to_lowercase(),
            proxy_wallet: proxy_wallet.to_lowercase(),
            retry_limit,
        }
    }

    /// Process every pending record once.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let pending = self.store.pending(self.retry_limit).await?;
        let mut report = CycleReport::default();
        if pending.is_empty() {
            return Ok(report);
        }
        debug!(count = pending.len(), "Replicating pending trades");

        for record in &pending {
            let (processed, attempts) = match self.replicate(record).await {
                Ok(ReplicationOutcome::Placed(order)) => {
                    info!(
                        tx_hash = %record.transaction_hash,
                        order_id = %order.order_id,
                        "Trade replicated"
                    );
                    report.placed += 1;
                    (true, record.bot_attempts + 1)
                }
                Ok(ReplicationOutcome::Skipped(_)) => {
                    report.skipped += 1;
                    (true, record.bot_attempts + 1)
                }
                Err(e) => {
                    error!(
                        tx_hash = %record.transaction_hash,
                        attempt = record.bot_attempts + 1,
                        error = %e,
                        "Replication failed, removing record from retry pool"
                    );
                    report.failed += 1;
                    (true, self.retry_limit)
                }
            };

            if let Err(e) = self
                .store
                .mark_attempt(&record.transaction_hash, processed, attempts)
                .await
            {
                error!(
                    tx_hash = %record.transaction_hash,
                    error = %e,
                    "Failed to update activity record"
                );
            }
        }

        Ok(report)
    }

    async fn replicate(&self, record: &ActivityRecord) -> Result<ReplicationOutcome> {
        let my_positions = self.data.positions(&self.proxy_wallet).await;
        let user_positions = self.data.positions(&self.user_address).await;
        let my_position = find_position(&my_positions, &record.condition_id);
        let user_position = find_position(&user_positions, &record.condition_id);

        let my_balance = self.balances.usdc_balance(&self.proxy_wallet).await;
        let user_balance = self.balances.usdc_balance(&self.user_address).await;

        let action = classify(record, my_position, user_position);
        info!(
            tx_hash = %record.transaction_hash,
            condition_id = %record.condition_id,
            action = %action,
            my_balance = %my_balance,
            user_balance = %user_balance,
            "Classified source trade"
        );

        let ctx = ReplicationContext {
            record,
            my_position,
            user_position,
            my_balance,
            user_balance,
        };
        self.executor.execute(&action, &ctx).await
    }

    /// Run cycles until the ticker finishes.
    pub async fn run(&self, mut ticker: Ticker) {
        while ticker.tick().await {
            if let Err(e) = self.run_cycle().await {
                warn!(error = %e, "Replication cycle failed");
            }
        }
    }
}

fn find_position<'a>(
    positions: &'a [PositionSnapshot],
    condition_id: &str,
) -> Option<&'a PositionSnapshot> {
    positions.iter().find(|p| p.condition_id == condition_id)
}
