//! Persisted source-wallet trades awaiting replication.

use crate::types::ActivityRecord;
use crate::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Storage contract for replicated activity.
///
/// `transaction_hash` is unique: inserting a known hash is a no-op.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Every transaction hash already persisted.
    async fn known_hashes(&self) -> Result<HashSet<String>>;

    /// Insert a new record. Returns `false` when the hash already exists.
    async fn insert(&self, record: &ActivityRecord) -> Result<bool>;

    /// Unprocessed records under the retry limit, in insertion order.
    async fn pending(&self, retry_limit: i32) -> Result<Vec<ActivityRecord>>;

    /// Update the replication bookkeeping of one record.
    async fn mark_attempt(&self, transaction_hash: &str, processed: bool, attempts: i32)
        -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

/// PostgreSQL-backed activity store scoped to one source wallet.
pub struct PgActivityRepository {
    pool: PgPool,
    source_wallet: String,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool, source_wallet: &str) -> Self {
        Self {
            pool,
            source_wallet: source_wallet.to_lowercase(),
        }
    }

    fn row_to_record(r: &sqlx::postgres::PgRow) -> ActivityRecord {
        ActivityRecord {
            transaction_hash: r.get("transaction_hash"),
            proxy_wallet: r.get("proxy_wallet"),
            condition_id: r.get("condition_id"),
            asset: r.get("asset"),
            side: r.get("side"),
            outcome: r.get("outcome"),
            price: r.get("price"),
            size: r.get("size"),
            usdc_size: r.get("usdc_size"),
            timestamp: r.get("timestamp"),
            bot_processed: r.get("bot_processed"),
            bot_attempts: r.get("bot_attempts"),
            created_at: r.get("created_at"),
        }
    }
}

#[async_trait]
impl ActivityStore for PgActivityRepository {
    async fn known_hashes(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_hash
            FROM user_activities
            WHERE source_wallet = $1
            "#,
        )
        .bind(&self.source_wallet)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| r.get::<String, _>("transaction_hash"))
            .collect())
    }

    async fn insert(&self, record: &ActivityRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_activities (
                transaction_hash, source_wallet, proxy_wallet, condition_id, asset,
                side, outcome, price, size, usdc_size, timestamp,
                bot_processed, bot_attempts, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (transaction_hash) DO NOTHING
            "#,
        )
        .bind(&record.transaction_hash)
        .bind(&self.source_wallet)
        .bind(&record.proxy_wallet)
        .bind(&record.condition_id)
        .bind(&record.asset)
        .bind(&record.side)
        .bind(&record.outcome)
        .bind(record.price)
        .bind(record.size)
        .bind(record.usdc_size)
        .bind(record.timestamp)
        .bind(record.bot_processed)
        .bind(record.bot_attempts)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn pending(&self, retry_limit: i32) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT
                transaction_hash, proxy_wallet, condition_id, asset, side, outcome,
                price, size, usdc_size, timestamp, bot_processed, bot_attempts, created_at
            FROM user_activities
            WHERE source_wallet = $1
              AND bot_processed = FALSE
              AND bot_attempts < $2
            ORDER BY id ASC
            "#,
        )
        .bind(&self.source_wallet)
        .bind(retry_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn mark_attempt(
        &self,
        transaction_hash: &str,
        processed: bool,
        attempts: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_activities
            SET bot_processed = $2, bot_attempts = $3, updated_at = NOW()
            WHERE transaction_hash = $1
            "#,
        )
        .bind(transaction_hash)
        .bind(processed)
        .bind(attempts)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM user_activities
            WHERE source_wallet = $1
            "#,
        )
        .bind(&self.source_wallet)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Option<i64>, _>("total").unwrap_or(0))
    }
}

/// In-memory activity store for paper runs and tests.
#[derive(Default)]
pub struct MemoryActivityStore {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in insertion order.
    pub async fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, transaction_hash: &str) -> Option<ActivityRecord> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.transaction_hash == transaction_hash)
            .cloned()
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn known_hashes(&self) -> Result<HashSet<String>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .map(|r| r.transaction_hash.clone())
            .collect())
    }

    async fn insert(&self, record: &ActivityRecord) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records
            .iter()
            .any(|r| r.transaction_hash == record.transaction_hash)
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn pending(&self, retry_limit: i32) -> Result<Vec<ActivityRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| r.is_pending(retry_limit))
            .cloned()
            .collect())
    }

    async fn mark_attempt(
        &self,
        transaction_hash: &str,
        processed: bool,
        attempts: i32,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.transaction_hash == transaction_hash)
        {
            record.bot_processed = processed;
            record.bot_attempts = attempts;
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.records.lock().await.len() as i64)
    }
}
