//! Trade ingestion for the copied wallet.
//!
//! Polls the Data API activity feed for the source wallet and persists every
//! trade not seen before, so the copy trader can work through them later.

use anyhow::Result;
use chrono::{DateTime, Utc};
use polymarket_core::api::WalletDataSource;
use polymarket_core::db::ActivityStore;
use polymarket_core::schedule::Ticker;
use polymarket_core::types::ActivityRecord;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Wallet whose activity is ingested (lowercased).
    pub user_address: String,
    /// Trades older than this many hours are ignored.
    pub stale_window_hours: i64,
}

impl MonitorConfig {
    pub fn new(user_address: &str, stale_window_hours: i64) -> Self {
        Self {
            user_address: user_address.to_lowercase(),
            stale_window_hours,
        }
    }

    /// Oldest trade timestamp (unix seconds) still worth ingesting.
    pub fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.stale_window_hours * 3600
    }
}

pub struct ActivityIngestor {
    store: Arc<dyn ActivityStore>,
    data: Arc<dyn WalletDataSource>,
    config: MonitorConfig,
}

impl ActivityIngestor {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        data: Arc<dyn WalletDataSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            data,
            config,
        }
    }

    /// Log how many records are already persisted.
    pub async fn log_startup_count(&self) -> Result<i64> {
        let count = self.store.count().await?;
        info!(
            wallet = %self.config.user_address,
            count = count,
            "Loaded persisted activity records"
        );
        Ok(count)
    }

    /// Fetch once and persist new trades. Returns how many were inserted.
    ///
    /// Existing records are never touched. A failed or empty fetch is just
    /// "nothing new".
    pub async fn ingest_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let activity = self.data.activity(&self.config.user_address).await;
        if activity.is_empty() {
            return Ok(0);
        }

        let cutoff = self.config.cutoff(now);
        let mut seen = self.store.known_hashes().await?;
        let mut fresh = Vec::new();

        for entry in activity {
            if !entry.is_trade() {
                continue;
            }
            if entry.timestamp < cutoff {
                debug!(
                    tx_hash = %entry.transaction_hash,
                    timestamp = entry.timestamp,
                    "Skipping stale trade"
                );
                continue;
            }
            // Also collapses repeats inside one response.
            if !seen.insert(entry.transaction_hash.clone()) {
                continue;
            }
            fresh.push(ActivityRecord::from_activity(entry));
        }

        let mut inserted = 0;
        for record in &fresh {
            match self.store.insert(record).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        tx_hash = %record.transaction_hash,
                        error = %e,
                        "Failed to persist trade"
                    );
                }
            }
        }

        if inserted > 0 {
            info!(
                wallet = %self.config.user_address,
                count = inserted,
                "Ingested new trades"
            );
        }
        Ok(inserted)
    }

    /// Ingest on every tick until the ticker finishes.
    pub async fn run(&self, mut ticker: Ticker) {
        while ticker.tick().await {
            if let Err(e) = self.ingest_once(Utc::now()).await {
                warn!(error = %e, "Activity ingestion failed");
            }
        }
        info!("Trade monitoring loop stopped");
    }
}
