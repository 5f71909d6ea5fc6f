//! Local bot wallet bookkeeping.

use crate::types::WalletConfig;
use crate::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;

#[async_trait]
pub trait WalletConfigStore: Send + Sync {
    /// Insert or refresh the record keyed by `wallet_address`.
    async fn upsert(&self, config: &WalletConfig) -> Result<()>;

    async fn get(&self, wallet_address: &str) -> Result<Option<WalletConfig>>;
}

pub struct PgWalletConfigRepository {
    pool: PgPool,
}

impl PgWalletConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletConfigStore for PgWalletConfigRepository {
    async fn upsert(&self, config: &WalletConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bot_config (wallet_address, proxy_wallet, user_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (wallet_address) DO UPDATE SET
                proxy_wallet = EXCLUDED.proxy_wallet,
                user_address = EXCLUDED.user_address,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&config.wallet_address)
        .bind(&config.proxy_wallet)
        .bind(&config.user_address)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, wallet_address: &str) -> Result<Option<WalletConfig>> {
        let row = sqlx::query(
            r#"
            SELECT wallet_address, proxy_wallet, user_address, created_at, updated_at
            FROM bot_config
            WHERE wallet_address = $1
            "#,
        )
        .bind(wallet_address.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| WalletConfig {
            wallet_address: r.get("wallet_address"),
            proxy_wallet: r.get("proxy_wallet"),
            user_address: r.get("user_address"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }
}

#[derive(Default)]
pub struct MemoryWalletConfigStore {
    configs: Mutex<Vec<WalletConfig>>,
}

impl MemoryWalletConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletConfigStore for MemoryWalletConfigStore {
    async fn upsert(&self, config: &WalletConfig) -> Result<()> {
        let mut configs = self.configs.lock().await;
        match configs
            .iter_mut()
            .find(|c| c.wallet_address == config.wallet_address)
        {
            Some(existing) => {
                existing.proxy_wallet = config.proxy_wallet.clone();
                existing.user_address = config.user_address.clone();
                existing.updated_at = config.updated_at;
            }
            None => configs.push(config.clone()),
        }
        Ok(())
    }

    async fn get(&self, wallet_address: &str) -> Result<Option<WalletConfig>> {
        let wallet_address = wallet_address.to_lowercase();
        Ok(self
            .configs
            .lock()
            .await
            .iter()
            .find(|c| c.wallet_address == wallet_address)
            .cloned())
    }
}
