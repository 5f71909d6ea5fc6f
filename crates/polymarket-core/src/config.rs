//! Configuration management for the Polymarket bots.
//!
//! Infrastructure endpoints and wallet addresses come straight from the
//! environment via [`Config::from_env`]. Strategy knobs are layered with the
//! `config` crate: built-in defaults, then an optional `bot.toml`, then
//! environment variables using their historical names
//! (`PRICE_DIFFERENCE_THRESHOLD`, `RETRY_LIMIT`, ...).

use crate::{Error, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub polygon: PolygonConfig,
    pub polymarket: PolymarketConfig,
    pub wallet: WalletEnv,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolygonConfig {
    pub rpc_url: Option<String>,
    pub usdc_contract: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolymarketConfig {
    pub clob_url: Option<String>,
    pub ws_url: Option<String>,
    pub gamma_url: Option<String>,
    pub data_api_url: Option<String>,
}

/// Wallet material read from the environment.
///
/// The private key only ever lives in memory; it is never persisted.
#[derive(Clone, Default)]
pub struct WalletEnv {
    pub private_key: Option<String>,
    pub proxy_wallet: Option<String>,
}

impl std::fmt::Debug for WalletEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletEnv")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("proxy_wallet", &self.proxy_wallet)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
                url,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            }),
            polygon: PolygonConfig {
                rpc_url: env::var("RPC_URL")
                    .or_else(|_| env::var("POLYGON_RPC_URL"))
                    .ok(),
                usdc_contract: env::var("USDC_CONTRACT_ADDRESS").ok(),
            },
            polymarket: PolymarketConfig {
                clob_url: env::var("CLOB_API_URL").ok(),
                ws_url: env::var("POLYMARKET_WS_URL").ok(),
                gamma_url: env::var("GAMMA_API_URL").ok(),
                data_api_url: env::var("DATA_API_URL").ok(),
            },
            wallet: WalletEnv {
                private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.is_empty()),
                proxy_wallet: env::var("PROXY_WALLET").ok().filter(|w| !w.is_empty()),
            },
        })
    }

    /// Database settings, required by the copy trader.
    #[allow(clippy::result_large_err)]
    pub fn database(&self) -> Result<&DatabaseConfig> {
        self.database.as_ref().ok_or_else(|| Error::Config {
            message: "DATABASE_URL environment variable not set".to_string(),
        })
    }

    /// Private key for live order signing.
    #[allow(clippy::result_large_err)]
    pub fn private_key(&self) -> Result<&str> {
        self.wallet.private_key.as_deref().ok_or_else(|| Error::Config {
            message: "PRIVATE_KEY environment variable not set".to_string(),
        })
    }

    /// Load configuration for testing (with defaults).
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            database: Some(DatabaseConfig {
                url: "postgres://localhost/polymarket_test".to_string(),
                max_connections: 2,
            }),
            polygon: PolygonConfig {
                rpc_url: None,
                usdc_contract: None,
            },
            polymarket: PolymarketConfig {
                clob_url: None,
                ws_url: None,
                gamma_url: None,
                data_api_url: None,
            },
            wallet: WalletEnv::default(),
        }
    }
}

/// Settings for the divergence bracket trader.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbSettings {
    /// Minimum `feed - market` gap that triggers a trade.
    pub price_difference_threshold: Decimal,
    /// Take-profit distance above the entry price.
    pub take_profit_amount: Decimal,
    /// Stop-loss distance below the entry price.
    pub stop_loss_amount: Decimal,
    /// Seconds between acted-upon signals.
    pub trade_cooldown: u64,
    /// USDC notional per bracket.
    pub default_trade_amount: Decimal,
    /// External probability feed.
    pub software_ws_url: String,
    pub check_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub status_interval_secs: u64,
    pub balance_check_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub read_idle_timeout_secs: u64,
    pub live_trading: bool,
}

impl ArbSettings {
    /// Load from defaults, `bot.toml` and the environment.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let settings: Self = Self::defaults()?
            .add_source(File::with_name("bot").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Builder seeded with the built-in defaults.
    #[allow(clippy::result_large_err)]
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder()
            .set_default("price_difference_threshold", "0.015")?
            .set_default("take_profit_amount", "0.01")?
            .set_default("stop_loss_amount", "0.005")?
            .set_default("trade_cooldown", 30)?
            .set_default("default_trade_amount", "5.0")?
            .set_default("software_ws_url", "")?
            .set_default("check_interval_ms", 1000)?
            .set_default("settle_delay_ms", 2000)?
            .set_default("status_interval_secs", 30)?
            .set_default("balance_check_interval_secs", 60)?
            .set_default("max_reconnect_attempts", 10)?
            .set_default("reconnect_base_delay_ms", 5000)?
            .set_default("reconnect_max_delay_ms", 60_000)?
            .set_default("connect_timeout_secs", 10)?
            .set_default("read_idle_timeout_secs", 120)?
            .set_default("live_trading", false)?)
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.software_ws_url.is_empty() {
            return Err(Error::Config {
                message: "SOFTWARE_WS_URL must be set".to_string(),
            });
        }
        if self.price_difference_threshold <= Decimal::ZERO {
            return Err(Error::Config {
                message: "PRICE_DIFFERENCE_THRESHOLD must be positive".to_string(),
            });
        }
        if self.default_trade_amount <= Decimal::ZERO {
            return Err(Error::Config {
                message: "DEFAULT_TRADE_AMOUNT must be positive".to_string(),
            });
        }
        if self.take_profit_amount < Decimal::ZERO || self.stop_loss_amount < Decimal::ZERO {
            return Err(Error::Config {
                message: "TAKE_PROFIT_AMOUNT and STOP_LOSS_AMOUNT must not be negative"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.trade_cooldown)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Settings for the copy trader.
#[derive(Debug, Clone, Deserialize)]
pub struct CopySettings {
    /// Source wallet whose trades are replicated.
    pub user_address: String,
    /// Local proxy wallet that places the copies.
    pub proxy_wallet: String,
    /// Seconds between activity polls.
    pub fetch_interval: u64,
    /// Trades older than this many hours are ignored.
    pub too_old_timestamp: i64,
    /// Attempts allowed per record before it leaves the retry pool.
    pub retry_limit: i32,
    pub activity_limit: u32,
    pub live_trading: bool,
}

impl CopySettings {
    /// Load from defaults, `bot.toml` and the environment.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let settings: Self = Self::defaults()?
            .add_source(File::with_name("bot").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Builder seeded with the built-in defaults.
    #[allow(clippy::result_large_err)]
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder()
            .set_default("user_address", "")?
            .set_default("proxy_wallet", "")?
            .set_default("fetch_interval", 1)?
            .set_default("too_old_timestamp", 24)?
            .set_default("retry_limit", 3)?
            .set_default("activity_limit", 100)?
            .set_default("live_trading", false)?)
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.user_address.is_empty() {
            return Err(Error::Config {
                message: "USER_ADDRESS must be set".to_string(),
            });
        }
        if self.proxy_wallet.is_empty() {
            return Err(Error::Config {
                message: "PROXY_WALLET must be set".to_string(),
            });
        }
        if self.retry_limit < 1 {
            return Err(Error::Config {
                message: "RETRY_LIMIT must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arb_defaults() {
        let settings: ArbSettings = ArbSettings::defaults()
            .unwrap()
            .set_override("software_ws_url", "ws://localhost:5001")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.price_difference_threshold, Decimal::new(15, 3));
        assert_eq!(settings.take_profit_amount, Decimal::new(1, 2));
        assert_eq!(settings.stop_loss_amount, Decimal::new(5, 3));
        assert_eq!(settings.cooldown(), Duration::from_secs(30));
        assert_eq!(settings.default_trade_amount, Decimal::new(5, 0));
        assert_eq!(settings.max_reconnect_attempts, 10);
        assert!(!settings.live_trading);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_arb_requires_feed_url() {
        let settings: ArbSettings = ArbSettings::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(matches!(settings.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_arb_override() {
        let settings: ArbSettings = ArbSettings::defaults()
            .unwrap()
            .set_override("software_ws_url", "ws://localhost:5001")
            .unwrap()
            .set_override("price_difference_threshold", "0.02")
            .unwrap()
            .set_override("trade_cooldown", 45)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.price_difference_threshold, Decimal::new(2, 2));
        assert_eq!(settings.cooldown(), Duration::from_secs(45));
    }

    #[test]
    fn test_copy_settings_validation() {
        let settings: CopySettings = CopySettings::defaults()
            .unwrap()
            .set_override("user_address", "0xsource")
            .unwrap()
            .set_override("proxy_wallet", "0xlocal")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.retry_limit, 3);
        assert_eq!(settings.too_old_timestamp, 24);
        assert_eq!(settings.fetch_interval(), Duration::from_secs(1));
        assert!(settings.validate().is_ok());

        let missing = CopySettings {
            user_address: String::new(),
            ..settings
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_wallet_env_debug_redacts_key() {
        let wallet = WalletEnv {
            private_key: Some("deadbeef".to_string()),
            proxy_wallet: Some("0xproxy".to_string()),
        };
        let debug = format!("{:?}", wallet);
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("0xproxy"));
    }

    #[test]
    fn test_database_required_for_copy_trader() {
        let mut config = Config::test_config();
        assert!(config.database().is_ok());
        config.database = None;
        assert!(config.database().is_err());
        assert!(config.private_key().is_err());
    }
}
