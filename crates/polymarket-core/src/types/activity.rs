//! Wallet activity, positions and bot bookkeeping records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single activity event for a wallet, normalised from the Data API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    pub transaction_hash: String,
    pub proxy_wallet: String,
    /// Activity discriminator, e.g. "TRADE", "MERGE", "REDEEM".
    pub activity_type: String,
    /// Raw side string as reported ("BUY", "SELL", or anything else).
    pub side: String,
    pub condition_id: String,
    pub asset: String,
    pub outcome: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
    pub usdc_size: Decimal,
    /// Unix seconds.
    pub timestamp: i64,
}

impl WalletActivity {
    pub fn is_trade(&self) -> bool {
        self.activity_type.eq_ignore_ascii_case("TRADE")
    }
}

/// A persisted copy of a source-wallet trade awaiting replication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub transaction_hash: String,
    pub proxy_wallet: String,
    pub condition_id: String,
    pub asset: String,
    pub side: String,
    pub outcome: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
    pub usdc_size: Decimal,
    /// Unix seconds.
    pub timestamp: i64,
    pub bot_processed: bool,
    pub bot_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// Fresh record for a newly ingested trade.
    pub fn from_activity(activity: WalletActivity) -> Self {
        Self {
            transaction_hash: activity.transaction_hash,
            proxy_wallet: activity.proxy_wallet,
            condition_id: activity.condition_id,
            asset: activity.asset,
            side: activity.side,
            outcome: activity.outcome,
            price: activity.price,
            size: activity.size,
            usdc_size: activity.usdc_size,
            timestamp: activity.timestamp,
            bot_processed: false,
            bot_attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether the record is still eligible for replication.
    pub fn is_pending(&self, retry_limit: i32) -> bool {
        !self.bot_processed && self.bot_attempts < retry_limit
    }
}

/// A wallet's open position, queried live and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub condition_id: String,
    pub asset: String,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub current_value: Decimal,
}

/// Local bot wallet bookkeeping. Holds addresses only, never key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub wallet_address: String,
    pub proxy_wallet: String,
    /// Source wallet being copied.
    pub user_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletConfig {
    pub fn new(wallet_address: &str, proxy_wallet: &str, user_address: &str) -> Self {
        let now = Utc::now();
        Self {
            wallet_address: wallet_address.to_lowercase(),
            proxy_wallet: proxy_wallet.to_lowercase(),
            user_address: user_address.to_lowercase(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(activity_type: &str) -> WalletActivity {
        WalletActivity {
            transaction_hash: "0xabc".to_string(),
            proxy_wallet: "0xsource".to_string(),
            activity_type: activity_type.to_string(),
            side: "BUY".to_string(),
            condition_id: "0xcond".to_string(),
            asset: "111".to_string(),
            outcome: Some("Up".to_string()),
            price: Decimal::new(55, 2),
            size: Decimal::new(10, 0),
            usdc_size: Decimal::new(55, 1),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_trade_filter_is_case_insensitive() {
        assert!(activity("TRADE").is_trade());
        assert!(activity("trade").is_trade());
        assert!(!activity("REDEEM").is_trade());
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = ActivityRecord::from_activity(activity("TRADE"));
        assert!(!record.bot_processed);
        assert_eq!(record.bot_attempts, 0);
        assert!(record.is_pending(3));
        assert!(!record.is_pending(0));
    }

    #[test]
    fn test_wallet_config_lowercases_addresses() {
        let config = WalletConfig::new("0xABC", "0xDEF", "0x123A");
        assert_eq!(config.wallet_address, "0xabc");
        assert_eq!(config.proxy_wallet, "0xdef");
        assert_eq!(config.user_address, "0x123a");
    }
}
