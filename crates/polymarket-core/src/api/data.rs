//! Data API client for wallet activity and positions.

use crate::types::{PositionSnapshot, WalletActivity};
use crate::{Error, Result};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

/// Read access to a wallet's public trading history.
///
/// Implementations never fail: transport or decoding problems are logged and
/// reported as "no data".
#[async_trait]
pub trait WalletDataSource: Send + Sync {
    async fn activity(&self, wallet: &str) -> Vec<WalletActivity>;
    async fn positions(&self, wallet: &str) -> Vec<PositionSnapshot>;
}

/// Polymarket Data API client.
pub struct DataApiClient {
    base_url: String,
    http_client: reqwest::Client,
    activity_limit: u32,
}

impl DataApiClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://data-api.polymarket.com";

    const MAX_ATTEMPTS: u32 = 3;
    const BASE_BACKOFF_MS: f64 = 2000.0;
    const BACKOFF_FACTOR: f64 = 1.5;

    #[allow(clippy::result_large_err)]
    pub fn new(base_url: Option<String>, activity_limit: u32) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            http_client,
            activity_limit,
        })
    }

    /// Fetch a JSON list, retrying timeouts and connection failures with
    /// 2s * 1.5^n backoff. Any other failure yields an empty list.
    async fn fetch_list<T: DeserializeOwned>(&self, url: &str) -> Vec<T> {
        for attempt in 0..Self::MAX_ATTEMPTS {
            match self.get_list(url).await {
                Ok(items) => return items,
                Err(Error::Http(e))
                    if (e.is_timeout() || e.is_connect()) && attempt + 1 < Self::MAX_ATTEMPTS =>
                {
                    let backoff = Self::BASE_BACKOFF_MS * Self::BACKOFF_FACTOR.powi(attempt as i32);
                    warn!(
                        attempt = attempt + 1,
                        error = %e,
                        url = url,
                        backoff_ms = backoff as u64,
                        "Data API request failed, backing off"
                    );
                    tokio::time::sleep(StdDuration::from_millis(backoff as u64)).await;
                }
                Err(e) => {
                    warn!(error = %e, url = url, "Data API request failed");
                    return Vec::new();
                }
            }
        }
        Vec::new()
    }

    async fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Api {
                message: format!("Data API error: {}", response.status()),
                status: Some(response.status().as_u16()),
            });
        }
        let text = response.text().await?;
        Ok(decode_list(&text))
    }
}

#[async_trait]
impl WalletDataSource for DataApiClient {
    async fn activity(&self, wallet: &str) -> Vec<WalletActivity> {
        let url = format!(
            "{}/activity?user={}&limit={}",
            self.base_url, wallet, self.activity_limit
        );
        self.fetch_list::<ActivityEntry>(&url)
            .await
            .into_iter()
            .filter_map(ActivityEntry::into_activity)
            .collect()
    }

    async fn positions(&self, wallet: &str) -> Vec<PositionSnapshot> {
        let url = format!("{}/positions?user={}", self.base_url, wallet);
        self.fetch_list::<PositionEntry>(&url)
            .await
            .into_iter()
            .filter_map(PositionEntry::into_snapshot)
            .collect()
    }
}

/// Decode a JSON array element by element. A non-array body or an element
/// of the wrong shape is dropped rather than failing the whole batch.
pub fn decode_list<T: DeserializeOwned>(body: &str) -> Vec<T> {
    let values = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(values)) => values,
        Ok(_) => {
            debug!("Data API returned a non-list body");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "Data API returned invalid JSON");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "Skipping malformed Data API entry");
                None
            }
        })
        .collect()
}

/// A single entry from the Data API `/activity` endpoint.
#[derive(Debug, Deserialize)]
pub struct ActivityEntry {
    #[serde(alias = "transactionHash", default)]
    transaction_hash: Option<String>,
    #[serde(alias = "proxyWallet", default)]
    proxy_wallet: Option<String>,
    #[serde(alias = "type", default)]
    activity_type: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(alias = "conditionId", default)]
    condition_id: Option<String>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    size: Option<f64>,
    #[serde(alias = "usdcSize", default)]
    usdc_size: Option<f64>,
    /// Unix seconds.
    #[serde(default)]
    timestamp: Option<i64>,
}

impl ActivityEntry {
    /// Coerce into the strict schema. Entries without a hash, timestamp or
    /// type are dropped, as are trades without a side.
    pub fn into_activity(self) -> Option<WalletActivity> {
        let Some(transaction_hash) = self.transaction_hash.filter(|s| !s.is_empty()) else {
            debug!("Skipping activity entry without transaction hash");
            return None;
        };
        let Some(timestamp) = self.timestamp else {
            debug!(tx_hash = %transaction_hash, "Skipping activity entry without timestamp");
            return None;
        };
        let activity_type = self.activity_type.filter(|s| !s.is_empty())?;
        let side = self.side.unwrap_or_default();
        if side.is_empty() && activity_type.eq_ignore_ascii_case("TRADE") {
            debug!(tx_hash = %transaction_hash, "Skipping trade entry without side");
            return None;
        }

        Some(WalletActivity {
            transaction_hash,
            proxy_wallet: self.proxy_wallet.unwrap_or_default().to_lowercase(),
            activity_type,
            side,
            condition_id: self.condition_id.unwrap_or_default(),
            asset: self.asset.unwrap_or_default(),
            outcome: self.outcome,
            price: to_decimal(self.price),
            size: to_decimal(self.size),
            usdc_size: to_decimal(self.usdc_size),
            timestamp,
        })
    }
}

/// A single entry from the Data API `/positions` endpoint.
#[derive(Debug, Deserialize)]
struct PositionEntry {
    #[serde(rename = "conditionId", default)]
    condition_id: Option<String>,
    #[serde(default)]
    asset: Option<String>,
    #[serde(default)]
    size: Option<f64>,
    #[serde(rename = "avgPrice", default)]
    avg_price: Option<f64>,
    #[serde(rename = "currentValue", default)]
    current_value: Option<f64>,
}

impl PositionEntry {
    fn into_snapshot(self) -> Option<PositionSnapshot> {
        Some(PositionSnapshot {
            condition_id: self.condition_id.filter(|s| !s.is_empty())?,
            asset: self.asset.unwrap_or_default(),
            size: to_decimal(self.size),
            avg_price: to_decimal(self.avg_price),
            current_value: to_decimal(self.current_value),
        })
    }
}

fn to_decimal(value: Option<f64>) -> Decimal {
    value.and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO)
}
