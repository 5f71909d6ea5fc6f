//! Polygon RPC client for on-chain balances.

use crate::signing::USDC_ADDRESS;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration as StdDuration;
use tracing::error;

/// Collateral balance lookup.
///
/// Failures are logged and reported as a zero balance.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn usdc_balance(&self, address: &str) -> Decimal;
}

/// ERC-20 `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "70a08231";

/// USDC has 6 decimals.
const USDC_DECIMALS: u32 = 6;

/// Polygon RPC client for querying blockchain data.
pub struct PolygonClient {
    rpc_url: String,
    usdc_contract: String,
    http_client: reqwest::Client,
}

impl PolygonClient {
    pub const DEFAULT_RPC_URL: &'static str = "https://polygon-rpc.com";

    /// Create a client against `rpc_url`. Without a contract override the
    /// bridged USDC token is queried.
    #[allow(clippy::result_large_err)]
    pub fn new(rpc_url: String, usdc_contract: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()?;
        Ok(Self {
            rpc_url,
            usdc_contract: usdc_contract.unwrap_or_else(|| USDC_ADDRESS.to_string()),
            http_client,
        })
    }

    /// Raw token balance of `address`, scaled to whole USDC.
    pub async fn fetch_usdc_balance(&self, address: &str) -> Result<Decimal> {
        let params = serde_json::json!([
            {
                "to": self.usdc_contract,
                "data": balance_of_calldata(address)?,
            },
            "latest"
        ]);

        let response: JsonRpcResponse<String> = self.rpc_call("eth_call", params).await?;
        if let Some(err) = response.error {
            return Err(Error::Api {
                message: format!("eth_call failed ({}): {}", err.code, err.message),
                status: None,
            });
        }

        let raw = response.result.ok_or_else(|| Error::Api {
            message: "No result in response".to_string(),
            status: None,
        })?;
        parse_usdc_amount(&raw)
    }

    async fn rpc_call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<JsonRpcResponse<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api {
                message: format!("RPC request failed: {}", response.status()),
                status: Some(response.status().as_u16()),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl BalanceSource for PolygonClient {
    async fn usdc_balance(&self, address: &str) -> Decimal {
        match self.fetch_usdc_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(address = address, error = %e, "Failed to fetch USDC balance");
                Decimal::ZERO
            }
        }
    }
}

#[allow(clippy::result_large_err)]
fn balance_of_calldata(address: &str) -> Result<String> {
    let owner = Address::from_str(address.trim()).map_err(|e| Error::Config {
        message: format!("Invalid wallet address {}: {}", address, e),
    })?;
    Ok(format!(
        "0x{}{}",
        BALANCE_OF_SELECTOR,
        hex::encode(B256::left_padding_from(owner.as_slice()))
    ))
}

/// Decode a `uint256` return word into whole USDC.
#[allow(clippy::result_large_err)]
fn parse_usdc_amount(raw: &str) -> Result<Decimal> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let units = U256::from_str_radix(digits, 16).map_err(|e| Error::Api {
        message: format!("Failed to parse balance '{}': {}", raw, e),
        status: None,
    })?;
    let out_of_range = || Error::Api {
        message: format!("Balance out of range: {}", units),
        status: None,
    };
    let units = u128::try_from(units)
        .ok()
        .and_then(|units| i128::try_from(units).ok())
        .ok_or_else(out_of_range)?;
    Decimal::try_from_i128_with_scale(units, USDC_DECIMALS).map_err(|_| out_of_range())
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}
