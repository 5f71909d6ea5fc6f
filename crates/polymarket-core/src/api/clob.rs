//! Polymarket CLOB API client.
//!
//! Covers the two CLOB surfaces the bots need: the public market channel
//! (order book tops over WebSocket) and authenticated order submission.

use crate::signing::SignedOrder;
use crate::types::{OrderBook, OrderType, PriceLevel};
use crate::{Error, Result};
use base64::Engine;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Polymarket CLOB REST client.
pub struct ClobClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl ClobClient {
    /// Default CLOB API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://clob.polymarket.com";
    /// Default market channel WebSocket URL.
    pub const DEFAULT_WS_URL: &'static str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

    #[allow(clippy::result_large_err)]
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .connect_timeout(StdDuration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            http_client,
        })
    }

    /// Post a signed order with L2 authentication headers.
    pub async fn post_order(
        &self,
        signed_order: SignedOrder,
        order_type: OrderType,
        credentials: &ApiCredentials,
        address: &str,
    ) -> Result<PostOrderResponse> {
        let url = format!("{}/order", self.base_url);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let path = "/order";

        let request = PostOrderRequest {
            order: signed_order,
            order_type,
            owner: credentials.api_key.clone(),
        };
        let body = serde_json::to_string(&request)?;
        debug!(payload = %body, "POST /order request body");

        let signature = sign_l2_request(credentials, "POST", path, &timestamp, Some(&body))?;

        let response = self
            .http_client
            .post(&url)
            .header("POLY_ADDRESS", address)
            .header("POLY_SIGNATURE", signature)
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_API_KEY", &credentials.api_key)
            .header("POLY_PASSPHRASE", &credentials.api_passphrase)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                message: format!("Failed to post order: {} - {}", status, text),
                status: Some(status),
            });
        }

        let result: PostOrderResponse = response.json().await?;
        if !result.success || result.order_id.is_empty() {
            return Err(Error::Order {
                message: if result.error_msg.is_empty() {
                    format!("Order rejected with status {}", result.status)
                } else {
                    result.error_msg.clone()
                },
                transaction_hash: result.transaction_hashes.first().cloned(),
            });
        }

        info!(order_id = %result.order_id, status = %result.status, "Order posted");
        Ok(result)
    }
}

/// API credentials for authenticated CLOB requests.
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    /// Base64 secret for HMAC signing.
    pub api_secret: String,
    pub api_passphrase: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("api_passphrase", &"[REDACTED]")
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String, api_passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            api_passphrase,
        }
    }

    /// Load from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| Error::Config {
                message: format!("{} environment variable not set", name),
            })
        };
        Ok(Self::new(
            read("POLY_API_KEY")?,
            read("POLY_API_SECRET")?,
            read("POLY_API_PASSPHRASE")?,
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
struct PostOrderRequest {
    order: SignedOrder,
    #[serde(rename = "orderType")]
    order_type: OrderType,
    owner: String,
}

/// Response from posting an order.
#[derive(Debug, Clone, Deserialize)]
pub struct PostOrderResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: String,
    #[serde(rename = "orderID", default)]
    pub order_id: String,
    /// e.g. "live", "matched", "delayed".
    #[serde(default)]
    pub status: String,
    #[serde(rename = "transactionsHashes", default)]
    pub transaction_hashes: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Sign a request with HMAC-SHA256 for L2 authentication.
#[allow(clippy::result_large_err)]
pub fn sign_l2_request(
    credentials: &ApiCredentials,
    method: &str,
    path: &str,
    timestamp: &str,
    body: Option<&str>,
) -> Result<String> {
    let message = match body {
        Some(b) => format!("{}{}{}{}", timestamp, method, path, b),
        None => format!("{}{}{}", timestamp, method, path),
    };

    // Secrets are issued URL-safe, older ones may be standard base64.
    let secret_bytes = base64::engine::general_purpose::URL_SAFE
        .decode(&credentials.api_secret)
        .or_else(|_| {
            base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&credentials.api_secret)
        })
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(&credentials.api_secret))
        .map_err(|e| Error::Signing {
            message: format!("Invalid API secret encoding: {}", e),
        })?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes).map_err(|e| Error::Signing {
        message: format!("Failed to create HMAC: {}", e),
    })?;
    mac.update(message.as_bytes());

    Ok(base64::engine::general_purpose::URL_SAFE.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// Market channel
// ============================================================================

/// Top-of-book change derived from the market channel.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Best bid/ask after a snapshot or incremental change.
    BookTop {
        asset_id: String,
        best_bid: Option<Decimal>,
        best_ask: Option<Decimal>,
    },
    /// Price of the latest trade.
    LastTrade { asset_id: String, price: Decimal },
}

/// Stateful decoder for the CLOB market channel.
///
/// Keeps per-asset books so incremental `price_change` events can be reduced
/// to a best bid/ask.
#[derive(Debug, Default)]
pub struct MarketChannel {
    books: HashMap<String, OrderBook>,
}

impl MarketChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscription frame sent right after the socket opens.
    pub fn subscribe_message(asset_ids: &[String]) -> String {
        serde_json::json!({
            "type": "market",
            "assets_ids": asset_ids,
        })
        .to_string()
    }

    /// Decode one text frame. Keep-alive replies decode to nothing; anything
    /// that is not valid JSON of a known shape is an error.
    #[allow(clippy::result_large_err)]
    pub fn decode(&mut self, text: &str) -> Result<Vec<MarketEvent>> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("PONG") || trimmed.eq_ignore_ascii_case("PING") {
            return Ok(Vec::new());
        }
        if trimmed.eq_ignore_ascii_case("INVALID OPERATION") {
            warn!("Received INVALID OPERATION from CLOB websocket");
            return Ok(Vec::new());
        }

        let messages = match serde_json::from_str::<WsFrame>(trimmed)? {
            WsFrame::Many(messages) => messages,
            WsFrame::One(message) => vec![message],
        };

        let mut events = Vec::new();
        for message in messages {
            match message {
                WsMessage::Book(book) => events.push(self.apply_snapshot(book)),
                WsMessage::PriceChange(change) => events.extend(self.apply_changes(change)),
                WsMessage::LastTradePrice(trade) => {
                    if let Ok(price) = trade.price.parse::<Decimal>() {
                        events.push(MarketEvent::LastTrade {
                            asset_id: trade.asset_id,
                            price,
                        });
                    }
                }
                WsMessage::Other => {}
            }
        }
        Ok(events)
    }

    #[cfg(test)]
    fn book(&self, asset_id: &str) -> Option<&OrderBook> {
        self.books.get(asset_id)
    }

    fn apply_snapshot(&mut self, book: WsBook) -> MarketEvent {
        let mut bids: Vec<PriceLevel> = book.bids.iter().filter_map(WsLevel::parse).collect();
        let mut asks: Vec<PriceLevel> = book.asks.iter().filter_map(WsLevel::parse).collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let snapshot = OrderBook {
            asset_id: book.asset_id.clone(),
            bids,
            asks,
        };
        let event = top_of(&snapshot);
        self.books.insert(book.asset_id, snapshot);
        event
    }

    fn apply_changes(&mut self, event: WsPriceChangeEvent) -> Vec<MarketEvent> {
        let mut updates = Vec::new();
        for change in event.price_changes {
            let (Ok(price), Ok(size)) = (
                change.price.parse::<Decimal>(),
                change.size.parse::<Decimal>(),
            ) else {
                continue;
            };

            let book = self
                .books
                .entry(change.asset_id.clone())
                .or_insert_with(|| OrderBook {
                    asset_id: change.asset_id.clone(),
                    ..Default::default()
                });

            if change.side.eq_ignore_ascii_case("BUY") {
                upsert_level(&mut book.bids, price, size, true);
            } else if change.side.eq_ignore_ascii_case("SELL") {
                upsert_level(&mut book.asks, price, size, false);
            } else {
                continue;
            }
            updates.push(top_of(book));
        }
        updates
    }
}

fn top_of(book: &OrderBook) -> MarketEvent {
    MarketEvent::BookTop {
        asset_id: book.asset_id.clone(),
        best_bid: book.best_bid(),
        best_ask: book.best_ask(),
    }
}

fn upsert_level(levels: &mut Vec<PriceLevel>, price: Decimal, size: Decimal, descending: bool) {
    if let Some(idx) = levels.iter().position(|l| l.price == price) {
        if size <= Decimal::ZERO {
            levels.remove(idx);
        } else {
            levels[idx].size = size;
        }
    } else if size > Decimal::ZERO {
        levels.push(PriceLevel { price, size });
    }

    if descending {
        levels.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.cmp(&b.price));
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WsFrame {
    Many(Vec<WsMessage>),
    One(WsMessage),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
enum WsMessage {
    Book(WsBook),
    PriceChange(WsPriceChangeEvent),
    LastTradePrice(WsLastTrade),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WsBook {
    asset_id: String,
    #[serde(default, alias = "buys")]
    bids: Vec<WsLevel>,
    #[serde(default, alias = "sells")]
    asks: Vec<WsLevel>,
}

#[derive(Debug, Deserialize)]
struct WsLevel {
    price: String,
    size: String,
}

impl WsLevel {
    fn parse(&self) -> Option<PriceLevel> {
        Some(PriceLevel {
            price: self.price.parse().ok()?,
            size: self.size.parse().ok()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WsPriceChangeEvent {
    #[serde(default)]
    price_changes: Vec<WsPriceChange>,
}

#[derive(Debug, Deserialize)]
struct WsPriceChange {
    asset_id: String,
    price: String,
    size: String,
    side: String,
}

#[derive(Debug, Deserialize)]
struct WsLastTrade {
    asset_id: String,
    price: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_book_snapshot_sorted_to_top() {
        let mut channel = MarketChannel::new();
        let frame = r#"[{"event_type":"book","asset_id":"111","market":"0xm",
            "bids":[{"price":"0.55","size":"10"},{"price":"0.58","size":"5"}],
            "asks":[{"price":"0.65","size":"3"},{"price":"0.62","size":"7"}],
            "timestamp":"1700000000000"}]"#;

        let events = channel.decode(frame).unwrap();
        assert_eq!(
            events,
            vec![MarketEvent::BookTop {
                asset_id: "111".to_string(),
                best_bid: Some(dec("0.58")),
                best_ask: Some(dec("0.62")),
            }]
        );
    }

    #[test]
    fn test_price_change_updates_book() {
        let mut channel = MarketChannel::new();
        channel
            .decode(r#"{"event_type":"book","asset_id":"111","bids":[{"price":"0.50","size":"10"}],"asks":[{"price":"0.60","size":"10"}]}"#)
            .unwrap();

        let events = channel
            .decode(r#"{"event_type":"price_change","market":"0xm","price_changes":[
                {"asset_id":"111","price":"0.52","size":"4","side":"BUY"},
                {"asset_id":"111","price":"0.60","size":"0","side":"SELL"}]}"#)
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            MarketEvent::BookTop {
                asset_id: "111".to_string(),
                best_bid: Some(dec("0.52")),
                best_ask: None,
            }
        );
        assert!(channel.book("111").unwrap().asks.is_empty());
    }

    #[test]
    fn test_last_trade_price() {
        let mut channel = MarketChannel::new();
        let events = channel
            .decode(r#"{"event_type":"last_trade_price","asset_id":"222","price":"0.41","size":"12","side":"BUY"}"#)
            .unwrap();
        assert_eq!(
            events,
            vec![MarketEvent::LastTrade {
                asset_id: "222".to_string(),
                price: dec("0.41"),
            }]
        );
    }

    #[test]
    fn test_keepalive_and_unknown_events_ignored() {
        let mut channel = MarketChannel::new();
        assert!(channel.decode("PONG").unwrap().is_empty());
        assert!(channel
            .decode(r#"{"event_type":"tick_size_change","asset_id":"1"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_frame_is_error() {
        let mut channel = MarketChannel::new();
        assert!(channel.decode("{not json").is_err());
        assert!(channel.decode(r#"{"event_type":"book"}"#).is_err());
    }

    #[test]
    fn test_subscribe_message() {
        let msg = MarketChannel::subscribe_message(&["1".to_string(), "2".to_string()]);
        let value: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(value["type"], "market");
        assert_eq!(value["assets_ids"][1], "2");
    }

    #[test]
    fn test_sign_l2_request() {
        let credentials = ApiCredentials::new(
            "test-key".to_string(),
            base64::engine::general_purpose::STANDARD.encode("test-secret"),
            "test-passphrase".to_string(),
        );

        let with_body = sign_l2_request(
            &credentials,
            "POST",
            "/order",
            "1700000000",
            Some(r#"{"order":"data"}"#),
        )
        .unwrap();
        let without_body =
            sign_l2_request(&credentials, "POST", "/order", "1700000000", None).unwrap();

        assert!(base64::engine::general_purpose::URL_SAFE
            .decode(&with_body)
            .is_ok());
        assert_ne!(with_body, without_body);
    }

    #[test]
    fn test_post_order_response_defaults() {
        let ok: PostOrderResponse =
            serde_json::from_str(r#"{"orderID":"0x1","status":"live"}"#).unwrap();
        assert!(ok.success);
        assert!(ok.transaction_hashes.is_empty());

        let rejected: PostOrderResponse = serde_json::from_str(
            r#"{"success":false,"errorMsg":"not enough balance","orderID":"","transactionsHashes":["0xdead"]}"#,
        )
        .unwrap();
        assert!(!rejected.success);
        assert_eq!(rejected.error_msg, "not enough balance");
    }

    #[test]
    fn test_debug_does_not_expose_credentials() {
        let credentials = ApiCredentials::new(
            "secret-key".to_string(),
            "c2VjcmV0".to_string(),
            "secret-pass".to_string(),
        );
        let debug_str = format!("{:?}", credentials);
        assert!(!debug_str.contains("secret-key"));
        assert!(!debug_str.contains("secret-pass"));
    }
}
