//! Order placement capability.
//!
//! Engines submit orders through [`OrderPlacer`] and never see signing or
//! HTTP details. [`LiveOrderPlacer`] signs and posts to the CLOB;
//! [`PaperOrderPlacer`] fills everything locally.

use crate::api::clob::{ApiCredentials, ClobClient};
use crate::signing::{ExchangeDomain, OrderSigner};
use crate::types::{OrderRequest, PlacedOrder};
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Place a single limit order.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder>;
}

/// Salts must fit in a JavaScript safe integer for the CLOB.
const SALT_MASK: u64 = (1 << 53) - 1;

fn new_salt() -> u64 {
    (Uuid::new_v4().as_u128() as u64) & SALT_MASK
}

/// Signs orders with the local key and posts them to the CLOB.
pub struct LiveOrderPlacer {
    client: ClobClient,
    signer: OrderSigner,
    credentials: ApiCredentials,
    address: String,
}

impl LiveOrderPlacer {
    pub fn new(client: ClobClient, signer: OrderSigner, credentials: ApiCredentials) -> Self {
        let address = signer.address().to_string();
        Self {
            client,
            signer,
            credentials,
            address,
        }
    }

    /// Build from a private key and the CLOB credentials in the environment.
    #[allow(clippy::result_large_err)]
    pub fn from_key(private_key: &str, clob_url: Option<String>, neg_risk: bool) -> Result<Self> {
        let domain = if neg_risk {
            ExchangeDomain::neg_risk()
        } else {
            ExchangeDomain::ctf_exchange()
        };
        let signer = OrderSigner::from_private_key(private_key, domain)?;
        let credentials = ApiCredentials::from_env()?;
        Ok(Self::new(ClobClient::new(clob_url)?, signer, credentials))
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl OrderPlacer for LiveOrderPlacer {
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        let signed = self.signer.sign_request(request, new_salt())?;
        let response = self
            .client
            .post_order(signed, request.order_type, &self.credentials, &self.address)
            .await
            .map_err(|e| {
                warn!(
                    token_id = %request.token_id,
                    side = %request.side,
                    price = %request.price,
                    size = %request.size,
                    error = %e,
                    "Order placement failed"
                );
                e
            })?;

        Ok(PlacedOrder {
            order_id: response.order_id,
            status: response.status,
            transaction_hash: response.transaction_hashes.into_iter().next(),
        })
    }
}

/// Simulated placement: every order is accepted and recorded.
#[derive(Default)]
pub struct PaperOrderPlacer {
    placed: Mutex<Vec<OrderRequest>>,
}

impl PaperOrderPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders accepted so far, in submission order.
    pub async fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().await.clone()
    }
}

#[async_trait]
impl OrderPlacer for PaperOrderPlacer {
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        if request.size <= rust_decimal::Decimal::ZERO {
            return Err(Error::order(format!("Invalid order size {}", request.size)));
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        info!(
            order_id = %order_id,
            token_id = %request.token_id,
            side = %request.side,
            price = %request.price,
            size = %request.size,
            "[PAPER] Order filled"
        );
        self.placed.lock().await.push(request.clone());

        Ok(PlacedOrder {
            order_id,
            status: "matched".to_string(),
            transaction_hash: None,
        })
    }
}
