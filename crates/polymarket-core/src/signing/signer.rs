//! Order signing with a local private key.

use alloy_primitives::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;

use super::domain::ExchangeDomain;
use super::order::{OrderData, SignedOrder};
use super::typed_data_digest;
use crate::types::OrderRequest;
use crate::{Error, Result};

/// EIP-712 order signer for one exchange domain.
#[derive(Clone)]
pub struct OrderSigner {
    signer: PrivateKeySigner,
    domain: ExchangeDomain,
}

impl OrderSigner {
    pub fn new(signer: PrivateKeySigner, domain: ExchangeDomain) -> Self {
        Self { signer, domain }
    }

    /// Parse a hex private key (with or without `0x`).
    #[allow(clippy::result_large_err)]
    pub fn from_private_key(key: &str, domain: ExchangeDomain) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(key.trim()).map_err(|e| Error::Signing {
            message: format!("Invalid private key: {}", e),
        })?;
        Ok(Self::new(signer, domain))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Build and sign an order for `request`.
    #[allow(clippy::result_large_err)]
    pub fn sign_request(&self, request: &OrderRequest, salt: u64) -> Result<SignedOrder> {
        let order = OrderData::from_request(self.address(), request, salt)?;
        self.sign_order(&order)
    }

    #[allow(clippy::result_large_err)]
    pub fn sign_order(&self, order: &OrderData) -> Result<SignedOrder> {
        let digest = typed_data_digest(self.domain.separator(), order.struct_hash());
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| Error::Signing {
                message: format!("Failed to sign order: {}", e),
            })?;

        Ok(SignedOrder::new(
            order,
            format!("0x{}", hex::encode(signature.as_bytes())),
        ))
    }
}

impl std::fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSigner")
            .field("address", &self.address())
            .field("domain", &self.domain.verifying_contract)
            .finish()
    }
}
