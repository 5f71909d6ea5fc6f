//! EIP-712 order signing for the Polymarket CLOB.
//!
//! ```text
//! OrderRequest ──► OrderData (amounts in base units)
//!                      │ struct hash + exchange domain
//!                      ▼
//!                 OrderSigner ──► SignedOrder ──► POST /order
//! ```

pub mod domain;
pub mod order;
pub mod signer;

pub use domain::{
    ExchangeDomain, CTF_EXCHANGE_ADDRESS, NEG_RISK_CTF_EXCHANGE_ADDRESS, POLYGON_CHAIN_ID,
    USDC_ADDRESS,
};
pub use order::{OrderData, SignedOrder};
pub use signer::OrderSigner;

use alloy_primitives::{keccak256, B256};

/// `keccak256("\x19\x01" ++ domainSeparator ++ structHash)`
pub(crate) fn typed_data_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let prefix: [u8; 2] = [0x19, 0x01];
    keccak256([&prefix[..], domain_separator.as_slice(), struct_hash.as_slice()].concat())
}
