//! EIP-712 domains of the CTF exchange contracts.

use alloy_primitives::{address, keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;

/// Chain ID for Polygon mainnet.
pub const POLYGON_CHAIN_ID: u64 = 137;

/// CTF Exchange contract address on Polygon mainnet.
pub const CTF_EXCHANGE_ADDRESS: Address = address!("4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");

/// Neg Risk CTF Exchange contract address on Polygon mainnet.
pub const NEG_RISK_CTF_EXCHANGE_ADDRESS: Address =
    address!("C5d563A36AE78145C45a50134d48A1215220f80a");

/// USDC contract address on Polygon mainnet.
pub const USDC_ADDRESS: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Signing domain of an exchange contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDomain {
    pub name: &'static str,
    pub version: &'static str,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ExchangeDomain {
    /// Standard binary markets.
    pub fn ctf_exchange() -> Self {
        Self {
            name: "Polymarket CTF Exchange",
            version: "1",
            chain_id: POLYGON_CHAIN_ID,
            verifying_contract: CTF_EXCHANGE_ADDRESS,
        }
    }

    /// Negative-risk (multi-outcome) markets.
    pub fn neg_risk() -> Self {
        Self {
            verifying_contract: NEG_RISK_CTF_EXCHANGE_ADDRESS,
            ..Self::ctf_exchange()
        }
    }

    /// EIP-712 domain separator hash.
    pub fn separator(&self) -> B256 {
        keccak256(self.encode_data())
    }

    /// `encodeData` of the domain: one 32-byte word per field.
    fn encode_data(&self) -> Vec<u8> {
        (
            keccak256(DOMAIN_TYPE),
            keccak256(self.name.as_bytes()),
            keccak256(self.version.as_bytes()),
            U256::from(self.chain_id),
            B256::left_padding_from(self.verifying_contract.as_slice()),
        )
            .abi_encode_packed()
    }
}
