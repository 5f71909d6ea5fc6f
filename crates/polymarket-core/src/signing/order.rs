//! Order payloads for EIP-712 signing and CLOB submission.

use alloy_primitives::{keccak256, Address, B256, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::types::{OrderRequest, OrderSide};
use crate::{Error, Result};

const ORDER_TYPE: &[u8] = b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";

/// Both USDC and outcome shares use 6 decimals on-chain.
const BASE_UNITS: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Raw order struct as hashed by the CTF exchange contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderData {
    pub salt: U256,
    pub maker: Address,
    pub signer: Address,
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    pub expiration: U256,
    pub nonce: U256,
    pub fee_rate_bps: U256,
    pub side: u8,
    /// 0 = EOA.
    pub signature_type: u8,
}

impl OrderData {
    /// Build a GTC order for `request`, signed and funded by `maker`.
    #[allow(clippy::result_large_err)]
    pub fn from_request(maker: Address, request: &OrderRequest, salt: u64) -> Result<Self> {
        let token_id = request
            .token_id
            .parse::<U256>()
            .map_err(|e| Error::Signing {
                message: format!("Invalid token id {}: {}", request.token_id, e),
            })?;
        let (maker_amount, taker_amount) =
            order_amounts(request.side, request.price, request.size)?;

        Ok(Self {
            salt: U256::from(salt),
            maker,
            signer: maker,
            taker: Address::ZERO,
            token_id,
            maker_amount,
            taker_amount,
            expiration: U256::ZERO,
            nonce: U256::ZERO,
            fee_rate_bps: U256::ZERO,
            side: request.side.as_u8(),
            signature_type: 0,
        })
    }

    pub fn struct_hash(&self) -> B256 {
        keccak256(self.encode_data())
    }

    /// `encodeData` of the order. Addresses and `uint8` fields are widened to
    /// full words so the packed encoding matches the standard one.
    fn encode_data(&self) -> Vec<u8> {
        (
            keccak256(ORDER_TYPE),
            self.salt,
            B256::left_padding_from(self.maker.as_slice()),
            B256::left_padding_from(self.signer.as_slice()),
            B256::left_padding_from(self.taker.as_slice()),
            self.token_id,
            self.maker_amount,
            self.taker_amount,
            self.expiration,
            self.nonce,
            self.fee_rate_bps,
            U256::from(self.side),
            U256::from(self.signature_type),
        )
            .abi_encode_packed()
    }
}

/// Maker and taker amounts in base units.
///
/// A buy gives USDC and takes shares; a sell gives shares and takes USDC.
#[allow(clippy::result_large_err)]
pub fn order_amounts(side: OrderSide, price: Decimal, size: Decimal) -> Result<(U256, U256)> {
    if price <= Decimal::ZERO || price > Decimal::ONE {
        return Err(Error::InvalidPrice {
            value: price.to_string(),
        });
    }
    if size <= Decimal::ZERO {
        return Err(Error::Signing {
            message: format!("Order size must be positive, got {}", size),
        });
    }

    let shares = to_base_units(size)?;
    let usdc = to_base_units(price * size)?;
    Ok(match side {
        OrderSide::Buy => (usdc, shares),
        OrderSide::Sell => (shares, usdc),
    })
}

#[allow(clippy::result_large_err)]
fn to_base_units(amount: Decimal) -> Result<U256> {
    let scaled = (amount * BASE_UNITS).round_dp_with_strategy(0, RoundingStrategy::ToZero);
    scaled.to_u128().map(U256::from).ok_or_else(|| Error::Signing {
        message: format!("Amount {} out of range", amount),
    })
}

/// A signed order ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedOrder {
    /// Must serialize as a JSON number.
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    #[serde(rename = "tokenId")]
    pub token_id: String,
    #[serde(rename = "makerAmount")]
    pub maker_amount: String,
    #[serde(rename = "takerAmount")]
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    #[serde(rename = "feeRateBps")]
    pub fee_rate_bps: String,
    pub side: String,
    #[serde(rename = "signatureType")]
    pub signature_type: u8,
    pub signature: String,
}

impl SignedOrder {
    pub fn new(order: &OrderData, signature: String) -> Self {
        let side = if order.side == 0 { "BUY" } else { "SELL" };
        Self {
            salt: order.salt.to::<u64>(),
            maker: order.maker.to_checksum(None),
            signer: order.signer.to_checksum(None),
            taker: order.taker.to_checksum(None),
            token_id: order.token_id.to_string(),
            maker_amount: order.maker_amount.to_string(),
            taker_amount: order.taker_amount.to_string(),
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.fee_rate_bps.to_string(),
            side: side.to_string(),
            signature_type: order.signature_type,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_amounts() {
        // 8.33 shares at 0.606 costs 5.04798 USDC
        let (maker, taker) =
            order_amounts(OrderSide::Buy, Decimal::new(606, 3), Decimal::new(833, 2)).unwrap();
        assert_eq!(maker, U256::from(5_047_980u64));
        assert_eq!(taker, U256::from(8_330_000u64));
    }

    #[test]
    fn test_sell_amounts_swap_sides() {
        let (maker, taker) =
            order_amounts(OrderSide::Sell, Decimal::new(61, 2), Decimal::new(833, 2)).unwrap();
        assert_eq!(maker, U256::from(8_330_000u64));
        assert_eq!(taker, U256::from(5_081_300u64));
    }

    #[test]
    fn test_amounts_reject_bad_inputs() {
        assert!(matches!(
            order_amounts(OrderSide::Buy, Decimal::new(101, 2), Decimal::ONE),
            Err(Error::InvalidPrice { .. })
        ));
        assert!(order_amounts(OrderSide::Buy, Decimal::new(5, 1), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_from_request() {
        let request = OrderRequest::buy("12345", Decimal::new(5, 1), Decimal::new(10, 0));
        let order = OrderData::from_request(Address::ZERO, &request, 42).unwrap();
        assert_eq!(order.token_id, U256::from(12345u64));
        assert_eq!(order.side, 0);
        assert_eq!(order.expiration, U256::ZERO);
        assert_eq!(order.salt, U256::from(42u64));

        let bad = OrderRequest::buy("not-a-number", Decimal::new(5, 1), Decimal::ONE);
        assert!(OrderData::from_request(Address::ZERO, &bad, 1).is_err());
    }

    #[test]
    fn test_encode_data_layout() {
        let request = OrderRequest::sell("777", Decimal::new(4, 1), Decimal::new(3, 0));
        let order = OrderData::from_request(Address::repeat_byte(0xab), &request, 9).unwrap();
        let encoded = order.encode_data();

        assert_eq!(encoded.len(), 13 * 32);
        let word = |i: usize| &encoded[i * 32..(i + 1) * 32];
        assert_eq!(word(0), keccak256(ORDER_TYPE).as_slice());
        assert_eq!(word(1), U256::from(9u64).to_be_bytes::<32>().as_slice());
        assert_eq!(&word(2)[..12], &[0u8; 12]);
        assert_eq!(&word(2)[12..], Address::repeat_byte(0xab).as_slice());
        assert_eq!(word(5), U256::from(777u64).to_be_bytes::<32>().as_slice());
        assert_eq!(word(11)[31], 1);
        assert_eq!(word(12), [0u8; 32].as_slice());
    }

    #[test]
    fn test_struct_hash_depends_on_salt() {
        let request = OrderRequest::sell("777", Decimal::new(4, 1), Decimal::new(3, 0));
        let a = OrderData::from_request(Address::ZERO, &request, 1).unwrap();
        let b = OrderData::from_request(Address::ZERO, &request, 2).unwrap();
        assert_eq!(a.struct_hash(), a.clone().struct_hash());
        assert_ne!(a.struct_hash(), b.struct_hash());
    }
}
