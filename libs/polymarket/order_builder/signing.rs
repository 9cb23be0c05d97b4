//! EIP-712 hashing for CTF Exchange orders

use super::types::Order;
use crate::constants::*;
use ethers::types::{Address, U256};
use ethers::utils::keccak256;

/// Encode a U256 as 32 bytes (big-endian, left-padded)
pub(crate) fn encode_uint256(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

/// Encode an address as 32 bytes (left-padded with zeros)
pub(crate) fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_bytes());
    buf
}

/// Encode a u8 as 32 bytes (left-padded with zeros)
pub(crate) fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

/// Full EIP-712 message hash:
/// `keccak256("\x19\x01" || domainSeparator || structHash)`
pub fn compute_eip712_hash(order: &Order, chain_id: u64, neg_risk: bool) -> [u8; 32] {
    let domain_separator = compute_domain_separator(chain_id, neg_risk);
    let struct_hash = compute_struct_hash(order);

    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(&domain_separator);
    message.extend_from_slice(&struct_hash);

    keccak256(&message)
}

/// EIP-712 domain separator; the verifying contract depends on the
/// neg_risk flavor of the market.
pub fn compute_domain_separator(chain_id: u64, neg_risk: bool) -> [u8; 32] {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    let mut encoded = Vec::new();
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&encode_uint256(U256::from(chain_id)));
    encoded.extend_from_slice(&encode_address(exchange_address(neg_risk)));

    keccak256(&encoded)
}

/// Struct hash over the fully-encoded order fields.
pub fn compute_struct_hash(order: &Order) -> [u8; 32] {
    let type_hash = keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    );

    let mut encoded = Vec::new();
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&encode_uint256(order.salt));
    encoded.extend_from_slice(&encode_address(order.maker));
    encoded.extend_from_slice(&encode_address(order.signer));
    encoded.extend_from_slice(&encode_address(order.taker));
    encoded.extend_from_slice(&encode_uint256(order.token_id));
    encoded.extend_from_slice(&encode_uint256(order.maker_amount));
    encoded.extend_from_slice(&encode_uint256(order.taker_amount));
    encoded.extend_from_slice(&encode_uint256(order.expiration));
    encoded.extend_from_slice(&encode_uint256(order.nonce));
    encoded.extend_from_slice(&encode_uint256(order.fee_rate_bps));
    encoded.extend_from_slice(&encode_uint8(order.side));
    encoded.extend_from_slice(&encode_uint8(order.signature_type));

    keccak256(&encoded)
}
