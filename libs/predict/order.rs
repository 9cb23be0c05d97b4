//! EIP-712 order signing for the Predict exchange contracts
//!
//! Same Order struct as the CTF exchanges elsewhere; the domain's
//! verifying contract is selected by the market's (negRisk, yieldBearing)
//! flavor. Amounts are 18-decimal integer units. The typed-data digest is
//! the order hash that keys on-chain `OrderFilled` events and status
//! lookups.

use crate::auth::JwtAuth;
use crate::constants::*;
use crate::types::Side;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid token ID: {0}")]
    InvalidTokenId(String),

    #[error("Failed to sign order: {0}")]
    SigningError(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;

/// On-chain order struct (matches the exchange contracts field-for-field)
#[derive(Debug, Clone)]
pub struct PredictOrder {
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
    pub signature_type: u8,
}

/// Signed order plus its typed-data digest
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub order: PredictOrder,
    pub signature: String,
    /// EIP-712 digest; keys the on-chain OrderFilled watcher
    pub order_hash: String,
}

impl SignedOrder {
    /// JSON body for `POST /v1/orders`
    pub fn to_api_json(&self) -> serde_json::Value {
        serde_json::json!({
            "salt": self.order.salt.to_string(),
            "maker": format!("{:?}", self.order.maker),
            "signer": format!("{:?}", self.order.signer),
            "taker": format!("{:?}", self.order.taker),
            "tokenId": self.order.token_id.to_string(),
            "makerAmount": self.order.maker_amount.to_string(),
            "takerAmount": self.order.taker_amount.to_string(),
            "expiration": self.order.expiration.to_string(),
            "nonce": self.order.nonce.to_string(),
            "feeRateBps": self.order.fee_rate_bps.to_string(),
            "side": if self.order.side == SIDE_BUY { "BUY" } else { "SELL" },
            "signatureType": self.order.signature_type,
            "signature": self.signature,
        })
    }
}

fn encode_uint256(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_bytes());
    buf
}

fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

/// Domain separator for the exchange flavor
pub fn compute_domain_separator(chain_id: u64, neg_risk: bool, yield_bearing: bool) -> [u8; 32] {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );

    let mut encoded = Vec::new();
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(EIP712_DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&encode_uint256(U256::from(chain_id)));
    encoded.extend_from_slice(&encode_address(exchange_address(neg_risk, yield_bearing)));

    keccak256(&encoded)
}

/// Struct hash over the encoded order fields
pub fn compute_struct_hash(order: &PredictOrder) -> [u8; 32] {
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

/// Full EIP-712 digest
pub fn compute_order_hash(
    order: &PredictOrder,
    chain_id: u64,
    neg_risk: bool,
    yield_bearing: bool,
) -> [u8; 32] {
    let domain_separator = compute_domain_separator(chain_id, neg_risk, yield_bearing);
    let struct_hash = compute_struct_hash(order);

    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(&domain_separator);
    message.extend_from_slice(&struct_hash);

    keccak256(&message)
}

/// Builder for signed Predict orders
pub struct OrderBuilder {
    neg_risk: bool,
    yield_bearing: bool,
    signature_type: u8,
}

impl OrderBuilder {
    pub fn new(neg_risk: bool, yield_bearing: bool) -> Self {
        Self {
            neg_risk,
            yield_bearing,
            signature_type: SIGNATURE_TYPE_SMART_WALLET,
        }
    }

    pub fn with_signature_type(mut self, signature_type: u8) -> Self {
        self.signature_type = signature_type;
        self
    }

    /// Build and sign an order. `expiration = 0` keeps it resting.
    pub fn build_signed_order(
        &self,
        auth: &JwtAuth,
        token_id: &str,
        price: f64,
        quantity: f64,
        side: Side,
        fee_rate_bps: u64,
        expiration: u64,
        nonce: u64,
    ) -> Result<SignedOrder> {
        if price <= 0.0 || price >= 1.0 {
            return Err(OrderError::InvalidPrice(format!(
                "Price must be between 0 and 1, got: {}",
                price
            )));
        }
        if quantity <= 0.0 {
            return Err(OrderError::InvalidQuantity(format!(
                "Quantity must be positive, got: {}",
                quantity
            )));
        }

        let token_id_u256 = U256::from_dec_str(token_id)
            .map_err(|e| OrderError::InvalidTokenId(format!("Failed to parse token ID: {}", e)))?;

        let (maker_amount, taker_amount) = calculate_amounts(price, quantity, side);

        let order = PredictOrder {
            salt: generate_salt(),
            maker: auth.smart_wallet(),
            signer: auth.signer_address(),
            taker: zero_address(),
            token_id: token_id_u256,
            maker_amount,
            taker_amount,
            expiration: U256::from(expiration),
            nonce: U256::from(nonce),
            fee_rate_bps: U256::from(fee_rate_bps),
            side: match side {
                Side::Buy => SIDE_BUY,
                Side::Sell => SIDE_SELL,
            },
            signature_type: self.signature_type,
        };

        let digest = compute_order_hash(&order, BSC_CHAIN_ID, self.neg_risk, self.yield_bearing);
        let signature = auth
            .signer()
            .sign_hash(H256::from(digest))
            .map_err(|e| OrderError::SigningError(e.to_string()))?;

        Ok(SignedOrder {
            order,
            signature: format!("0x{}", hex::encode(signature.to_vec())),
            order_hash: format!("0x{}", hex::encode(digest)),
        })
    }
}

/// Maker/taker amounts in 18-decimal units.
///
/// Quantities are 0.01-share aligned, so scaling through 6 decimals first
/// keeps the integer math exact before widening to 18.
fn calculate_amounts(price: f64, quantity: f64, side: Side) -> (U256, U256) {
    let scale_up: U256 = U256::exp10(12);
    let quantity_micro = (quantity * 1e6).round() as u128;
    let payment_micro = (price * quantity * 1e6).round() as u128;

    let quantity_scaled = U256::from(quantity_micro) * scale_up;
    let payment_scaled = U256::from(payment_micro) * scale_up;

    match side {
        Side::Buy => (payment_scaled, quantity_scaled),
        Side::Sell => (quantity_scaled, payment_scaled),
    }
}

fn generate_salt() -> U256 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs_f64();
    let random: f64 = rand::thread_rng().gen();
    U256::from((now * random).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x1234567890123456789012345678901234567890123456789012345678901234";

    fn test_auth() -> JwtAuth {
        JwtAuth::new("http://127.0.0.1:0", TEST_KEY, Address::zero()).unwrap()
    }

    fn sample_order() -> PredictOrder {
        PredictOrder {
            salt: U256::from(1u64),
            maker: Address::zero(),
            signer: Address::zero(),
            taker: zero_address(),
            token_id: U256::from(7u64),
            maker_amount: U256::from(1u64),
            taker_amount: U256::from(2u64),
            expiration: U256::zero(),
            nonce: U256::zero(),
            fee_rate_bps: U256::zero(),
            side: SIDE_BUY,
            signature_type: SIGNATURE_TYPE_EOA,
        }
    }

    #[test]
    fn test_amounts_18_decimals_buy() {
        // Buy 100 shares at 0.50: pay 50 * 10^18, receive 100 * 10^18
        let (maker, taker) = calculate_amounts(0.5, 100.0, Side::Buy);
        assert_eq!(maker, U256::from(50u64) * U256::exp10(18));
        assert_eq!(taker, U256::from(100u64) * U256::exp10(18));
    }

    #[test]
    fn test_amounts_18_decimals_sell() {
        let (maker, taker) = calculate_amounts(0.5, 100.0, Side::Sell);
        assert_eq!(maker, U256::from(100u64) * U256::exp10(18));
        assert_eq!(taker, U256::from(50u64) * U256::exp10(18));
    }

    #[test]
    fn test_amounts_fractional_quantity_exact() {
        // 12.34 shares at 0.47 -> exact in 6-decimal micro units
        let (maker, taker) = calculate_amounts(0.47, 12.34, Side::Buy);
        assert_eq!(taker, U256::from(12_340_000u64) * U256::exp10(12));
        assert_eq!(maker, U256::from(5_799_800u64) * U256::exp10(12));
    }

    #[test]
    fn test_domain_separator_distinct_per_flavor() {
        let flavors = [
            compute_domain_separator(BSC_CHAIN_ID, false, false),
            compute_domain_separator(BSC_CHAIN_ID, true, false),
            compute_domain_separator(BSC_CHAIN_ID, false, true),
            compute_domain_separator(BSC_CHAIN_ID, true, true),
        ];
        for i in 0..flavors.len() {
            for j in (i + 1)..flavors.len() {
                assert_ne!(flavors[i], flavors[j]);
            }
        }
    }

    #[test]
    fn test_order_hash_deterministic_and_field_sensitive() {
        let order = sample_order();
        let a = compute_order_hash(&order, BSC_CHAIN_ID, false, false);
        let b = compute_order_hash(&order, BSC_CHAIN_ID, false, false);
        assert_eq!(a, b);

        let mut changed = order;
        changed.token_id = U256::from(8u64);
        assert_ne!(a, compute_order_hash(&changed, BSC_CHAIN_ID, false, false));
    }

    #[test]
    fn test_signed_order_carries_hash() {
        let builder = OrderBuilder::new(false, false).with_signature_type(SIGNATURE_TYPE_EOA);
        let signed = builder
            .build_signed_order(&test_auth(), "7", 0.45, 10.0, Side::Buy, 200, 0, 0)
            .unwrap();
        assert!(signed.order_hash.starts_with("0x"));
        assert_eq!(signed.order_hash.len(), 66);
        assert!(signed.signature.starts_with("0x"));
        assert_eq!(signed.order.fee_rate_bps, U256::from(200u64));
    }

    #[test]
    fn test_price_bounds_rejected() {
        let builder = OrderBuilder::new(false, false);
        let auth = test_auth();
        assert!(builder
            .build_signed_order(&auth, "7", 1.2, 10.0, Side::Buy, 0, 0, 0)
            .is_err());
        assert!(builder
            .build_signed_order(&auth, "7", 0.5, 0.0, Side::Buy, 0, 0, 0)
            .is_err());
    }
}
