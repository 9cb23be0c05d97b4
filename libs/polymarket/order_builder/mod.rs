//! Order builder for the Polymarket CTF Exchange
//!
//! Builds and signs EIP-712 orders for the CLOB API:
//! - `types`: Order and SignedOrder structs, error types
//! - `signing`: EIP-712 hash computation and ABI encoding helpers
//!
//! GTC orders must carry `expiration = 0`; marketable (FAK) orders get a
//! short TTL so a stuck matcher cannot fill them minutes later.

mod signing;
mod types;

pub use types::{Order, OrderBuilderError, Result, SignedOrder};

use crate::auth::PolymarketAuth;
use crate::constants::*;
use crate::types::{OrderType, Side};
use ethers::types::{H256, U256};
use rand::Rng;
use signing::compute_eip712_hash;

/// Builder for creating signed orders
pub struct OrderBuilder {
    chain_id: u64,
    signature_type: u8,
    neg_risk: bool,
}

impl OrderBuilder {
    /// Proxy-funded builder (maker = proxy wallet, signer = EOA).
    pub fn new(neg_risk: bool) -> Self {
        Self {
            chain_id: POLYGON_CHAIN_ID,
            signature_type: SIGNATURE_TYPE_POLY_PROXY,
            neg_risk,
        }
    }

    pub fn with_signature_type(mut self, signature_type: u8) -> Self {
        self.signature_type = signature_type;
        self
    }

    /// Build and sign an order.
    ///
    /// `expiration` follows the time-in-force: GTC forces 0, FAK stamps
    /// `now + IOC_EXPIRATION_SECS`.
    pub fn build_signed_order(
        &self,
        auth: &PolymarketAuth,
        token_id: &str,
        price: f64,
        size: f64,
        side: Side,
        order_type: OrderType,
        fee_rate_bps: u64,
        nonce: u64,
    ) -> Result<SignedOrder> {
        if price <= 0.0 || price >= 1.0 {
            return Err(OrderBuilderError::InvalidPrice(format!(
                "Price must be between 0 and 1, got: {}",
                price
            )));
        }
        if size <= 0.0 {
            return Err(OrderBuilderError::InvalidSize(format!(
                "Size must be positive, got: {}",
                size
            )));
        }

        let token_id_u256 = U256::from_dec_str(token_id).map_err(|e| {
            OrderBuilderError::InvalidTokenId(format!("Failed to parse token ID: {}", e))
        })?;

        let expiration = match order_type {
            OrderType::GTC => 0,
            OrderType::FAK | OrderType::FOK => {
                PolymarketAuth::current_timestamp() + IOC_EXPIRATION_SECS
            }
            OrderType::GTD => PolymarketAuth::current_timestamp() + IOC_EXPIRATION_SECS,
        };

        let (maker_amount, taker_amount) = calculate_amounts(price, size, side);

        let order = Order {
            salt: generate_salt(),
            maker: auth.proxy_address(),
            signer: auth.trader_address(),
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

        let digest = compute_eip712_hash(&order, self.chain_id, self.neg_risk);
        let signature = auth
            .sign_hash_hex(H256::from(digest))
            .map_err(|e| OrderBuilderError::SigningError(e.to_string()))?;

        Ok(SignedOrder {
            order,
            signature,
            order_hash: format!("0x{}", hex::encode(digest)),
        })
    }
}

/// Maker/taker amounts in 6-decimal integer units.
///
/// BUY: makerAmount = price x size (USDC paid), takerAmount = size (tokens).
/// SELL swaps them.
fn calculate_amounts(price: f64, size: f64, side: Side) -> (U256, U256) {
    let size_scaled = (size * DECIMAL_MULTIPLIER as f64).round() as u128;
    let usdc_amount = (price * size * DECIMAL_MULTIPLIER as f64).round() as u128;

    match side {
        Side::Buy => (U256::from(usdc_amount), U256::from(size_scaled)),
        Side::Sell => (U256::from(size_scaled), U256::from(usdc_amount)),
    }
}

/// Random salt compatible with the reference client's `round(now * random())`.
fn generate_salt() -> U256 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs_f64();

    let random: f64 = rand::thread_rng().gen();
    U256::from((now * random).round() as u64)
}

/// JSON payload for placing an order:
/// `{"order": {...}, "orderType": "...", "owner": "<api key>"}`
pub fn build_order_payload(
    signed_order: &SignedOrder,
    owner: &str,
    order_type: OrderType,
) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("order".to_string(), signed_order.to_api_json());
    map.insert(
        "orderType".to_string(),
        serde_json::Value::String(order_type.as_str().to_string()),
    );
    map.insert(
        "owner".to_string(),
        serde_json::Value::String(owner.to_string()),
    );
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiCredentials;
    use ethers::types::Address;

    fn test_auth() -> PolymarketAuth {
        PolymarketAuth::new(
            "0x1234567890123456789012345678901234567890123456789012345678901234",
            Address::zero(),
            ApiCredentials {
                key: "k".to_string(),
                secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
                passphrase: "p".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_amount_calculation_buy() {
        // Buy 100 tokens at $0.50 each = $50 USDC
        let (maker_amount, taker_amount) = calculate_amounts(0.5, 100.0, Side::Buy);
        assert_eq!(maker_amount, U256::from(50_000_000u64));
        assert_eq!(taker_amount, U256::from(100_000_000u64));
    }

    #[test]
    fn test_amount_calculation_sell() {
        let (maker_amount, taker_amount) = calculate_amounts(0.5, 100.0, Side::Sell);
        assert_eq!(maker_amount, U256::from(100_000_000u64));
        assert_eq!(taker_amount, U256::from(50_000_000u64));
    }

    #[test]
    fn test_salt_uniqueness() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_gtc_order_has_zero_expiration() {
        let builder = OrderBuilder::new(false).with_signature_type(SIGNATURE_TYPE_EOA);
        let signed = builder
            .build_signed_order(&test_auth(), "42", 0.5, 10.0, Side::Buy, OrderType::GTC, 0, 0)
            .unwrap();
        assert_eq!(signed.order.expiration, U256::zero());
    }

    #[test]
    fn test_ioc_order_has_ttl() {
        let builder = OrderBuilder::new(false).with_signature_type(SIGNATURE_TYPE_EOA);
        let signed = builder
            .build_signed_order(&test_auth(), "42", 0.5, 10.0, Side::Buy, OrderType::FAK, 0, 0)
            .unwrap();
        let now = PolymarketAuth::current_timestamp();
        let expiration = signed.order.expiration.as_u64();
        assert!(expiration > now);
        assert!(expiration <= now + IOC_EXPIRATION_SECS + 1);
    }

    #[test]
    fn test_rejects_out_of_range_price() {
        let builder = OrderBuilder::new(false);
        let auth = test_auth();
        assert!(builder
            .build_signed_order(&auth, "42", 0.0, 10.0, Side::Buy, OrderType::GTC, 0, 0)
            .is_err());
        assert!(builder
            .build_signed_order(&auth, "42", 1.0, 10.0, Side::Buy, OrderType::GTC, 0, 0)
            .is_err());
    }

    #[test]
    fn test_payload_shape() {
        let builder = OrderBuilder::new(false).with_signature_type(SIGNATURE_TYPE_EOA);
        let signed = builder
            .build_signed_order(&test_auth(), "42", 0.5, 10.0, Side::Buy, OrderType::GTC, 0, 0)
            .unwrap();
        let payload = build_order_payload(&signed, "api-key", OrderType::GTC);

        assert_eq!(payload["orderType"], "GTC");
        assert_eq!(payload["owner"], "api-key");
        assert_eq!(payload["order"]["side"], "BUY");
        assert_eq!(payload["order"]["tokenId"], "42");
        assert!(payload["order"]["signature"]
            .as_str()
            .unwrap()
            .starts_with("0x"));
    }
}
