//! Polymarket authentication
//!
//! Two layers:
//! - HMAC request signing with the (key, secret, passphrase) triplet on
//!   every REST call
//! - EIP-712 order signing through the trader wallet (EOA signer, funds
//!   held by the CREATE2 proxy)

use base64::{engine::general_purpose::URL_SAFE, Engine};
use ethers::prelude::*;
use ethers::types::{Signature, H256};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::constants::POLYGON_CHAIN_ID;
use crate::types::ApiCredentials;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to sign message: {0}")]
    SigningError(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("HMAC error: {0}")]
    HmacError(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Credentials handle for the Polymarket venue.
///
/// Constructed once at startup and shared; the wallet, proxy address and
/// HMAC triplet never mutate after init.
pub struct PolymarketAuth {
    wallet: LocalWallet,
    trader_address: Address,
    proxy_address: Address,
    credentials: ApiCredentials,
}

impl PolymarketAuth {
    pub fn new(
        private_key: &str,
        proxy_address: Address,
        credentials: ApiCredentials,
    ) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|_| AuthError::InvalidPrivateKey)?
            .with_chain_id(POLYGON_CHAIN_ID);
        let trader_address = wallet.address();

        Ok(Self {
            wallet,
            trader_address,
            proxy_address,
            credentials,
        })
    }

    /// EOA signer address.
    pub fn trader_address(&self) -> Address {
        self.trader_address
    }

    /// CREATE2 proxy that holds funds and positions.
    pub fn proxy_address(&self) -> Address {
        self.proxy_address
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    /// HMAC signature for a REST request.
    ///
    /// Message is `timestamp + method + path + body`. When the path carries
    /// a query string the signature covers the path without it.
    pub fn sign_request(
        &self,
        timestamp: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<String> {
        let secret_bytes = URL_SAFE
            .decode(&self.credentials.secret)
            .map_err(|e| AuthError::HmacError(format!("Failed to decode secret: {}", e)))?;

        let signed_path = path.split('?').next().unwrap_or(path);
        let message = format!("{}{}{}{}", timestamp, method, signed_path, body);

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| AuthError::HmacError(e.to_string()))?;
        mac.update(message.as_bytes());

        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    /// Authentication headers for a REST request.
    pub fn request_headers(
        &self,
        timestamp: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<HashMap<String, String>> {
        let signature = self.sign_request(timestamp, method, path, body)?;

        let mut headers = HashMap::new();
        headers.insert(
            "POLY_ADDRESS".to_string(),
            ethers::utils::to_checksum(&self.trader_address, None),
        );
        headers.insert("POLY_SIGNATURE".to_string(), signature);
        headers.insert("POLY_TIMESTAMP".to_string(), timestamp.to_string());
        headers.insert("POLY_API_KEY".to_string(), self.credentials.key.clone());
        headers.insert(
            "POLY_PASSPHRASE".to_string(),
            self.credentials.passphrase.clone(),
        );

        Ok(headers)
    }

    /// Current Unix timestamp in seconds
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_secs()
    }

    /// Sign a 32-byte EIP-712 digest directly (no message prefix).
    pub fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.wallet
            .sign_hash(hash)
            .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Sign a digest and return the 65-byte signature as 0x hex.
    pub fn sign_hash_hex(&self, hash: H256) -> Result<String> {
        let signature = self.sign_hash(hash)?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// URL-safe base64 of the byte sequence 0x00..0x1f.
    const TEST_SECRET: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn test_auth() -> PolymarketAuth {
        PolymarketAuth::new(
            "0x1234567890123456789012345678901234567890123456789012345678901234",
            Address::zero(),
            ApiCredentials {
                key: "test_key".to_string(),
                secret: TEST_SECRET.to_string(),
                passphrase: "test_pass".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_private_key() {
        let auth = PolymarketAuth::new(
            "invalid",
            Address::zero(),
            ApiCredentials {
                key: String::new(),
                secret: String::new(),
                passphrase: String::new(),
            },
        );
        assert!(auth.is_err());
    }

    #[test]
    fn test_hmac_reference_vector() {
        // Reference vector: timestamp=1700000000, GET /data/orders, empty body,
        // secret = base64 of bytes 0x00..0x1f.
        let auth = test_auth();
        let sig = auth
            .sign_request(1_700_000_000, "GET", "/data/orders", "")
            .unwrap();
        assert_eq!(sig, "NTt0e8XQzUuVTici5whIU-0NfgRXijqf0FarNw-ik2Q=");
    }

    #[test]
    fn test_hmac_reference_vector_with_body() {
        let auth = test_auth();
        let sig = auth
            .sign_request(1_700_000_000, "POST", "/order", "{\"orderID\":\"abc\"}")
            .unwrap();
        assert_eq!(sig, "5sSBSzaU-9txGqCToeucL_NejWF3ri--aIXUBHnoSlQ=");
    }

    #[test]
    fn test_query_string_excluded_from_signature() {
        let auth = test_auth();
        let with_query = auth
            .sign_request(1_700_000_000, "GET", "/data/orders?market=abc&next_cursor=x", "")
            .unwrap();
        let without_query = auth
            .sign_request(1_700_000_000, "GET", "/data/orders", "")
            .unwrap();
        assert_eq!(with_query, without_query);
    }

    #[test]
    fn test_signature_deterministic() {
        let auth = test_auth();
        let a = auth.sign_request(1_700_000_000, "GET", "/markets", "").unwrap();
        let b = auth.sign_request(1_700_000_000, "GET", "/markets", "").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_request_headers_complete() {
        let auth = test_auth();
        let headers = auth.request_headers(1_700_000_000, "GET", "/markets", "").unwrap();
        for key in [
            "POLY_ADDRESS",
            "POLY_SIGNATURE",
            "POLY_TIMESTAMP",
            "POLY_API_KEY",
            "POLY_PASSPHRASE",
        ] {
            assert!(headers.contains_key(key), "missing header {}", key);
        }
    }
}
