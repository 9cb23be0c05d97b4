//! JWT authentication for the Predict REST API
//!
//! Flow: fetch the attestation message from `/v1/auth/message`, sign it
//! with the EOA signer on behalf of the smart wallet, POST the signature
//! to `/v1/auth` and cache the returned JWT. The token is refreshed five
//! minutes before expiry; concurrent refreshes are collapsed to one
//! handshake.

use crate::constants::BSC_CHAIN_ID;
use crate::types::{AuthMessageResponse, AuthTokenResponse};
use ethers::prelude::*;
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Refresh the JWT this long before its expiry
const REFRESH_MARGIN_MS: u64 = 5 * 60 * 1000;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Failed to sign message: {0}")]
    SigningError(String),

    #[error("Auth request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Auth rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at_ms: u64,
}

/// JWT credential handle for the Predict venue.
///
/// Constructed once; the signer wallet and smart-wallet address never
/// mutate after init.
pub struct JwtAuth {
    base_url: String,
    client: Client,
    signer: LocalWallet,
    smart_wallet: Address,
    cached: RwLock<Option<CachedToken>>,
    /// Single-flight guard for the handshake
    refresh_lock: tokio::sync::Mutex<()>,
}

impl JwtAuth {
    pub fn new(base_url: impl Into<String>, private_key: &str, smart_wallet: Address) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");
        let signer = key
            .parse::<LocalWallet>()
            .map_err(|_| AuthError::InvalidPrivateKey)?
            .with_chain_id(BSC_CHAIN_ID);

        Ok(Self {
            base_url: base_url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            signer,
            smart_wallet,
            cached: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// EOA signer address
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Smart wallet that owns orders and balances
    pub fn smart_wallet(&self) -> Address {
        self.smart_wallet
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }

    /// Valid JWT, refreshing through the handshake when the cached token
    /// is missing or inside the refresh margin.
    pub async fn token(&self, now_ms: u64) -> Result<String> {
        if let Some(token) = self.cached_token(now_ms) {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited on the lock
        if let Some(token) = self.cached_token(now_ms) {
            return Ok(token);
        }

        let fresh = self.handshake().await?;
        info!(
            "[PredictAuth] JWT refreshed, expires at {}",
            fresh.expires_at_ms
        );
        let token = fresh.token.clone();
        *self.cached.write() = Some(fresh);
        Ok(token)
    }

    fn cached_token(&self, now_ms: u64) -> Option<String> {
        let cached = self.cached.read();
        cached.as_ref().and_then(|c| {
            if now_ms + REFRESH_MARGIN_MS < c.expires_at_ms {
                Some(c.token.clone())
            } else {
                None
            }
        })
    }

    async fn handshake(&self) -> Result<CachedToken> {
        let message_url = format!("{}/v1/auth/message", self.base_url);
        debug!("[PredictAuth] Fetching auth message");

        let response = self.client.get(&message_url).send().await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let message: AuthMessageResponse = response.json().await?;

        let signature = self
            .signer
            .sign_message(message.message.as_bytes())
            .await
            .map_err(|e| AuthError::SigningError(e.to_string()))?;

        let auth_url = format!("{}/v1/auth", self.base_url);
        let body = serde_json::json!({
            "message": message.message,
            "signature": format!("0x{}", hex::encode(signature.to_vec())),
            "address": format!("{:?}", self.smart_wallet),
        });

        let response = self.client.post(&auth_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let token: AuthTokenResponse = response.json().await?;

        Ok(CachedToken {
            token: token.token,
            expires_at_ms: token.expires_at,
        })
    }

    async fn rejected(response: reqwest::Response) -> AuthError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        AuthError::Rejected { status, body }
    }

    /// Drop the cached token so the next call re-authenticates (used after
    /// a 401 from the REST API).
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Seed the cache directly (tests and token import).
    pub fn set_token(&self, token: String, expires_at_ms: u64) {
        *self.cached.write() = Some(CachedToken {
            token,
            expires_at_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x1234567890123456789012345678901234567890123456789012345678901234";

    fn test_auth() -> JwtAuth {
        JwtAuth::new("http://127.0.0.1:0", TEST_KEY, Address::zero()).unwrap()
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(JwtAuth::new("http://x", "nope", Address::zero()).is_err());
    }

    #[tokio::test]
    async fn test_cached_token_served_within_validity() {
        let auth = test_auth();
        auth.set_token("jwt-1".to_string(), 10_000_000);

        let token = auth.token(1_000).await.unwrap();
        assert_eq!(token, "jwt-1");
    }

    #[tokio::test]
    async fn test_token_refreshes_inside_margin() {
        let auth = test_auth();
        // Expires in 60s; margin is 5 minutes, so a refresh is required and
        // fails against the unreachable endpoint.
        auth.set_token("jwt-1".to_string(), 1_000 + 60_000);
        assert!(auth.token(1_000).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let auth = test_auth();
        auth.set_token("jwt-1".to_string(), u64::MAX);
        auth.invalidate();
        assert!(auth.token(1_000).await.is_err());
    }
}
