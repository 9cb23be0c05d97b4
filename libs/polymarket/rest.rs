//! REST client for the Polymarket CLOB
//!
//! Read endpoints run behind a circuit breaker: after consecutive failures
//! the HTTP client is rebuilt (fresh DNS + pool) and, while the breaker is
//! open, the last good value is served from cache instead of re-attempting
//! the wire. Order placement and cancellation never serve cached replies.

use crate::auth::{AuthError, PolymarketAuth};
use crate::constants::CLOB_BASE_URL;
use crate::order_builder::{build_order_payload, SignedOrder};
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use wsfabric::CircuitBreaker;

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Rate limited (429): {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(#[from] AuthError),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),
}

pub type Result<T> = std::result::Result<T, RestError>;

fn build_http_client() -> Client {
    use reqwest::header;

    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
}

/// Map a non-2xx reply to the error taxonomy.
async fn status_error(response: reqwest::Response) -> RestError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    if status == 429 {
        RestError::RateLimited(body)
    } else {
        RestError::Http { status, body }
    }
}

/// REST client for the Polymarket CLOB
pub struct ClobClient {
    base_url: String,
    client: RwLock<Client>,
    auth: Arc<PolymarketAuth>,
    breaker: CircuitBreaker,
    /// Last good reply per read endpoint, served while the breaker is open.
    read_cache: Mutex<HashMap<String, serde_json::Value>>,
}

impl ClobClient {
    pub fn new(auth: Arc<PolymarketAuth>) -> Self {
        Self::with_base_url(CLOB_BASE_URL, auth)
    }

    pub fn with_base_url(base_url: impl Into<String>, auth: Arc<PolymarketAuth>) -> Self {
        Self {
            base_url: base_url.into(),
            client: RwLock::new(build_http_client()),
            auth,
            breaker: CircuitBreaker::standard(),
            read_cache: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> Client {
        self.client.read().clone()
    }

    /// Rebuild the HTTP client (forces new DNS resolution and connections).
    fn recreate_client(&self) {
        info!("[ClobRest] Recreating HTTP client after repeated failures");
        *self.client.write() = build_http_client();
    }

    pub fn auth(&self) -> &Arc<PolymarketAuth> {
        &self.auth
    }

    /// Cached GET for read endpoints: serves the last good value while the
    /// breaker is open, refreshes the cache on success.
    async fn get_cached(&self, path: &str) -> Result<serde_json::Value> {
        if self.breaker.is_open() {
            if let Some(cached) = self.read_cache.lock().get(path).cloned() {
                debug!("[ClobRest] Breaker open, serving cached {}", path);
                return Ok(cached);
            }
        }

        let url = format!("{}{}", self.base_url, path);
        let result: Result<serde_json::Value> = async {
            let response = self.client().get(&url).send().await?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            Ok(response.json().await?)
        }
        .await;

        match result {
            Ok(value) => {
                self.breaker.record_ok();
                self.read_cache.lock().insert(path.to_string(), value.clone());
                Ok(value)
            }
            Err(e) => {
                if self.breaker.record_failure() {
                    self.recreate_client();
                }
                if let Some(cached) = self.read_cache.lock().get(path).cloned() {
                    warn!("[ClobRest] {} failed ({}), serving cached value", path, e);
                    return Ok(cached);
                }
                Err(e)
            }
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| RestError::DeserializeFailed(e.to_string()))
    }

    // =========================================================================
    // Market data
    // =========================================================================

    /// Order book for one token
    pub async fn get_orderbook(&self, token_id: &str) -> Result<OrderBookPayload> {
        let value = self.get_cached(&format!("/book?token_id={}", token_id)).await?;
        Self::decode(value)
    }

    /// Batched order books
    pub async fn get_orderbooks(&self, token_ids: &[String]) -> Result<Vec<OrderBookPayload>> {
        let url = format!("{}/books", self.base_url);
        let body: Vec<serde_json::Value> = token_ids
            .iter()
            .map(|t| serde_json::json!({ "token_id": t }))
            .collect();

        let response = self.client().post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// Best price for one side of a token
    pub async fn get_price(&self, token_id: &str, side: Side) -> Result<f64> {
        let value = self
            .get_cached(&format!("/price?token_id={}&side={}", token_id, side.as_str()))
            .await?;
        let price: PriceResponse = Self::decode(value)?;
        price
            .price
            .parse()
            .map_err(|e| RestError::DeserializeFailed(format!("bad price: {}", e)))
    }

    /// Spreads for a batch of tokens
    pub async fn get_spreads(&self, token_ids: &[String]) -> Result<Vec<SpreadEntry>> {
        let url = format!("{}/spreads", self.base_url);
        let body: Vec<serde_json::Value> = token_ids
            .iter()
            .map(|t| serde_json::json!({ "token_id": t }))
            .collect();

        let response = self.client().post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// neg_risk flag for a token (selects the EIP-712 domain)
    pub async fn get_neg_risk(&self, token_id: &str) -> Result<bool> {
        let value = self.get_cached(&format!("/neg-risk?token_id={}", token_id)).await?;
        value
            .get("neg_risk")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| RestError::DeserializeFailed("missing neg_risk".to_string()))
    }

    /// Tick size for a token
    pub async fn get_tick_size(&self, token_id: &str) -> Result<f64> {
        let value = self.get_cached(&format!("/tick-size?token_id={}", token_id)).await?;
        value
            .get("minimum_tick_size")
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
            .ok_or_else(|| RestError::DeserializeFailed("missing minimum_tick_size".to_string()))
    }

    // =========================================================================
    // Authenticated endpoints
    // =========================================================================

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let timestamp = PolymarketAuth::current_timestamp();
        let body_str = body
            .as_ref()
            .map(|b| serde_json::to_string(b).unwrap_or_default())
            .unwrap_or_default();

        let headers = self
            .auth
            .request_headers(timestamp, method.as_str(), path, &body_str)?;

        let mut req = self.client().request(method, &url);
        for (key, value) in headers {
            req = req.header(key, value);
        }
        if !body_str.is_empty() {
            req = req
                .header("Content-Type", "application/json")
                .body(body_str);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }

    /// Submit a signed order
    pub async fn place_order(
        &self,
        signed_order: &SignedOrder,
        order_type: OrderType,
    ) -> Result<OrderPlacementResponse> {
        let payload = build_order_payload(signed_order, &self.auth.credentials().key, order_type);
        debug!(
            "[ClobRest] Placing {} order hash={}",
            order_type.as_str(),
            signed_order.order_hash
        );

        let response = self
            .send_signed(reqwest::Method::POST, "/order", Some(payload))
            .await?;
        let placement: OrderPlacementResponse = response.json().await?;

        if !placement.success {
            return Err(RestError::ApiError(
                placement
                    .error_msg
                    .unwrap_or_else(|| "order rejected".to_string()),
            ));
        }
        Ok(placement)
    }

    /// Fetch one order by id
    pub async fn get_order(&self, order_id: &str) -> Result<OpenOrderDto> {
        let response = self
            .send_signed(
                reqwest::Method::GET,
                &format!("/data/order/{}", order_id),
                None,
            )
            .await?;
        Ok(response.json().await?)
    }

    /// All open orders for the account
    pub async fn get_open_orders(&self) -> Result<Vec<OpenOrderDto>> {
        let response = self
            .send_signed(reqwest::Method::GET, "/data/orders", None)
            .await?;
        Ok(response.json().await?)
    }

    /// Cancel one order
    pub async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse> {
        let body = serde_json::json!({ "orderID": order_id });
        let response = self
            .send_signed(reqwest::Method::DELETE, "/order", Some(body))
            .await?;
        Ok(response.json().await?)
    }

    /// Collateral balance/allowance for the funder wallet
    pub async fn get_balance_allowance(&self) -> Result<serde_json::Value> {
        let response = self
            .send_signed(
                reqwest::Method::GET,
                "/balance-allowance?asset_type=COLLATERAL",
                None,
            )
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn test_client() -> ClobClient {
        let auth = Arc::new(
            PolymarketAuth::new(
                "0x1234567890123456789012345678901234567890123456789012345678901234",
                Address::zero(),
                ApiCredentials {
                    key: "k".to_string(),
                    secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
                    passphrase: "p".to_string(),
                },
            )
            .unwrap(),
        );
        ClobClient::with_base_url("http://127.0.0.1:0", auth)
    }

    #[test]
    fn test_client_creation() {
        let client = test_client();
        assert_eq!(client.base_url, "http://127.0.0.1:0");
    }

    #[tokio::test]
    async fn test_unreachable_read_fails_without_cache() {
        let client = test_client();
        let result = client.get_orderbook("42").await;
        assert!(result.is_err());
        assert_eq!(client.breaker.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_cached_value_served_after_failure() {
        let client = test_client();
        let path = "/book?token_id=42".to_string();
        let cached = serde_json::json!({
            "market": "m", "asset_id": "42",
            "bids": [], "asks": []
        });
        client.read_cache.lock().insert(path, cached);

        // Wire is unreachable but the cache answers.
        let book = client.get_orderbook("42").await.unwrap();
        assert_eq!(book.asset_id, "42");
    }
}
