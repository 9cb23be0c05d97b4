//! REST client for the Predict API
//!
//! Requests rotate through a pool of API keys; a key that answers 429 is
//! cooled down and the request retries on the next key. Authenticated
//! endpoints carry the JWT and refresh it once on a 401 before surfacing
//! the failure. Read endpoints share the circuit-breaker/cached-value
//! policy of the market-data fabric.

use crate::auth::{AuthError, JwtAuth};
use crate::constants::REST_BASE_URL;
use crate::order::SignedOrder;
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use wsfabric::CircuitBreaker;

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Cooldown applied to a key that answered 429
const KEY_COOLDOWN_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Rate limited on all keys")]
    KeyPoolExhausted,

    #[error("Authentication failed: {0}")]
    AuthFailed(#[from] AuthError),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),
}

pub type Result<T> = std::result::Result<T, RestError>;

/// Rotating API-key pool with per-key rate-limit cooldown
pub struct ApiKeyPool {
    keys: Vec<String>,
    cooldowns: Mutex<Vec<Option<Instant>>>,
    cursor: AtomicUsize,
    cooldown: Duration,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        assert!(!keys.is_empty(), "API key pool requires at least one key");
        let len = keys.len();
        Self {
            keys,
            cooldowns: Mutex::new(vec![None; len]),
            cursor: AtomicUsize::new(0),
            cooldown: Duration::from_secs(KEY_COOLDOWN_SECS),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Next key that is not cooling down
    pub fn next_key(&self) -> Option<(usize, &str)> {
        let cooldowns = self.cooldowns.lock();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.keys.len() {
            let index = (start + offset) % self.keys.len();
            let cooling = cooldowns[index].map_or(false, |until| Instant::now() < until);
            if !cooling {
                return Some((index, &self.keys[index]));
            }
        }
        None
    }

    /// Tag a key as rate limited
    pub fn cool_down(&self, index: usize) {
        if index < self.keys.len() {
            self.cooldowns.lock()[index] = Some(Instant::now() + self.cooldown);
            warn!(
                "[PredictRest] API key #{} cooling down for {:?}",
                index, self.cooldown
            );
        }
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
}

/// REST client for the Predict API
pub struct PredictRestClient {
    base_url: String,
    client: RwLock<Client>,
    auth: Arc<JwtAuth>,
    keys: ApiKeyPool,
    breaker: CircuitBreaker,
    read_cache: Mutex<HashMap<String, serde_json::Value>>,
}

impl PredictRestClient {
    pub fn new(auth: Arc<JwtAuth>, keys: ApiKeyPool) -> Self {
        Self::with_base_url(REST_BASE_URL, auth, keys)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        auth: Arc<JwtAuth>,
        keys: ApiKeyPool,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            client: RwLock::new(build_http_client()),
            auth,
            keys,
            breaker: CircuitBreaker::standard(),
            read_cache: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> Client {
        self.client.read().clone()
    }

    fn recreate_client(&self) {
        info!("[PredictRest] Recreating HTTP client after repeated failures");
        *self.client.write() = build_http_client();
    }

    pub fn auth(&self) -> &Arc<JwtAuth> {
        &self.auth
    }

    fn now_ms() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }

    /// Send a request, rotating keys on 429 and refreshing the JWT once
    /// on 401 when `bearer` is set.
    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut jwt_retried = false;

        for _ in 0..self.keys.len().max(1) {
            let Some((key_index, key)) = self.keys.next_key() else {
                return Err(RestError::KeyPoolExhausted);
            };

            let mut req = self
                .client()
                .request(method.clone(), &url)
                .header("x-api-key", key);
            if bearer {
                let token = self.auth.token(Self::now_ms()).await?;
                req = req.bearer_auth(token);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let response = req.send().await?;
            let status = response.status();

            if status.as_u16() == 429 {
                self.keys.cool_down(key_index);
                continue;
            }
            if status.as_u16() == 401 && bearer && !jwt_retried {
                debug!("[PredictRest] 401, refreshing JWT once");
                self.auth.invalidate();
                jwt_retried = true;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(RestError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(response);
        }

        Err(RestError::KeyPoolExhausted)
    }

    /// Cached GET behind the circuit breaker (public read endpoints).
    async fn get_cached(&self, path: &str) -> Result<serde_json::Value> {
        if self.breaker.is_open() {
            if let Some(cached) = self.read_cache.lock().get(path).cloned() {
                debug!("[PredictRest] Breaker open, serving cached {}", path);
                return Ok(cached);
            }
        }

        let result: Result<serde_json::Value> = async {
            let response = self.send(reqwest::Method::GET, path, None, false).await?;
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
                    warn!("[PredictRest] {} failed ({}), serving cached value", path, e);
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

    pub async fn get_orderbook(&self, market_id: &str) -> Result<OrderbookPayload> {
        let value = self
            .get_cached(&format!("/v1/markets/{}/orderbook", market_id))
            .await?;
        Self::decode(value)
    }

    /// Batched order books
    pub async fn get_orderbooks(&self, market_ids: &[String]) -> Result<Vec<OrderbookPayload>> {
        let value = self
            .get_cached(&format!("/v1/orderbooks?marketIds={}", market_ids.join(",")))
            .await?;
        Self::decode(value)
    }

    /// Last traded / mark price for a market
    pub async fn get_price(&self, market_id: &str) -> Result<f64> {
        let value = self
            .get_cached(&format!("/v1/markets/{}/price", market_id))
            .await?;
        value
            .get("price")
            .and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
            .ok_or_else(|| RestError::DeserializeFailed("missing price".to_string()))
    }

    pub async fn get_markets(&self, limit: usize) -> Result<Vec<PredictMarket>> {
        let value = self.get_cached(&format!("/v1/markets?limit={}", limit)).await?;
        Self::decode(value)
    }

    pub async fn get_market(&self, market_id: &str) -> Result<PredictMarket> {
        let value = self.get_cached(&format!("/v1/markets/{}", market_id)).await?;
        Self::decode(value)
    }

    /// Events with their nested markets
    pub async fn get_events(&self, limit: usize) -> Result<Vec<PredictEvent>> {
        let value = self.get_cached(&format!("/v1/events?limit={}", limit)).await?;
        Self::decode(value)
    }

    // =========================================================================
    // Orders (JWT-authenticated)
    // =========================================================================

    pub async fn submit_order(&self, signed_order: &SignedOrder) -> Result<PlaceOrderResponse> {
        let body = signed_order.to_api_json();
        debug!("[PredictRest] Submitting order hash={}", signed_order.order_hash);

        let response = self
            .send(reqwest::Method::POST, "/v1/orders", Some(&body), true)
            .await?;
        let placement: PlaceOrderResponse = response.json().await?;

        if !placement.success {
            return Err(RestError::ApiError(
                placement.error.unwrap_or_else(|| "order rejected".to_string()),
            ));
        }
        Ok(placement)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<OrderStatusResponse> {
        let response = self
            .send(
                reqwest::Method::GET,
                &format!("/v1/orders/{}", order_id),
                None,
                true,
            )
            .await?;
        Ok(response.json().await?)
    }

    pub async fn get_open_orders(&self) -> Result<Vec<OrderStatusResponse>> {
        let response = self
            .send(reqwest::Method::GET, "/v1/orders?status=open", None, true)
            .await?;
        Ok(response.json().await?)
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.send(
            reqwest::Method::DELETE,
            &format!("/v1/orders/{}", order_id),
            None,
            true,
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Account (JWT-authenticated)
    // =========================================================================

    /// Positions for the smart wallet via the GraphQL endpoint
    pub async fn get_positions(&self) -> Result<Vec<PredictPosition>> {
        let query = serde_json::json!({
            "query": "query Positions($address: String!) { positions(address: $address) { marketId tokenId outcomeName eventTitle quantity avgEntryPrice markValue } }",
            "variables": { "address": format!("{:?}", self.auth.smart_wallet()) },
        });

        let response = self
            .send(reqwest::Method::POST, "/graphql", Some(&query), true)
            .await?;
        let value: serde_json::Value = response.json().await?;

        let positions = value
            .get("data")
            .and_then(|d| d.get("positions"))
            .cloned()
            .ok_or_else(|| RestError::DeserializeFailed("missing data.positions".to_string()))?;
        Self::decode(positions)
    }

    pub async fn get_balance(&self) -> Result<BalanceResponse> {
        let response = self
            .send(reqwest::Method::GET, "/v1/account/balance", None, true)
            .await?;
        Ok(response.json().await?)
    }
}
