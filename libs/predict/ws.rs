//! Predict WebSocket client
//!
//! Request/ack protocol: subscriptions are
//! `{"method":"subscribe","requestId":<n>,"params":["orderbook/<id>", ...]}`.
//! The server drives keep-alive with `{type:"M", topic:"heartbeat"}` frames
//! which must be echoed back as `{"method":"heartbeat","data":<echo>}`.
//! Orderbook snapshots arrive on `orderbook/<marketId>` topics and land in
//! the shared cache keyed by market id (the YES book); wallet events arrive
//! on the JWT-gated `predictWalletEvents` topic.

use crate::constants::WS_URL;
use crate::types::{OrderbookPayload, SubscribeRequest, WalletEvent, WsEnvelope};
use books::{BookCache, NormalizedOrderBook, PriceLevel, Venue};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use wsfabric::{
    ConnectionState, EndpointRotation, ListenerId, ListenerSet, SocketHandler, WsClient, WsConfig,
    WsHandle,
};

struct PredictState {
    subscribed_markets: RwLock<HashSet<String>>,
    /// JWT for the wallet-events topic; None leaves the topic unsubscribed
    wallet_jwt: RwLock<Option<String>>,
    cache: Arc<BookCache>,
    book_listeners: ListenerSet<NormalizedOrderBook>,
    wallet_listeners: ListenerSet<WalletEvent>,
    request_id: AtomicU64,
}

impl PredictState {
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn subscription_frames(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscribed_markets
            .read()
            .iter()
            .map(|m| format!("orderbook/{}", m))
            .collect();
        if let Some(jwt) = self.wallet_jwt.read().as_ref() {
            topics.push(format!("predictWalletEvents/{}", jwt));
        }
        if topics.is_empty() {
            return Vec::new();
        }
        let request = SubscribeRequest::new(self.next_request_id(), topics);
        vec![serde_json::to_string(&request).unwrap_or_default()]
    }

    fn apply_book(&self, market_id: &str, payload: OrderbookPayload) {
        let bids = payload
            .bids
            .iter()
            .map(|l| PriceLevel::new(l.price_f64(), l.quantity_f64()))
            .collect();
        let asks = payload
            .asks
            .iter()
            .map(|l| PriceLevel::new(l.price_f64(), l.quantity_f64()))
            .collect();

        let updated_ms = payload
            .timestamp_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);

        let mut book = NormalizedOrderBook::from_levels(
            Venue::Predict,
            market_id.to_string(),
            market_id.to_string(),
            updated_ms,
            bids,
            asks,
        );
        if let Some(meta) = self.cache.metadata(Venue::Predict, market_id) {
            book.apply_metadata(meta);
        }

        if self.cache.insert(book.clone()) {
            self.book_listeners.notify(market_id, &book);
        }
    }
}

struct PredictSocket {
    state: Arc<PredictState>,
}

impl SocketHandler for PredictSocket {
    fn on_connect(&mut self) -> Vec<String> {
        let frames = self.state.subscription_frames();
        if !frames.is_empty() {
            debug!("[PredictWS] Replaying subscriptions");
        }
        frames
    }

    fn on_frame(&mut self, text: &str) -> Vec<String> {
        let envelope: WsEnvelope = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                warn!("[PredictWS] Unparseable frame dropped: {}", e);
                return Vec::new();
            }
        };

        // Heartbeat must be echoed or the server drops the connection
        if envelope.topic == "heartbeat" {
            let echo = serde_json::json!({
                "method": "heartbeat",
                "data": envelope.data,
            });
            return vec![echo.to_string()];
        }

        if let Some(market_id) = envelope.topic.strip_prefix("orderbook/") {
            match serde_json::from_value::<OrderbookPayload>(envelope.data) {
                Ok(payload) => self.state.apply_book(market_id, payload),
                Err(e) => warn!("[PredictWS] Bad orderbook payload: {}", e),
            }
            return Vec::new();
        }

        if envelope.topic.starts_with("predictWalletEvents") {
            match serde_json::from_value::<WalletEvent>(envelope.data) {
                Ok(event) => {
                    let key = event.order_hash.clone().unwrap_or_default();
                    self.state.wallet_listeners.notify(&key, &event);
                }
                Err(e) => warn!("[PredictWS] Bad wallet event: {}", e),
            }
            return Vec::new();
        }

        // Subscription acks and anything else
        debug!("[PredictWS] Frame on topic '{}' ignored", envelope.topic);
        Vec::new()
    }
}

/// Predict WebSocket client
pub struct PredictWs {
    url: String,
    state: Arc<PredictState>,
    handle: Option<WsHandle>,
}

impl PredictWs {
    pub fn new(cache: Arc<BookCache>) -> Self {
        Self::with_url(WS_URL, cache)
    }

    pub fn with_url(url: impl Into<String>, cache: Arc<BookCache>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(PredictState {
                subscribed_markets: RwLock::new(HashSet::new()),
                wallet_jwt: RwLock::new(None),
                cache,
                book_listeners: ListenerSet::new("PredictWS/book"),
                wallet_listeners: ListenerSet::new("PredictWS/wallet"),
                request_id: AtomicU64::new(0),
            }),
            handle: None,
        }
    }

    pub fn connect(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let config = WsConfig::new(EndpointRotation::single(self.url.clone()));
        let socket = PredictSocket {
            state: Arc::clone(&self.state),
        };
        self.handle = Some(WsClient::spawn("PredictWS", config, socket));
    }

    pub async fn disconnect(&mut self, clear_listeners: bool) {
        if let Some(mut handle) = self.handle.take() {
            handle.disconnect().await;
        }
        if clear_listeners {
            self.state.book_listeners.clear();
            self.state.wallet_listeners.clear();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(|h| h.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Enable the wallet-events topic. Takes effect on the next
    /// (re)connect; call before `connect` for immediate coverage.
    pub fn enable_wallet_events(&self, jwt: String) {
        *self.state.wallet_jwt.write() = Some(jwt);
    }

    /// Subscribe to market order books; already-subscribed ids dedup away.
    pub fn subscribe(&self, market_ids: &[String]) {
        let new_markets: Vec<String> = {
            let mut subscribed = self.state.subscribed_markets.write();
            market_ids
                .iter()
                .filter(|m| subscribed.insert((*m).clone()))
                .cloned()
                .collect()
        };

        if new_markets.is_empty() {
            return;
        }

        if let Some(handle) = &self.handle {
            let topics = new_markets
                .iter()
                .map(|m| format!("orderbook/{}", m))
                .collect();
            let request = SubscribeRequest::new(self.state.next_request_id(), topics);
            if let Err(e) = handle.send(serde_json::to_string(&request).unwrap_or_default()) {
                warn!("[PredictWS] Subscribe send failed: {}", e);
            }
        }
    }

    /// Remove markets from the subscription set and evict their books.
    /// Wire-level unsubscribe is best-effort only.
    pub fn unsubscribe(&self, market_ids: &[String]) {
        let mut subscribed = self.state.subscribed_markets.write();
        for market in market_ids {
            subscribed.remove(market);
            self.state.cache.evict(Venue::Predict, market);
        }
    }

    pub fn subscribed_markets(&self) -> Vec<String> {
        self.state.subscribed_markets.read().iter().cloned().collect()
    }

    pub fn add_book_listener(
        &self,
        filter_market_id: Option<String>,
        callback: Arc<dyn Fn(&NormalizedOrderBook) + Send + Sync>,
    ) -> ListenerId {
        self.state.book_listeners.add(filter_market_id, callback)
    }

    pub fn remove_book_listener(&self, id: ListenerId) {
        self.state.book_listeners.remove(id);
    }

    pub fn add_wallet_event_listener(
        &self,
        filter_order_hash: Option<String>,
        callback: Arc<dyn Fn(&WalletEvent) + Send + Sync>,
    ) -> ListenerId {
        self.state.wallet_listeners.add(filter_order_hash, callback)
    }

    pub fn remove_wallet_event_listener(&self, id: ListenerId) {
        self.state.wallet_listeners.remove(id);
    }

    /// Latest cached book for a market
    pub fn book(&self, market_id: &str) -> Option<NormalizedOrderBook> {
        self.state.cache.get(Venue::Predict, market_id)
    }

    pub fn set_asset_metadata(&self, market_id: &str, meta: books::AssetMetadata) {
        self.state.cache.set_metadata(Venue::Predict, market_id, meta);
    }
}
