//! Market channel WebSocket client
//!
//! First reply after subscribing is a batch array with the full book for
//! every requested asset; later frames are per-asset `book`,
//! `price_change` and `last_trade_price` events. Book updates land in the
//! shared cache and fan out to book listeners; price-change / last-trade
//! events go to the separate trade-listener channel.

use crate::constants::MARKET_WS_URL;
use crate::types::{
    LastTradePriceMessage, MarketSubscription, OrderBookPayload, PriceChangeMessage,
};
use books::{BookCache, NormalizedOrderBook, PriceLevel, Venue};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wsfabric::{
    ConnectionState, EndpointRotation, ListenerId, ListenerSet, SocketHandler, WsClient, WsConfig,
    WsHandle,
};

/// Heartbeat interval for the plain-text PING
const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Price-change / last-trade tick delivered to trade listeners
#[derive(Debug, Clone)]
pub struct TradeTick {
    pub asset_id: String,
    pub price: f64,
    pub side: String,
    pub size: Option<f64>,
}

struct MarketState {
    subscribed: RwLock<HashSet<String>>,
    cache: Arc<BookCache>,
    book_listeners: ListenerSet<NormalizedOrderBook>,
    trade_listeners: ListenerSet<TradeTick>,
}

impl MarketState {
    fn apply_book(&self, payload: OrderBookPayload) {
        let bids = payload
            .bids
            .iter()
            .map(|l| PriceLevel::new(l.price_f64(), l.size_f64()))
            .collect();
        let asks = payload
            .asks
            .iter()
            .map(|l| PriceLevel::new(l.price_f64(), l.size_f64()))
            .collect();

        let updated_ms = match payload.timestamp_ms() {
            0 => now_ms(),
            ts => ts,
        };

        let mut book = NormalizedOrderBook::from_levels(
            Venue::Polymarket,
            payload.market.clone(),
            payload.asset_id.clone(),
            updated_ms,
            bids,
            asks,
        );
        book.neg_risk = payload.neg_risk.unwrap_or(false);
        if let Some(meta) = self.cache.metadata(Venue::Polymarket, &payload.asset_id) {
            book.apply_metadata(meta);
        }

        if self.cache.insert(book.clone()) {
            self.book_listeners.notify(&book.asset_id, &book);
        }
    }
}

struct MarketSocket {
    state: Arc<MarketState>,
}

impl SocketHandler for MarketSocket {
    fn on_connect(&mut self) -> Vec<String> {
        let assets: Vec<String> = self.state.subscribed.read().iter().cloned().collect();
        if assets.is_empty() {
            return Vec::new();
        }
        debug!("[MarketWS] Replaying subscription for {} assets", assets.len());
        vec![serde_json::to_string(&MarketSubscription::new(assets)).unwrap_or_default()]
    }

    fn on_frame(&mut self, text: &str) -> Vec<String> {
        if text == "PONG" {
            return Vec::new();
        }
        // Duplicate subscribes answer with this plaintext frame; tolerated.
        if text == "INVALID OPERATION" {
            debug!("[MarketWS] INVALID OPERATION frame (duplicate subscribe)");
            return Vec::new();
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!("[MarketWS] Unparseable frame dropped: {}", e);
                return Vec::new();
            }
        };

        match value {
            serde_json::Value::Array(items) => {
                // Initial batch: full book per subscribed asset
                for item in items {
                    if let Ok(book) = serde_json::from_value::<OrderBookPayload>(item) {
                        self.state.apply_book(book);
                    }
                }
            }
            serde_json::Value::Object(_) => self.handle_event(value),
            _ => debug!("[MarketWS] Ignoring frame: {}", text),
        }

        Vec::new()
    }
}

impl MarketSocket {
    fn handle_event(&self, value: serde_json::Value) {
        let event_type = value
            .get("event_type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        match event_type.as_str() {
            "book" => {
                if let Ok(book) = serde_json::from_value::<OrderBookPayload>(value) {
                    self.state.apply_book(book);
                }
            }
            "price_change" => {
                if let Ok(msg) = serde_json::from_value::<PriceChangeMessage>(value) {
                    for change in &msg.changes {
                        let tick = TradeTick {
                            asset_id: msg.asset_id.clone(),
                            price: change.price.parse().unwrap_or(0.0),
                            side: change.side.clone(),
                            size: change.size.parse().ok(),
                        };
                        self.state.trade_listeners.notify(&msg.asset_id, &tick);
                    }
                }
            }
            "last_trade_price" => {
                if let Ok(msg) = serde_json::from_value::<LastTradePriceMessage>(value) {
                    let tick = TradeTick {
                        asset_id: msg.asset_id.clone(),
                        price: msg.price.parse().unwrap_or(0.0),
                        side: msg.side.clone(),
                        size: msg.size.as_deref().and_then(|s| s.parse().ok()),
                    };
                    self.state.trade_listeners.notify(&msg.asset_id, &tick);
                }
            }
            other => debug!("[MarketWS] Unhandled event_type '{}'", other),
        }
    }
}

/// Market channel client
pub struct MarketWs {
    url: String,
    state: Arc<MarketState>,
    handle: Option<WsHandle>,
}

impl MarketWs {
    pub fn new(cache: Arc<BookCache>) -> Self {
        Self::with_url(MARKET_WS_URL, cache)
    }

    pub fn with_url(url: impl Into<String>, cache: Arc<BookCache>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(MarketState {
                subscribed: RwLock::new(HashSet::new()),
                cache,
                book_listeners: ListenerSet::new("MarketWS/book"),
                trade_listeners: ListenerSet::new("MarketWS/trade"),
            }),
            handle: None,
        }
    }

    /// Open the connection. Subscriptions added earlier are replayed.
    pub fn connect(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let config = WsConfig::new(EndpointRotation::single(self.url.clone())).with_heartbeat(
            Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            "PING".to_string(),
        );
        let socket = MarketSocket {
            state: Arc::clone(&self.state),
        };
        self.handle = Some(WsClient::spawn("MarketWS", config, socket));
    }

    /// Close the connection; optionally drop registered listeners.
    pub async fn disconnect(&mut self, clear_listeners: bool) {
        if let Some(mut handle) = self.handle.take() {
            handle.disconnect().await;
        }
        if clear_listeners {
            self.state.book_listeners.clear();
            self.state.trade_listeners.clear();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(|h| h.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Subscribe to assets. Already-subscribed ids are deduplicated and
    /// only the new ones go to the wire.
    pub fn subscribe(&self, asset_ids: &[String]) {
        let new_assets: Vec<String> = {
            let mut subscribed = self.state.subscribed.write();
            asset_ids
                .iter()
                .filter(|a| subscribed.insert((*a).clone()))
                .cloned()
                .collect()
        };

        if new_assets.is_empty() {
            return;
        }

        if let Some(handle) = &self.handle {
            let frame =
                serde_json::to_string(&MarketSubscription::new(new_assets)).unwrap_or_default();
            if let Err(e) = handle.send(frame) {
                warn!("[MarketWS] Subscribe send failed: {}", e);
            }
        }
    }

    /// Remove assets from the subscription set and evict their books.
    ///
    /// The wire protocol has no reliable unsubscribe; the removal only
    /// stops replay on the next reconnect. Consider reconnecting to shed
    /// server-side subscriptions.
    pub fn unsubscribe(&self, asset_ids: &[String]) {
        let mut subscribed = self.state.subscribed.write();
        for asset in asset_ids {
            subscribed.remove(asset);
            self.state.cache.evict(Venue::Polymarket, asset);
        }
    }

    pub fn subscribed_assets(&self) -> Vec<String> {
        self.state.subscribed.read().iter().cloned().collect()
    }

    pub fn add_book_listener(
        &self,
        filter_asset_id: Option<String>,
        callback: Arc<dyn Fn(&NormalizedOrderBook) + Send + Sync>,
    ) -> ListenerId {
        self.state.book_listeners.add(filter_asset_id, callback)
    }

    pub fn remove_book_listener(&self, id: ListenerId) {
        self.state.book_listeners.remove(id);
    }

    pub fn add_trade_listener(
        &self,
        filter_asset_id: Option<String>,
        callback: Arc<dyn Fn(&TradeTick) + Send + Sync>,
    ) -> ListenerId {
        self.state.trade_listeners.add(filter_asset_id, callback)
    }

    pub fn remove_trade_listener(&self, id: ListenerId) {
        self.state.trade_listeners.remove(id);
    }

    /// Latest cached book for an asset
    pub fn book(&self, asset_id: &str) -> Option<NormalizedOrderBook> {
        self.state.cache.get(Venue::Polymarket, asset_id)
    }

    pub fn set_asset_metadata(&self, asset_id: &str, meta: books::AssetMetadata) {
        self.state.cache.set_metadata(Venue::Polymarket, asset_id, meta);
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_state() -> Arc<MarketState> {
        Arc::new(MarketState {
            subscribed: RwLock::new(HashSet::new()),
            cache: Arc::new(BookCache::new()),
            book_listeners: ListenerSet::new("test/book"),
            trade_listeners: ListenerSet::new("test/trade"),
        })
    }

    fn book_frame(asset: &str, ts: u64) -> String {
        format!(
            r#"{{"event_type":"book","market":"0xcond","asset_id":"{}","bids":[{{"price":"0.45","size":"100"}}],"asks":[{{"price":"0.55","size":"50"}}],"timestamp":"{}"}}"#,
            asset, ts
        )
    }

    #[test]
    fn test_book_frame_updates_cache_and_listeners() {
        let state = test_state();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        state.book_listeners.add(
            None,
            Arc::new(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut socket = MarketSocket {
            state: Arc::clone(&state),
        };
        let replies = socket.on_frame(&book_frame("42", 1_700_000_000_000));
        assert!(replies.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let book = state.cache.get(Venue::Polymarket, "42").unwrap();
        assert_eq!(book.best_bid().unwrap().price, 0.45);
        assert_eq!(book.best_ask().unwrap().price, 0.55);
    }

    #[test]
    fn test_batch_snapshot_array() {
        let state = test_state();
        let mut socket = MarketSocket {
            state: Arc::clone(&state),
        };
        let frame = format!(
            "[{},{}]",
            book_frame("1", 1_000).replace(r#""event_type":"book","#, ""),
            book_frame("2", 1_000).replace(r#""event_type":"book","#, "")
        );
        socket.on_frame(&frame);
        assert!(state.cache.get(Venue::Polymarket, "1").is_some());
        assert!(state.cache.get(Venue::Polymarket, "2").is_some());
    }

    #[test]
    fn test_price_change_goes_to_trade_listeners() {
        let state = test_state();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = Arc::clone(&ticks);
        state.trade_listeners.add(
            None,
            Arc::new(move |tick: &TradeTick| {
                assert!(tick.price > 0.0);
                ticks_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut socket = MarketSocket {
            state: Arc::clone(&state),
        };
        let frame = r#"{"event_type":"price_change","asset_id":"42","changes":[{"price":"0.47","side":"BUY","size":"10"},{"price":"0.48","side":"SELL","size":"5"}]}"#;
        socket.on_frame(frame);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        // Price changes never touch the book cache directly
        assert!(state.cache.get(Venue::Polymarket, "42").is_none());
    }

    #[test]
    fn test_plaintext_frames_tolerated() {
        let state = test_state();
        let mut socket = MarketSocket { state };
        assert!(socket.on_frame("PONG").is_empty());
        assert!(socket.on_frame("INVALID OPERATION").is_empty());
        assert!(socket.on_frame("garbage{{{").is_empty());
    }

    #[test]
    fn test_stale_book_frame_ignored() {
        let state = test_state();
        let mut socket = MarketSocket {
            state: Arc::clone(&state),
        };
        socket.on_frame(&book_frame("42", 2_000));
        socket.on_frame(&book_frame("42", 1_000));
        assert_eq!(state.cache.get(Venue::Polymarket, "42").unwrap().updated_ms, 2_000);
    }
}
