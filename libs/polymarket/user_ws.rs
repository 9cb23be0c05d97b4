//! User channel WebSocket client
//!
//! HMAC-gated subscription delivering the account's own order and trade
//! events. Events are retained per order id for a bounded TTL so a watcher
//! attached after a fast IOC fill (the fill can land before the placeOrder
//! HTTP response returns) still observes the event.

use crate::constants::USER_WS_URL;
use crate::types::{ApiCredentials, OrderEventMessage, TradeEventMessage, UserSubscription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wsfabric::{
    ConnectionState, EndpointRotation, ListenerId, ListenerSet, SocketHandler, WsClient, WsConfig,
    WsHandle,
};

/// Heartbeat interval for the plain-text PING
const HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Retention window for per-order event caching
const EVENT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Terminal order readout delivered to waiters.
///
/// A TRADE event resolves waiters with status `LIVE`; callers must confirm
/// the final `{status, filled}` through REST, which stays the source of
/// truth.
#[derive(Debug, Clone)]
pub struct OrderFinal {
    pub status: String,
    pub filled_qty: f64,
}

struct UserState {
    order_listeners: ListenerSet<OrderEventMessage>,
    trade_listeners: ListenerSet<TradeEventMessage>,
    recent_orders: Mutex<HashMap<String, (Instant, OrderEventMessage)>>,
    recent_trades: Mutex<HashMap<String, (Instant, TradeEventMessage)>>,
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<OrderFinal>>>>,
}

impl UserState {
    fn resolve_waiters(&self, order_id: &str, result: OrderFinal) {
        let senders = self.waiters.lock().remove(order_id);
        if let Some(senders) = senders {
            for sender in senders {
                let _ = sender.send(result.clone());
            }
        }
    }

    fn handle_order_event(&self, msg: OrderEventMessage) {
        debug!(
            "[UserWS] Order {} {}: matched {}/{}",
            msg.msg_type, msg.id, msg.size_matched, msg.original_size
        );

        prune_expired(&mut self.recent_orders.lock());
        self.recent_orders
            .lock()
            .insert(msg.id.clone(), (Instant::now(), msg.clone()));

        if let Some(final_state) = order_final_state(&msg) {
            self.resolve_waiters(&msg.id, final_state);
        }

        self.order_listeners.notify(&msg.asset_id, &msg);
    }

    fn handle_trade_event(&self, msg: TradeEventMessage) {
        debug!(
            "[UserWS] Trade {} {} {} @ {} (size {})",
            msg.id, msg.side, msg.asset_id, msg.price, msg.size
        );

        if let Some(taker_order_id) = msg.taker_order_id.clone() {
            prune_expired(&mut self.recent_trades.lock());
            self.recent_trades
                .lock()
                .insert(taker_order_id.clone(), (Instant::now(), msg.clone()));

            // A trade on an IOC order means the fill happened; status is
            // only LIVE until REST confirms the terminal readout.
            self.resolve_waiters(
                &taker_order_id,
                OrderFinal {
                    status: "LIVE".to_string(),
                    filled_qty: msg.size.parse().unwrap_or(0.0),
                },
            );
        }

        self.trade_listeners.notify(&msg.asset_id, &msg);
    }
}

/// Terminal readout for an order event, if it is terminal.
fn order_final_state(msg: &OrderEventMessage) -> Option<OrderFinal> {
    let status = msg.status.as_deref().unwrap_or("").to_uppercase();
    let filled = msg.size_matched_f64();
    let original = msg.original_size_f64();

    if msg.msg_type.eq_ignore_ascii_case("CANCELLATION") || status == "CANCELED" || status == "CANCELLED"
    {
        return Some(OrderFinal {
            status: "CANCELLED".to_string(),
            filled_qty: filled,
        });
    }
    if status == "MATCHED" || status == "FILLED" || (original > 0.0 && filled >= original) {
        return Some(OrderFinal {
            status: "FILLED".to_string(),
            filled_qty: filled,
        });
    }
    if status == "EXPIRED" {
        return Some(OrderFinal {
            status: "EXPIRED".to_string(),
            filled_qty: filled,
        });
    }
    None
}

fn prune_expired<T>(map: &mut HashMap<String, (Instant, T)>) {
    map.retain(|_, (at, _)| at.elapsed() < EVENT_CACHE_TTL);
}

struct UserSocket {
    state: Arc<UserState>,
    credentials: ApiCredentials,
}

impl SocketHandler for UserSocket {
    fn on_connect(&mut self) -> Vec<String> {
        let sub = UserSubscription::new(self.credentials.clone());
        vec![serde_json::to_string(&sub).unwrap_or_default()]
    }

    fn on_frame(&mut self, text: &str) -> Vec<String> {
        if text == "PONG" {
            return Vec::new();
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(_) => {
                debug!("[UserWS] Non-JSON frame dropped: {}", text);
                return Vec::new();
            }
        };

        // The channel may batch events into arrays.
        let items = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        for item in items {
            let event_type = item
                .get("event_type")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            match event_type.as_str() {
                "order" => match serde_json::from_value::<OrderEventMessage>(item) {
                    Ok(msg) => self.state.handle_order_event(msg),
                    Err(e) => warn!("[UserWS] Bad order event: {}", e),
                },
                "trade" => match serde_json::from_value::<TradeEventMessage>(item) {
                    Ok(msg) => self.state.handle_trade_event(msg),
                    Err(e) => warn!("[UserWS] Bad trade event: {}", e),
                },
                _ => debug!("[UserWS] Unknown event dropped"),
            }
        }

        Vec::new()
    }
}

/// User channel client
pub struct UserWs {
    url: String,
    credentials: ApiCredentials,
    state: Arc<UserState>,
    handle: Option<WsHandle>,
}

impl UserWs {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self::with_url(USER_WS_URL, credentials)
    }

    pub fn with_url(url: impl Into<String>, credentials: ApiCredentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            state: Arc::new(UserState {
                order_listeners: ListenerSet::new("UserWS/order"),
                trade_listeners: ListenerSet::new("UserWS/trade"),
                recent_orders: Mutex::new(HashMap::new()),
                recent_trades: Mutex::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
            }),
            handle: None,
        }
    }

    pub fn connect(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let config = WsConfig::new(EndpointRotation::single(self.url.clone())).with_heartbeat(
            Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            "PING".to_string(),
        );
        let socket = UserSocket {
            state: Arc::clone(&self.state),
            credentials: self.credentials.clone(),
        };
        self.handle = Some(WsClient::spawn("UserWS", config, socket));
    }

    pub async fn disconnect(&mut self, clear_listeners: bool) {
        if let Some(mut handle) = self.handle.take() {
            handle.disconnect().await;
        }
        if clear_listeners {
            self.state.order_listeners.clear();
            self.state.trade_listeners.clear();
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.handle
            .as_ref()
            .map(|h| h.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn add_order_event_listener(
        &self,
        filter_asset_id: Option<String>,
        callback: Arc<dyn Fn(&OrderEventMessage) + Send + Sync>,
    ) -> ListenerId {
        self.state.order_listeners.add(filter_asset_id, callback)
    }

    pub fn remove_order_event_listener(&self, id: ListenerId) {
        self.state.order_listeners.remove(id);
    }

    pub fn add_trade_event_listener(
        &self,
        filter_asset_id: Option<String>,
        callback: Arc<dyn Fn(&TradeEventMessage) + Send + Sync>,
    ) -> ListenerId {
        self.state.trade_listeners.add(filter_asset_id, callback)
    }

    pub fn remove_trade_event_listener(&self, id: ListenerId) {
        self.state.trade_listeners.remove(id);
    }

    /// Wait for a terminal (or trade-implied LIVE) readout of `order_id`.
    ///
    /// Checks the recent-event cache first so fills that completed before
    /// the caller attached are not missed, then parks on a oneshot until
    /// `timeout`. Returns `None` on timeout; the listener is unregistered.
    pub async fn wait_for_order_final(
        &self,
        order_id: &str,
        timeout: Duration,
    ) -> Option<OrderFinal> {
        {
            let mut recent = self.state.recent_orders.lock();
            prune_expired(&mut recent);
            if let Some((_, msg)) = recent.get(order_id) {
                if let Some(final_state) = order_final_state(msg) {
                    return Some(final_state);
                }
            }
        }
        {
            let mut recent = self.state.recent_trades.lock();
            prune_expired(&mut recent);
            if let Some((_, msg)) = recent.get(order_id) {
                return Some(OrderFinal {
                    status: "LIVE".to_string(),
                    filled_qty: msg.size.parse().unwrap_or(0.0),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.state
            .waiters
            .lock()
            .entry(order_id.to_string())
            .or_default()
            .push(tx);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(final_state)) => Some(final_state),
            _ => {
                // Drop our waiter slot on timeout
                if let Some(senders) = self.state.waiters.lock().get_mut(order_id) {
                    senders.retain(|s| !s.is_closed());
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<UserState> {
        Arc::new(UserState {
            order_listeners: ListenerSet::new("test/order"),
            trade_listeners: ListenerSet::new("test/trade"),
            recent_orders: Mutex::new(HashMap::new()),
            recent_trades: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    fn test_user_ws(state: Arc<UserState>) -> UserWs {
        UserWs {
            url: "wss://unused".to_string(),
            credentials: ApiCredentials {
                key: "k".to_string(),
                secret: "s".to_string(),
                passphrase: "p".to_string(),
            },
            state,
            handle: None,
        }
    }

    fn order_frame(id: &str, status: &str, matched: &str) -> String {
        format!(
            r#"{{"event_type":"order","id":"{}","asset_id":"42","market":"0xcond","side":"BUY","price":"0.5","original_size":"100","size_matched":"{}","type":"UPDATE","status":"{}"}}"#,
            id, matched, status
        )
    }

    #[test]
    fn test_terminal_detection() {
        let filled: OrderEventMessage = serde_json::from_str(&order_frame("o1", "MATCHED", "100")).unwrap();
        let state = order_final_state(&filled).unwrap();
        assert_eq!(state.status, "FILLED");
        assert_eq!(state.filled_qty, 100.0);

        let live: OrderEventMessage = serde_json::from_str(&order_frame("o1", "LIVE", "0")).unwrap();
        assert!(order_final_state(&live).is_none());

        let partial: OrderEventMessage = serde_json::from_str(&order_frame("o1", "LIVE", "40")).unwrap();
        assert!(order_final_state(&partial).is_none());
    }

    #[tokio::test]
    async fn test_wait_sees_event_cached_before_attach() {
        let state = test_state();
        let mut socket = UserSocket {
            state: Arc::clone(&state),
            credentials: ApiCredentials {
                key: "k".to_string(),
                secret: "s".to_string(),
                passphrase: "p".to_string(),
            },
        };

        // Fill arrives before anyone waits (fast IOC)
        socket.on_frame(&order_frame("o1", "MATCHED", "100"));

        let ws = test_user_ws(state);
        let final_state = ws
            .wait_for_order_final("o1", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(final_state.status, "FILLED");
        assert_eq!(final_state.filled_qty, 100.0);
    }

    #[tokio::test]
    async fn test_wait_resolves_on_later_event() {
        let state = test_state();
        let ws = test_user_ws(Arc::clone(&state));

        let state_clone = Arc::clone(&state);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let msg: OrderEventMessage =
                serde_json::from_str(&order_frame("o2", "MATCHED", "70")).unwrap();
            state_clone.handle_order_event(msg);
        });

        let final_state = ws
            .wait_for_order_final("o2", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(final_state.status, "FILLED");
        assert_eq!(final_state.filled_qty, 70.0);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let state = test_state();
        let ws = test_user_ws(state);
        let result = ws
            .wait_for_order_final("missing", Duration::from_millis(30))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_trade_event_resolves_as_live() {
        let state = test_state();
        let ws = test_user_ws(Arc::clone(&state));

        let frame = r#"{"event_type":"trade","id":"t1","asset_id":"42","market":"0xcond","side":"BUY","price":"0.5","size":"25","status":"MATCHED","taker_order_id":"o3"}"#;
        let mut socket = UserSocket {
            state: Arc::clone(&state),
            credentials: ApiCredentials {
                key: "k".to_string(),
                secret: "s".to_string(),
                passphrase: "p".to_string(),
            },
        };
        socket.on_frame(frame);

        let final_state = ws
            .wait_for_order_final("o3", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(final_state.status, "LIVE");
        assert_eq!(final_state.filled_qty, 25.0);
    }

    #[test]
    fn test_cancellation_event() {
        let msg: OrderEventMessage = serde_json::from_str(
            r#"{"event_type":"order","id":"o4","asset_id":"42","market":"0xcond","side":"BUY","price":"0.5","original_size":"100","size_matched":"30","type":"CANCELLATION","status":"CANCELED"}"#,
        )
        .unwrap();
        let state = order_final_state(&msg).unwrap();
        assert_eq!(state.status, "CANCELLED");
        // Cancelled with a partial fill still reports the filled quantity
        assert_eq!(state.filled_qty, 30.0);
    }
}
