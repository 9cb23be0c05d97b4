//! Wire DTOs for the Predict REST and WebSocket APIs

use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Reply from `GET /v1/auth/message`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthMessageResponse {
    pub message: String,
}

/// Reply from `POST /v1/auth`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokenResponse {
    pub token: String,
    /// Expiry as Unix milliseconds
    pub expires_at: u64,
}

/// String-encoded price level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub quantity: String,
}

impl RawLevel {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn quantity_f64(&self) -> f64 {
        self.quantity.parse().unwrap_or(0.0)
    }
}

/// Orderbook payload (REST reply and WS `orderbook/<marketId>` topic data)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderbookPayload {
    pub market_id: String,
    /// Token the book is quoted in (the YES outcome token)
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

/// Market metadata from `GET /v1/markets`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictMarket {
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub event_title: String,
    #[serde(default)]
    pub yes_token_id: String,
    #[serde(default)]
    pub no_token_id: String,
    #[serde(default)]
    pub neg_risk: bool,
    #[serde(default)]
    pub yield_bearing: bool,
    #[serde(default)]
    pub tick_size: Option<f64>,
    #[serde(default)]
    pub min_order_size: Option<f64>,
    #[serde(default)]
    pub fee_rate_bps: Option<u64>,
    #[serde(default)]
    pub outcome_name: Option<String>,
}

/// Event with its nested markets from `GET /v1/events`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictEvent {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub markets: Vec<PredictMarket>,
}

/// Order placement reply
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_hash: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Order status readout from `GET /v1/orders/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: String,
    #[serde(default)]
    pub order_hash: Option<String>,
    pub status: String,
    #[serde(default)]
    pub market_id: String,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub filled_quantity: f64,
}

impl OrderStatusResponse {
    /// Terminal statuses are sticky on the venue side.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.to_uppercase().as_str(),
            "FILLED" | "CANCELLED" | "CANCELED" | "EXPIRED" | "FAILED"
        )
    }
}

/// Position row from the GraphQL positions query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictPosition {
    pub market_id: String,
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub outcome_name: String,
    #[serde(default)]
    pub event_title: String,
    pub quantity: f64,
    #[serde(default)]
    pub avg_entry_price: f64,
    #[serde(default)]
    pub mark_value: f64,
}

/// Account balance readout
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    #[serde(default)]
    pub available: f64,
    #[serde(default)]
    pub total: f64,
}

// =============================================================================
// WebSocket envelope
// =============================================================================

/// Subscribe request:
/// `{"method":"subscribe","requestId":<n>,"params":["orderbook/<id>"]}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub method: String,
    pub request_id: u64,
    pub params: Vec<String>,
}

impl SubscribeRequest {
    pub fn new(request_id: u64, topics: Vec<String>) -> Self {
        Self {
            method: "subscribe".to_string(),
            request_id,
            params: topics,
        }
    }
}

/// Inbound envelope: `{"type":"M","topic":"...","data":{...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Wallet-event payload on the `predictWalletEvents` topic
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEvent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub order_hash: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub filled_quantity: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let req = SubscribeRequest::new(7, vec!["orderbook/market-1".to_string()]);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"method":"subscribe","requestId":7,"params":["orderbook/market-1"]}"#
        );
    }

    #[test]
    fn test_envelope_parse() {
        let frame = r#"{"type":"M","topic":"heartbeat","data":{"seq":12}}"#;
        let envelope: WsEnvelope = serde_json::from_str(frame).unwrap();
        assert_eq!(envelope.kind, "M");
        assert_eq!(envelope.topic, "heartbeat");
        assert_eq!(envelope.data["seq"], 12);
    }

    #[test]
    fn test_order_status_terminal() {
        let mut status = OrderStatusResponse {
            order_id: "o1".to_string(),
            order_hash: None,
            status: "LIVE".to_string(),
            market_id: String::new(),
            token_id: None,
            side: None,
            price: 0.5,
            quantity: 100.0,
            filled_quantity: 0.0,
        };
        assert!(!status.is_terminal());
        status.status = "FILLED".to_string();
        assert!(status.is_terminal());
        status.status = "cancelled".to_string();
        assert!(status.is_terminal());
    }
}
