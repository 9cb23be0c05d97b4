//! Wire DTOs for the CLOB REST API and the WebSocket channels

use serde::{Deserialize, Serialize};

/// HMAC triplet for the CLOB API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    #[serde(rename = "apiKey")]
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

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

/// Order time-in-force. GTC rests on the book with zero expiration; FAK is
/// the marketable immediate-or-cancel flavor and carries a short TTL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    GTC,
    FAK,
    FOK,
    GTD,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::GTC => "GTC",
            OrderType::FAK => "FAK",
            OrderType::FOK => "FOK",
            OrderType::GTD => "GTD",
        }
    }
}

/// String-encoded price level as the API returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLevel {
    pub price: String,
    pub size: String,
}

impl RawLevel {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn size_f64(&self) -> f64 {
        self.size.parse().unwrap_or(0.0)
    }
}

/// REST / WS order book payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookPayload {
    pub market: String,
    pub asset_id: String,
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    #[serde(default)]
    pub asks: Vec<RawLevel>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub min_order_size: Option<String>,
    #[serde(default)]
    pub tick_size: Option<String>,
    #[serde(default)]
    pub neg_risk: Option<bool>,
}

impl OrderBookPayload {
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp
            .as_deref()
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(0)
    }
}

/// Reply from `GET /price`
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub price: String,
}

/// One entry of the `GET /spreads` batch reply
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadEntry {
    pub asset_id: Option<String>,
    pub spread: String,
}

/// Order placement reply
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPlacementResponse {
    pub success: bool,
    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "takingAmount", default)]
    pub taking_amount: Option<String>,
    #[serde(rename = "makingAmount", default)]
    pub making_amount: Option<String>,
}

/// Open order as the REST API reports it
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrderDto {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    pub market: String,
    pub asset_id: String,
    pub side: String,
    #[serde(default)]
    pub outcome: Option<String>,
    pub price: String,
    pub original_size: String,
    pub size_matched: String,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
}

impl OpenOrderDto {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn original_size_f64(&self) -> f64 {
        self.original_size.parse().unwrap_or(0.0)
    }

    pub fn size_matched_f64(&self) -> f64 {
        self.size_matched.parse().unwrap_or(0.0)
    }
}

/// Cancellation reply
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    #[serde(default)]
    pub canceled: Vec<String>,
    #[serde(default)]
    pub not_canceled: serde_json::Value,
}

/// Position from the Data API (held by the proxy wallet)
#[derive(Debug, Clone, Deserialize)]
pub struct DataPosition {
    pub asset: String,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub size: f64,
    #[serde(rename = "avgPrice")]
    pub avg_price: f64,
    #[serde(rename = "curPrice", default)]
    pub cur_price: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(rename = "negativeRisk", default)]
    pub negative_risk: bool,
}

// =============================================================================
// WebSocket payloads
// =============================================================================

/// Market channel subscription: `{"type":"market","assets_ids":[...]}`
#[derive(Debug, Clone, Serialize)]
pub struct MarketSubscription {
    #[serde(rename = "type")]
    pub channel: String,
    pub assets_ids: Vec<String>,
}

impl MarketSubscription {
    pub fn new(assets_ids: Vec<String>) -> Self {
        Self {
            channel: "market".to_string(),
            assets_ids,
        }
    }
}

/// User channel subscription, HMAC-gated:
/// `{"type":"USER","markets":[],"auth":{apiKey,secret,passphrase}}`
#[derive(Debug, Clone, Serialize)]
pub struct UserSubscription {
    #[serde(rename = "type")]
    pub channel: String,
    pub markets: Vec<String>,
    pub auth: ApiCredentials,
}

impl UserSubscription {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            channel: "USER".to_string(),
            markets: Vec::new(),
            auth: credentials,
        }
    }
}

/// One price-level change within a `price_change` event
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChange {
    pub price: String,
    pub side: String,
    pub size: String,
}

/// `price_change` event
#[derive(Debug, Clone, Deserialize)]
pub struct PriceChangeMessage {
    pub asset_id: String,
    #[serde(default)]
    pub changes: Vec<PriceChange>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `last_trade_price` event
#[derive(Debug, Clone, Deserialize)]
pub struct LastTradePriceMessage {
    pub asset_id: String,
    pub price: String,
    pub side: String,
    #[serde(default)]
    pub size: Option<String>,
}

/// User channel order event
#[derive(Debug, Clone, Deserialize)]
pub struct OrderEventMessage {
    pub event_type: String,
    pub id: String,
    pub asset_id: String,
    pub market: String,
    pub side: String,
    #[serde(default)]
    pub outcome: String,
    pub price: String,
    pub original_size: String,
    pub size_matched: String,
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

impl OrderEventMessage {
    pub fn size_matched_f64(&self) -> f64 {
        self.size_matched.parse().unwrap_or(0.0)
    }

    pub fn original_size_f64(&self) -> f64 {
        self.original_size.parse().unwrap_or(0.0)
    }
}

/// User channel trade event
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEventMessage {
    pub event_type: String,
    pub id: String,
    pub asset_id: String,
    pub market: String,
    pub side: String,
    pub price: String,
    pub size: String,
    pub status: String,
    #[serde(rename = "taker_order_id", default)]
    pub taker_order_id: Option<String>,
    #[serde(default)]
    pub maker_orders: Vec<serde_json::Value>,
    #[serde(default)]
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_subscription_wire_format() {
        let sub = MarketSubscription::new(vec!["123".to_string(), "456".to_string()]);
        let json = serde_json::to_string(&sub).unwrap();
        assert_eq!(json, r#"{"type":"market","assets_ids":["123","456"]}"#);
    }

    #[test]
    fn test_user_subscription_wire_format() {
        let sub = UserSubscription::new(ApiCredentials {
            key: "k".to_string(),
            secret: "s".to_string(),
            passphrase: "p".to_string(),
        });
        let json = serde_json::to_string(&sub).unwrap();
        assert_eq!(
            json,
            r#"{"type":"USER","markets":[],"auth":{"apiKey":"k","secret":"s","passphrase":"p"}}"#
        );
    }

    #[test]
    fn test_order_book_payload_parse() {
        let json = r#"{
            "market": "0xcond",
            "asset_id": "123",
            "bids": [{"price": "0.45", "size": "100"}],
            "asks": [{"price": "0.55", "size": "50"}],
            "timestamp": "1700000000123",
            "min_order_size": "5",
            "tick_size": "0.01"
        }"#;
        let book: OrderBookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(book.bids[0].price_f64(), 0.45);
        assert_eq!(book.asks[0].size_f64(), 50.0);
        assert_eq!(book.timestamp_ms(), 1_700_000_000_123);
    }

    #[test]
    fn test_order_type_strings() {
        assert_eq!(OrderType::GTC.as_str(), "GTC");
        assert_eq!(OrderType::FAK.as_str(), "FAK");
    }
}
