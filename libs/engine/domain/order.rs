//! Open-order model with sticky terminal states

use super::mapping::Outcome;
use books::Venue;
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order lifecycle. Terminal states are sticky: once FILLED, CANCELLED,
/// EXPIRED or FAILED, no later readout may change the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Live,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Expired | OrderStatus::Failed
        )
    }

    /// Apply a newer readout, keeping terminal states sticky.
    pub fn apply(self, newer: OrderStatus) -> OrderStatus {
        if self.is_terminal() {
            self
        } else {
            newer
        }
    }

    /// Parse a venue status string (either venue's vocabulary).
    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(OrderStatus::Pending),
            "LIVE" | "OPEN" => Some(OrderStatus::Live),
            "PARTIALLY_FILLED" | "PARTIAL" => Some(OrderStatus::PartiallyFilled),
            "FILLED" | "MATCHED" => Some(OrderStatus::Filled),
            "CANCELLED" | "CANCELED" => Some(OrderStatus::Cancelled),
            "EXPIRED" => Some(OrderStatus::Expired),
            "FAILED" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Live => "LIVE",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Open order on either venue.
///
/// `outcome` stays `None` when it cannot be derived from the token id and
/// the market mapping; unknown is never conflated with YES.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub venue: Venue,
    pub order_id: String,
    pub order_hash: Option<String>,
    pub market_id: String,
    pub side: Side,
    pub outcome: Option<Outcome>,
    pub price: f64,
    pub original_quantity: f64,
    pub filled_quantity: f64,
    pub status: OrderStatus,
}

impl OpenOrder {
    pub fn remaining(&self) -> f64 {
        (self.original_quantity - self.filled_quantity).max(0.0)
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Merge a newer readout, enforcing `filled <= original` and terminal
    /// stickiness.
    pub fn merge_readout(&mut self, status: OrderStatus, filled: f64) {
        self.status = self.status.apply(status);
        let clamped = filled.min(self.original_quantity);
        if clamped > self.filled_quantity {
            self.filled_quantity = clamped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OpenOrder {
        OpenOrder {
            venue: Venue::Predict,
            order_id: "o1".to_string(),
            order_hash: Some("0xhash".to_string()),
            market_id: "m1".to_string(),
            side: Side::Buy,
            outcome: Some(Outcome::Yes),
            price: 0.45,
            original_quantity: 100.0,
            filled_quantity: 0.0,
            status: OrderStatus::Live,
        }
    }

    #[test]
    fn test_terminal_stickiness() {
        let mut o = order();
        o.merge_readout(OrderStatus::Filled, 100.0);
        assert_eq!(o.status, OrderStatus::Filled);

        // A late LIVE readout cannot resurrect the order
        o.merge_readout(OrderStatus::Live, 100.0);
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn test_filled_clamped_to_original() {
        let mut o = order();
        o.merge_readout(OrderStatus::PartiallyFilled, 150.0);
        assert_eq!(o.filled_quantity, 100.0);
    }

    #[test]
    fn test_filled_never_decreases() {
        let mut o = order();
        o.merge_readout(OrderStatus::PartiallyFilled, 60.0);
        o.merge_readout(OrderStatus::PartiallyFilled, 40.0);
        assert_eq!(o.filled_quantity, 60.0);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(OrderStatus::parse("matched"), Some(OrderStatus::Filled));
        assert_eq!(OrderStatus::parse("CANCELED"), Some(OrderStatus::Cancelled));
        assert_eq!(OrderStatus::parse("weird"), None);
    }

    #[test]
    fn test_cancelled_keeps_partial_fill() {
        let mut o = order();
        o.merge_readout(OrderStatus::PartiallyFilled, 30.0);
        o.merge_readout(OrderStatus::Cancelled, 30.0);
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.filled_quantity, 30.0);
        assert_eq!(o.remaining(), 70.0);
    }
}
