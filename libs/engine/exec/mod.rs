//! Order-execution engine
//!
//! The two-leg state machine talks to the venues through the `MakerVenue`
//! (Predict) and `HedgeVenue` (Polymarket) seams. Real adapters live in
//! `venues`; tests drive the machine with scripted stand-ins.

pub mod two_leg;
pub mod venues;
pub mod watcher;

pub use two_leg::TwoLegExecutor;
pub use venues::{PolymarketHedgeVenue, PredictMakerVenue};

use crate::domain::{MarketMapping, OrderStatus, Outcome, Side};
use async_trait::async_trait;
use books::NormalizedOrderBook;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    /// Network/5xx/parse class: retried with backoff, never task-fatal on
    /// its own.
    #[error("transient: {0}")]
    Transient(String),

    /// Rejected order (balance, allowance, signature, tick misalignment):
    /// fatal for the task.
    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Classify a venue error message into the taxonomy. Balance, allowance
/// and signature rejections end the task; everything else retries.
pub fn classify_venue_error(message: &str) -> ExecError {
    let lower = message.to_lowercase();
    let fatal = ["balance", "allowance", "signature", "tick", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle));
    if fatal {
        ExecError::Fatal(message.to_string())
    } else {
        ExecError::Transient(message.to_string())
    }
}

/// Submitted order handle
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
    pub order_hash: Option<String>,
}

/// Status readout; REST is the source of truth for both fields.
#[derive(Debug, Clone)]
pub struct OrderReadout {
    pub status: OrderStatus,
    pub filled: f64,
}

/// Predict-side operations used by the maker leg
#[async_trait]
pub trait MakerVenue: Send + Sync {
    async fn place_limit(
        &self,
        mapping: &MarketMapping,
        outcome: Outcome,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<PlacedOrder>;

    async fn cancel(&self, order: &PlacedOrder) -> Result<()>;

    /// REST status read (source of truth)
    async fn status(&self, order: &PlacedOrder) -> Result<OrderReadout>;

    /// Low-latency fill hint from the on-chain watcher. Returns true when
    /// an event arrived within the timeout; the caller confirms via REST.
    async fn wait_fill_hint(&self, order: &PlacedOrder, timeout: Duration) -> bool;

    /// Cached YES book for the market
    fn book(&self, mapping: &MarketMapping) -> Option<NormalizedOrderBook>;
}

/// Polymarket-side operations used by the hedge leg
#[async_trait]
pub trait HedgeVenue: Send + Sync {
    /// Cached book for a token
    fn book(&self, token_id: &str) -> Option<NormalizedOrderBook>;

    async fn place_ioc(
        &self,
        mapping: &MarketMapping,
        token_id: &str,
        side: Side,
        price: f64,
        quantity: f64,
    ) -> Result<PlacedOrder>;

    /// Settle an IOC: wait on the user channel, then confirm via REST.
    async fn settle(&self, order: &PlacedOrder, timeout: Duration) -> Result<OrderReadout>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            classify_venue_error("insufficient balance"),
            ExecError::Fatal(_)
        ));
        assert!(matches!(
            classify_venue_error("invalid signature"),
            ExecError::Fatal(_)
        ));
        assert!(matches!(
            classify_venue_error("connection reset by peer"),
            ExecError::Transient(_)
        ));
        assert!(matches!(
            classify_venue_error("HTTP 503: upstream timeout"),
            ExecError::Transient(_)
        ));
    }
}
