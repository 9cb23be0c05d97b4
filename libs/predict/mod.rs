//! Venue-A client: Predict exchange (BSC-settled)
//!
//! - JWT auth via the signed-message handshake, cached with early refresh
//! - EIP-712 order signing across the four exchange contracts
//!   (standard / negRisk, each in a yield-bearing flavor)
//! - REST client with an API-key pool and per-key rate-limit cooldown
//! - Orderbook WebSocket with the venue's heartbeat-echo protocol
//! - On-chain `OrderFilled` watcher over rotating BSC WSS endpoints

pub mod auth;
pub mod constants;
pub mod onchain;
pub mod order;
pub mod rest;
pub mod types;
pub mod ws;

pub use auth::{AuthError, JwtAuth};
pub use onchain::{OnchainFill, OrderFilledWatcher};
pub use order::{OrderBuilder, PredictOrder, SignedOrder};
pub use rest::{ApiKeyPool, PredictRestClient, RestError};
pub use types::*;
pub use ws::PredictWs;
