//! Venue-B client: Polymarket CLOB, Gamma discovery, Data API, and the
//! market/user WebSocket channels.
//!
//! Authentication is the HMAC triplet (key, secret, passphrase) on every
//! REST request plus EIP-712 order signing through the trader wallet.

pub mod auth;
pub mod constants;
pub mod data;
pub mod gamma;
pub mod market_ws;
pub mod order_builder;
pub mod rest;
pub mod types;
pub mod user_ws;

pub use auth::{AuthError, PolymarketAuth};
pub use data::DataClient;
pub use gamma::GammaClient;
pub use market_ws::{MarketWs, TradeTick};
pub use order_builder::{Order, OrderBuilder, SignedOrder};
pub use rest::{ClobClient, RestError};
pub use types::*;
pub use user_ws::{OrderFinal, UserWs};
