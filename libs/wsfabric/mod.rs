//! wsfabric - resilient WebSocket client runtime
//!
//! Shared transport layer for the venue WebSocket clients:
//! - Exponential-backoff reconnection with endpoint rotation
//! - Subscription replay on reconnect via the `SocketHandler` trait
//! - Active heartbeat frames and handler-driven passive ping replies
//! - Shutdown flag checked at every suspension point
//! - Listener registries with panic isolation

pub mod circuit;
pub mod client;
pub mod config;
pub mod error;
pub mod listeners;

pub use circuit::{CircuitBreaker, CircuitStats};
pub use client::{ConnectionState, SocketHandler, WsClient, WsHandle};
pub use config::{EndpointRotation, ReconnectPolicy, WsConfig};
pub use error::{Result, WsError};
pub use listeners::{ListenerId, ListenerSet};
