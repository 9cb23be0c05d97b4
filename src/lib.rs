//! predict-poly-arb - Main Library
//!
//! Facade over the workspace crates that make up the cross-venue
//! arbitrage engine:
//!
//! - **wsfabric**: resilient WebSocket client runtime
//! - **books**: normalized order books and the shared cache
//! - **predict**: Venue-A client (JWT auth, EIP-712, on-chain watcher)
//! - **polymarket**: Venue-B client (HMAC auth, CLOB, user channel)
//! - **arb_engine**: calculators, execution, positions, scheduler, API

pub use arb_engine;
pub use books;
pub use polymarket;
pub use predict;
pub use wsfabric;
