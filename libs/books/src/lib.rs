//! Normalized order books shared by both venue clients
//!
//! - `Venue` tags every book with its origin exchange
//! - `NormalizedOrderBook` stores asks ascending / bids descending after
//!   dedup, with the metadata the WebSocket feeds do not carry
//! - `BookCache` is the process-wide `(venue, asset)` keyed cache with a
//!   single producer per asset and monotonic update timestamps

pub mod book;
pub mod cache;
pub mod num;

pub use book::{AssetMetadata, NormalizedOrderBook, PriceLevel, Venue};
pub use cache::BookCache;
pub use num::{round4, EPSILON};
