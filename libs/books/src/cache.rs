//! Shared order-book cache
//!
//! Single writer per asset (the owning WebSocket receive task), many
//! readers. Readers get snapshots by value and judge staleness from
//! `updated_ms`; no cross-asset atomicity is provided.

use crate::book::{AssetMetadata, NormalizedOrderBook, Venue};
use dashmap::DashMap;
use tracing::debug;

type Key = (Venue, String);

/// Process-wide cache of the latest normalized book per `(venue, asset)`.
#[derive(Default)]
pub struct BookCache {
    books: DashMap<Key, NormalizedOrderBook>,
    metadata: DashMap<Key, AssetMetadata>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a snapshot, merging cached metadata. A snapshot older than
    /// the cached one for the same asset is dropped so `updated_ms` stays
    /// monotonic; returns whether the snapshot was applied.
    pub fn insert(&self, mut book: NormalizedOrderBook) -> bool {
        let key = (book.venue, book.asset_id.clone());

        if let Some(meta) = self.metadata.get(&key) {
            book.apply_metadata(*meta);
        }

        if let Some(existing) = self.books.get(&key) {
            if book.updated_ms < existing.updated_ms {
                debug!(
                    "[BookCache] Dropping stale snapshot for {}/{} ({} < {})",
                    book.venue, book.asset_id, book.updated_ms, existing.updated_ms
                );
                return false;
            }
        }

        self.books.insert(key, book);
        true
    }

    /// Snapshot by value.
    pub fn get(&self, venue: Venue, asset_id: &str) -> Option<NormalizedOrderBook> {
        self.books
            .get(&(venue, asset_id.to_string()))
            .map(|b| b.clone())
    }

    /// Evict a book when its subscription is released.
    pub fn evict(&self, venue: Venue, asset_id: &str) {
        self.books.remove(&(venue, asset_id.to_string()));
    }

    /// Record metadata for an asset and backfill the cached book.
    pub fn set_metadata(&self, venue: Venue, asset_id: &str, meta: AssetMetadata) {
        let key = (venue, asset_id.to_string());
        self.metadata.insert(key.clone(), meta);
        if let Some(mut book) = self.books.get_mut(&key) {
            book.apply_metadata(meta);
        }
    }

    pub fn metadata(&self, venue: Venue, asset_id: &str) -> Option<AssetMetadata> {
        self.metadata.get(&(venue, asset_id.to_string())).map(|m| *m)
    }

    pub fn has_metadata(&self, venue: Venue, asset_id: &str) -> bool {
        self.metadata.contains_key(&(venue, asset_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Asset ids currently cached for a venue.
    pub fn assets(&self, venue: Venue) -> Vec<String> {
        self.books
            .iter()
            .filter(|e| e.key().0 == venue)
            .map(|e| e.key().1.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PriceLevel;

    fn snapshot(asset: &str, updated_ms: u64) -> NormalizedOrderBook {
        NormalizedOrderBook::from_levels(
            Venue::Polymarket,
            "cond",
            asset,
            updated_ms,
            vec![PriceLevel::new(0.4, 10.0)],
            vec![PriceLevel::new(0.6, 10.0)],
        )
    }

    #[test]
    fn test_insert_and_get() {
        let cache = BookCache::new();
        assert!(cache.insert(snapshot("a", 100)));
        let book = cache.get(Venue::Polymarket, "a").unwrap();
        assert_eq!(book.updated_ms, 100);
        assert!(cache.get(Venue::Predict, "a").is_none());
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let cache = BookCache::new();
        cache.insert(snapshot("a", 200));
        assert!(!cache.insert(snapshot("a", 150)));
        assert_eq!(cache.get(Venue::Polymarket, "a").unwrap().updated_ms, 200);
        // Equal timestamps replace (idempotent re-delivery)
        assert!(cache.insert(snapshot("a", 200)));
    }

    #[test]
    fn test_metadata_merge_on_insert() {
        let cache = BookCache::new();
        cache.set_metadata(
            Venue::Polymarket,
            "a",
            AssetMetadata {
                min_order_size: 5.0,
                tick_size: 0.001,
            },
        );
        cache.insert(snapshot("a", 100));
        let book = cache.get(Venue::Polymarket, "a").unwrap();
        assert_eq!(book.min_order_size, 5.0);
        assert_eq!(book.tick_size, 0.001);
    }

    #[test]
    fn test_metadata_backfills_existing_book() {
        let cache = BookCache::new();
        cache.insert(snapshot("a", 100));
        cache.set_metadata(
            Venue::Polymarket,
            "a",
            AssetMetadata {
                min_order_size: 1.0,
                tick_size: 0.01,
            },
        );
        assert_eq!(cache.get(Venue::Polymarket, "a").unwrap().min_order_size, 1.0);
    }

    #[test]
    fn test_evict() {
        let cache = BookCache::new();
        cache.insert(snapshot("a", 100));
        cache.evict(Venue::Polymarket, "a");
        assert!(cache.get(Venue::Polymarket, "a").is_none());
    }
}
