//! Order book domain entities

use crate::num::{round4, EPSILON};
use serde::{Deserialize, Serialize};

/// Exchange of origin for a book or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Predict,
    Polymarket,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::Predict => write!(f, "predict"),
            Venue::Polymarket => write!(f, "polymarket"),
        }
    }
}

/// Single price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price: round4(price),
            size,
        }
    }
}

/// Per-asset metadata the WebSocket payloads do not carry; warmed from the
/// REST clients once per new asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub min_order_size: f64,
    pub tick_size: f64,
}

impl Default for AssetMetadata {
    fn default() -> Self {
        Self {
            min_order_size: 0.0,
            tick_size: 0.01,
        }
    }
}

/// Snapshot of one side of one binary outcome on one venue.
///
/// Invariants: prices in (0,1); asks sorted ascending and bids descending
/// after dedup; `updated_ms` never goes backwards for a given asset (the
/// cache enforces that on insert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedOrderBook {
    pub venue: Venue,
    pub market_id: String,
    pub asset_id: String,
    pub updated_ms: u64,
    /// Ascending by price.
    pub asks: Vec<PriceLevel>,
    /// Descending by price.
    pub bids: Vec<PriceLevel>,
    pub min_order_size: f64,
    pub tick_size: f64,
    pub neg_risk: bool,
}

impl NormalizedOrderBook {
    /// Build a snapshot from raw levels in any order. Duplicate prices are
    /// merged (sizes summed), zero-size levels dropped, prices outside
    /// (0, 1) discarded.
    pub fn from_levels(
        venue: Venue,
        market_id: impl Into<String>,
        asset_id: impl Into<String>,
        updated_ms: u64,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            venue,
            market_id: market_id.into(),
            asset_id: asset_id.into(),
            updated_ms,
            asks: normalize_side(asks, false),
            bids: normalize_side(bids, true),
            min_order_size: 0.0,
            tick_size: 0.01,
            neg_risk: false,
        }
    }

    pub fn apply_metadata(&mut self, meta: AssetMetadata) {
        self.min_order_size = meta.min_order_size;
        self.tick_size = meta.tick_size;
    }

    #[inline]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(round4(a.price - b.price)),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some(round4((a.price + b.price) / 2.0)),
            _ => None,
        }
    }

    /// Derive the complementary-outcome view: every price maps to
    /// `1 - price`, sides swap (YES bids become NO asks and vice versa),
    /// sizes are preserved.
    pub fn inverted(&self) -> NormalizedOrderBook {
        let invert = |levels: &[PriceLevel]| -> Vec<PriceLevel> {
            levels
                .iter()
                .map(|l| PriceLevel::new(1.0 - l.price, l.size))
                .collect()
        };

        NormalizedOrderBook {
            venue: self.venue,
            market_id: self.market_id.clone(),
            asset_id: self.asset_id.clone(),
            updated_ms: self.updated_ms,
            // YES bids -> NO asks, YES asks -> NO bids
            asks: normalize_side(invert(&self.bids), false),
            bids: normalize_side(invert(&self.asks), true),
            min_order_size: self.min_order_size,
            tick_size: self.tick_size,
            neg_risk: self.neg_risk,
        }
    }

    /// Walk a side from the top of book while the price stays within
    /// `max_slippage_pct` percent of the best level. Returns
    /// `(total_qty, avg_price)`.
    pub fn cumulative_depth(levels: &[PriceLevel], max_slippage_pct: f64) -> (f64, f64) {
        let Some(best) = levels.first() else {
            return (0.0, 0.0);
        };

        let band = best.price.abs() * max_slippage_pct / 100.0;
        let mut total_qty = 0.0;
        let mut total_cost = 0.0;

        for level in levels {
            if (level.price - best.price).abs() > band + EPSILON {
                break;
            }
            total_qty += level.size;
            total_cost += level.price * level.size;
        }

        if total_qty <= 0.0 {
            (0.0, 0.0)
        } else {
            (total_qty, round4(total_cost / total_qty))
        }
    }

    /// Age of the snapshot relative to `now_ms`.
    pub fn staleness_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.updated_ms)
    }
}

/// Sort, merge duplicate prices, and drop empty/out-of-range levels.
fn normalize_side(mut levels: Vec<PriceLevel>, descending: bool) -> Vec<PriceLevel> {
    levels.retain(|l| l.size > 0.0 && l.price > 0.0 && l.price < 1.0);
    if descending {
        levels.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
    } else {
        levels.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    }

    let mut merged: Vec<PriceLevel> = Vec::with_capacity(levels.len());
    for level in levels {
        match merged.last_mut() {
            Some(last) if (last.price - level.price).abs() < EPSILON / 10.0 => {
                last.size += level.size;
            }
            _ => merged.push(level),
        }
    }
    merged
}
