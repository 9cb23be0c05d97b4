//! Positions and matched pairs

use super::mapping::{MarketMapping, Outcome};
use books::Venue;
use serde::{Deserialize, Serialize};

/// Normalized position on one venue.
///
/// `as_of_ms` carries the fetch timestamp; stale replies served from cache
/// keep their original timestamp so callers can judge staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub venue: Venue,
    pub market_id: String,
    pub token_id: String,
    pub event_title: String,
    pub outcome: Outcome,
    pub shares: f64,
    pub avg_entry_price: f64,
    pub mark_value: f64,
    pub as_of_ms: u64,
}

/// Why a position (or part of it) has no delta-neutral counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    NoMapping,
    NoCounterpart,
    DirectionMismatch,
}

/// Delta-neutral pair of positions, one per venue.
///
/// Alignment respects `is_inverted`: YES here pairs with NO there, or with
/// YES there when the mapping is inverted. The locked profit per share is
/// `1 - entry_cost_per_share`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPair {
    pub event_title: String,
    pub predict_market_id: String,
    pub condition_id: String,
    pub predict_outcome: Outcome,
    pub poly_outcome: Outcome,
    pub matched_shares: f64,
    pub predict_shares: f64,
    pub poly_shares: f64,
    pub predict_avg_price: f64,
    pub poly_avg_price: f64,
    /// Combined entry cost per matched share
    pub entry_cost_per_share: f64,
    pub as_of_ms: u64,
}

impl MatchedPair {
    /// Build a pair when the outcomes align under the mapping.
    pub fn try_match(
        mapping: &MarketMapping,
        predict: &Position,
        poly: &Position,
    ) -> Option<MatchedPair> {
        if mapping.hedge_outcome(predict.outcome) != poly.outcome {
            return None;
        }

        let matched_shares = predict.shares.min(poly.shares);
        if matched_shares <= 0.0 {
            return None;
        }

        Some(MatchedPair {
            event_title: mapping.event_title.clone(),
            predict_market_id: mapping.predict_market_id.clone(),
            condition_id: mapping.condition_id.clone(),
            predict_outcome: predict.outcome,
            poly_outcome: poly.outcome,
            matched_shares,
            predict_shares: predict.shares,
            poly_shares: poly.shares,
            predict_avg_price: predict.avg_entry_price,
            poly_avg_price: poly.avg_entry_price,
            entry_cost_per_share: books::round4(predict.avg_entry_price + poly.avg_entry_price),
            as_of_ms: predict.as_of_ms.min(poly.as_of_ms),
        })
    }

    /// Shares left unmatched on the larger side
    pub fn residual_shares(&self) -> f64 {
        (self.predict_shares - self.poly_shares).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::test_mapping;

    fn position(venue: Venue, outcome: Outcome, shares: f64, price: f64) -> Position {
        Position {
            venue,
            market_id: "pm-1".to_string(),
            token_id: String::new(),
            event_title: "Will it rain?".to_string(),
            outcome,
            shares,
            avg_entry_price: price,
            mark_value: shares * price,
            as_of_ms: 1_000,
        }
    }

    #[test]
    fn test_match_straight_mapping() {
        let mapping = test_mapping(false);
        let predict = position(Venue::Predict, Outcome::Yes, 100.0, 0.45);
        let poly = position(Venue::Polymarket, Outcome::No, 80.0, 0.52);

        let pair = MatchedPair::try_match(&mapping, &predict, &poly).unwrap();
        assert_eq!(pair.matched_shares, 80.0);
        assert_eq!(pair.entry_cost_per_share, 0.97);
        assert_eq!(pair.residual_shares(), 20.0);
    }

    #[test]
    fn test_direction_mismatch_rejected() {
        let mapping = test_mapping(false);
        let predict = position(Venue::Predict, Outcome::Yes, 100.0, 0.45);
        let poly = position(Venue::Polymarket, Outcome::Yes, 80.0, 0.52);
        assert!(MatchedPair::try_match(&mapping, &predict, &poly).is_none());
    }

    #[test]
    fn test_inverted_mapping_aligns_same_label() {
        let mapping = test_mapping(true);
        let predict = position(Venue::Predict, Outcome::Yes, 50.0, 0.40);
        let poly = position(Venue::Polymarket, Outcome::Yes, 60.0, 0.55);

        let pair = MatchedPair::try_match(&mapping, &predict, &poly).unwrap();
        assert_eq!(pair.matched_shares, 50.0);
    }

    #[test]
    fn test_zero_shares_not_a_pair() {
        let mapping = test_mapping(false);
        let predict = position(Venue::Predict, Outcome::Yes, 0.0, 0.45);
        let poly = position(Venue::Polymarket, Outcome::No, 80.0, 0.52);
        assert!(MatchedPair::try_match(&mapping, &predict, &poly).is_none());
    }
}
