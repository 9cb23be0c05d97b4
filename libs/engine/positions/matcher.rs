//! Matched-pair construction and close-opportunity metrics

use crate::arb::{mt_close, tt_close, CloseQuote};
use crate::domain::{MappingStore, MatchedPair, Outcome, Position, UnmatchedReason};
use books::{BookCache, NormalizedOrderBook, Venue};
use serde::Serialize;
use tracing::debug;

/// Position (or residual) without a delta-neutral counterpart
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unmatched {
    pub position: Position,
    pub shares: f64,
    pub reason: UnmatchedReason,
}

/// Result of one matching pass; recomputed on every reconciliation tick
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    pub pairs: Vec<MatchedPair>,
    pub unmatched: Vec<Unmatched>,
}

/// Correlate the two venues' positions through the mapping registry.
pub fn match_positions(
    mappings: &MappingStore,
    predict: &[Position],
    poly: &[Position],
) -> MatchReport {
    let mut report = MatchReport::default();
    let mut poly_claimed = vec![false; poly.len()];

    for position in predict {
        let Some(mapping) = mappings.by_predict_market(&position.market_id) else {
            report.unmatched.push(Unmatched {
                position: position.clone(),
                shares: position.shares,
                reason: UnmatchedReason::NoMapping,
            });
            continue;
        };

        let counterpart = poly
            .iter()
            .enumerate()
            .find(|(i, p)| !poly_claimed[*i] && p.market_id == mapping.condition_id);

        let Some((poly_index, poly_position)) = counterpart else {
            report.unmatched.push(Unmatched {
                position: position.clone(),
                shares: position.shares,
                reason: UnmatchedReason::NoCounterpart,
            });
            continue;
        };

        match MatchedPair::try_match(&mapping, position, poly_position) {
            Some(pair) => {
                poly_claimed[poly_index] = true;

                // Shares beyond the matched amount stay exposed
                let predict_residual = position.shares - pair.matched_shares;
                if predict_residual > 0.0 {
                    report.unmatched.push(Unmatched {
                        position: position.clone(),
                        shares: predict_residual,
                        reason: UnmatchedReason::NoCounterpart,
                    });
                }
                let poly_residual = poly_position.shares - pair.matched_shares;
                if poly_residual > 0.0 {
                    report.unmatched.push(Unmatched {
                        position: poly_position.clone(),
                        shares: poly_residual,
                        reason: UnmatchedReason::NoCounterpart,
                    });
                }

                report.pairs.push(pair);
            }
            None => {
                poly_claimed[poly_index] = true;
                report.unmatched.push(Unmatched {
                    position: position.clone(),
                    shares: position.shares,
                    reason: UnmatchedReason::DirectionMismatch,
                });
                report.unmatched.push(Unmatched {
                    position: poly_position.clone(),
                    shares: poly_position.shares,
                    reason: UnmatchedReason::DirectionMismatch,
                });
            }
        }
    }

    // Polymarket positions nothing on Predict claimed
    for (i, position) in poly.iter().enumerate() {
        if poly_claimed[i] {
            continue;
        }
        let reason = if mappings.by_condition(&position.market_id).is_some() {
            UnmatchedReason::NoCounterpart
        } else {
            UnmatchedReason::NoMapping
        };
        report.unmatched.push(Unmatched {
            position: position.clone(),
            shares: position.shares,
            reason,
        });
    }

    debug!(
        "[Matcher] {} pairs, {} unmatched entries",
        report.pairs.len(),
        report.unmatched.len()
    );
    report
}

/// Close metrics for one matched pair
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOpportunity {
    pub pair: MatchedPair,
    /// Taker-Taker: hit both bids now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tt: Option<CloseQuote>,
    /// Maker-Taker: rest at the Predict ask, hit the Polymarket bid on fill
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mt: Option<CloseQuote>,
    pub predict_bid: Option<f64>,
    pub predict_ask: Option<f64>,
    pub poly_bid: Option<f64>,
    /// Oldest book timestamp feeding the quotes
    pub books_as_of_ms: u64,
}

/// Compute T-T and M-T close metrics for every pair from the cached books.
pub fn close_opportunities(
    mappings: &MappingStore,
    cache: &BookCache,
    pairs: &[MatchedPair],
) -> Vec<CloseOpportunity> {
    pairs
        .iter()
        .filter_map(|pair| {
            let mapping = mappings.by_condition(&pair.condition_id)?;

            let predict_view: Option<NormalizedOrderBook> = cache
                .get(Venue::Predict, &pair.predict_market_id)
                .map(|book| match pair.predict_outcome {
                    Outcome::Yes => book,
                    Outcome::No => book.inverted(),
                });
            let poly_book =
                cache.get(Venue::Polymarket, mapping.poly_token_for(pair.poly_outcome));

            let predict_bid = predict_view.as_ref().and_then(|b| b.best_bid());
            let predict_ask = predict_view.as_ref().and_then(|b| b.best_ask());
            let poly_bid = poly_book.as_ref().and_then(|b| b.best_bid());

            let tt = match (predict_bid, poly_bid) {
                (Some(pb), Some(gb)) => Some(tt_close(
                    pb.price,
                    mapping.fee_rate_bps,
                    gb.price,
                    gb.size,
                    pair.entry_cost_per_share,
                    pair.matched_shares,
                )),
                _ => None,
            };

            let mt = match (predict_ask, poly_bid) {
                (Some(pa), Some(gb)) => Some(mt_close(
                    pa.price,
                    gb.price,
                    gb.size,
                    pair.entry_cost_per_share,
                    pair.matched_shares,
                )),
                _ => None,
            };

            let books_as_of_ms = [
                predict_view.as_ref().map(|b| b.updated_ms),
                poly_book.as_ref().map(|b| b.updated_ms),
            ]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(0);

            Some(CloseOpportunity {
                pair: pair.clone(),
                tt,
                mt,
                predict_bid: predict_bid.map(|l| l.price),
                predict_ask: predict_ask.map(|l| l.price),
                poly_bid: poly_bid.map(|l| l.price),
                books_as_of_ms,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketMapping;
    use books::PriceLevel;

    fn mapping() -> MarketMapping {
        MarketMapping {
            predict_market_id: "pm-1".to_string(),
            condition_id: "0xcond".to_string(),
            event_title: "Will it rain?".to_string(),
            predict_yes_token_id: "p-yes".to_string(),
            predict_no_token_id: "p-no".to_string(),
            poly_yes_token_id: "g-yes".to_string(),
            poly_no_token_id: "g-no".to_string(),
            is_inverted: false,
            neg_risk: false,
            yield_bearing: false,
            tick_size: 0.01,
            fee_rate_bps: 123,
        }
    }

    fn store() -> MappingStore {
        let store = MappingStore::new();
        store.insert(mapping());
        store
    }

    fn position(venue: Venue, market: &str, outcome: Outcome, shares: f64, price: f64) -> Position {
        Position {
            venue,
            market_id: market.to_string(),
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
    fn test_matched_pair_with_residual() {
        let store = store();
        let predict = vec![position(Venue::Predict, "pm-1", Outcome::Yes, 100.0, 0.45)];
        let poly = vec![position(Venue::Polymarket, "0xcond", Outcome::No, 80.0, 0.52)];

        let report = match_positions(&store, &predict, &poly);
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.pairs[0].matched_shares, 80.0);

        // 20 residual Predict shares have no counterpart
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].shares, 20.0);
        assert_eq!(report.unmatched[0].reason, UnmatchedReason::NoCounterpart);
    }

    #[test]
    fn test_no_mapping_classification() {
        let store = store();
        let predict = vec![position(Venue::Predict, "pm-unknown", Outcome::Yes, 10.0, 0.5)];
        let poly = vec![position(Venue::Polymarket, "0xother", Outcome::No, 10.0, 0.5)];

        let report = match_positions(&store, &predict, &poly);
        assert!(report.pairs.is_empty());
        assert_eq!(report.unmatched.len(), 2);
        assert!(report
            .unmatched
            .iter()
            .all(|u| u.reason == UnmatchedReason::NoMapping));
    }

    #[test]
    fn test_direction_mismatch_classification() {
        let store = store();
        // Both long YES on a straight mapping: payouts do not cancel
        let predict = vec![position(Venue::Predict, "pm-1", Outcome::Yes, 10.0, 0.5)];
        let poly = vec![position(Venue::Polymarket, "0xcond", Outcome::Yes, 10.0, 0.5)];

        let report = match_positions(&store, &predict, &poly);
        assert!(report.pairs.is_empty());
        assert_eq!(report.unmatched.len(), 2);
        assert!(report
            .unmatched
            .iter()
            .all(|u| u.reason == UnmatchedReason::DirectionMismatch));
    }

    #[test]
    fn test_poly_only_position_no_counterpart() {
        let store = store();
        let report = match_positions(
            &store,
            &[],
            &[position(Venue::Polymarket, "0xcond", Outcome::No, 10.0, 0.5)],
        );
        assert_eq!(report.unmatched.len(), 1);
        assert_eq!(report.unmatched[0].reason, UnmatchedReason::NoCounterpart);
    }

    #[test]
    fn test_close_opportunities_from_books() {
        let store = store();
        let cache = BookCache::new();
        cache.insert(NormalizedOrderBook::from_levels(
            Venue::Predict,
            "pm-1",
            "pm-1",
            2_000,
            vec![PriceLevel::new(0.55, 200.0)],
            vec![PriceLevel::new(0.56, 200.0)],
        ));
        cache.insert(NormalizedOrderBook::from_levels(
            Venue::Polymarket,
            "0xcond",
            "g-no",
            3_000,
            vec![PriceLevel::new(0.50, 100.0)],
            vec![PriceLevel::new(0.52, 100.0)],
        ));

        let predict = vec![position(Venue::Predict, "pm-1", Outcome::Yes, 50.0, 0.45)];
        let poly = vec![position(Venue::Polymarket, "0xcond", Outcome::No, 50.0, 0.52)];
        let report = match_positions(&store, &predict, &poly);

        let opportunities = close_opportunities(&store, &cache, &report.pairs);
        assert_eq!(opportunities.len(), 1);

        let opp = &opportunities[0];
        assert_eq!(opp.predict_bid, Some(0.55));
        assert_eq!(opp.poly_bid, Some(0.50));
        // Oldest book timestamp is surfaced for staleness judgment
        assert_eq!(opp.books_as_of_ms, 2_000);

        // entry cost 0.97; fee(0.55, 123 bps) = 0.0050
        let tt = opp.tt.as_ref().unwrap();
        assert_eq!(tt.est_profit_per_share, 0.075);
        assert!(tt.valid);

        let mt = opp.mt.as_ref().unwrap();
        assert_eq!(mt.est_profit_per_share, books::round4(0.56 + 0.50 - 0.97));
    }

    #[test]
    fn test_close_opportunity_missing_books() {
        let store = store();
        let cache = BookCache::new();
        let predict = vec![position(Venue::Predict, "pm-1", Outcome::Yes, 50.0, 0.45)];
        let poly = vec![position(Venue::Polymarket, "0xcond", Outcome::No, 50.0, 0.52)];
        let report = match_positions(&store, &predict, &poly);

        let opportunities = close_opportunities(&store, &cache, &report.pairs);
        assert_eq!(opportunities.len(), 1);
        assert!(opportunities[0].tt.is_none());
        assert!(opportunities[0].mt.is_none());
    }
}
