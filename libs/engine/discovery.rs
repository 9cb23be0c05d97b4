//! Market-mapping discovery
//!
//! Builds `MarketMapping`s from the two venues' metadata. The YES/NO
//! pairing is derived from the outcome labels: when Predict's YES aligns
//! with Polymarket's NO the mapping is inverted. Exactly one of the two
//! Polymarket tokens is the YES token; anything else is rejected.

use crate::domain::MarketMapping;
use polymarket::gamma::GammaMarket;
use predict::types::PredictMarket;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq)]
pub enum DiscoveryError {
    #[error("Gamma market {0} has no token ids")]
    MissingTokens(String),

    #[error("Gamma market {0} is not binary ({1} outcomes)")]
    NotBinary(String, usize),

    #[error("Gamma market {0} has no YES/NO outcome labels")]
    AmbiguousOutcomes(String),
}

/// Pair one Predict market with one Gamma market into a mapping.
///
/// Outcome labels decide orientation: a Gamma market whose first outcome
/// is "Yes" quotes its first token as the YES token. `is_inverted` is set
/// when the two venues' questions resolve in opposite directions (caller
/// passes `inverted` from its question matching).
pub fn build_mapping(
    predict_market: &PredictMarket,
    gamma_market: &GammaMarket,
    inverted: bool,
) -> Result<MarketMapping, DiscoveryError> {
    let token_ids = gamma_market.parse_token_ids();
    if token_ids.is_empty() {
        return Err(DiscoveryError::MissingTokens(gamma_market.condition_id.clone()));
    }
    if token_ids.len() != 2 {
        return Err(DiscoveryError::NotBinary(
            gamma_market.condition_id.clone(),
            token_ids.len(),
        ));
    }

    let outcomes = gamma_market.parse_outcomes();
    let (poly_yes, poly_no) = match outcomes
        .iter()
        .position(|o| o.eq_ignore_ascii_case("yes"))
    {
        Some(0) => (token_ids[0].clone(), token_ids[1].clone()),
        Some(1) => (token_ids[1].clone(), token_ids[0].clone()),
        _ => {
            return Err(DiscoveryError::AmbiguousOutcomes(
                gamma_market.condition_id.clone(),
            ))
        }
    };

    let tick_size = predict_market
        .tick_size
        .or(gamma_market.order_price_min_tick_size)
        .unwrap_or(0.01);

    Ok(MarketMapping {
        predict_market_id: predict_market.id.clone(),
        condition_id: gamma_market.condition_id.clone(),
        event_title: if predict_market.event_title.is_empty() {
            gamma_market.question.clone()
        } else {
            predict_market.event_title.clone()
        },
        predict_yes_token_id: predict_market.yes_token_id.clone(),
        predict_no_token_id: predict_market.no_token_id.clone(),
        poly_yes_token_id: poly_yes,
        poly_no_token_id: poly_no,
        is_inverted: inverted,
        neg_risk: predict_market.neg_risk || gamma_market.neg_risk.unwrap_or(false),
        yield_bearing: predict_market.yield_bearing,
        tick_size,
        fee_rate_bps: predict_market.fee_rate_bps.unwrap_or(0),
    })
}

/// Pair markets from both venues by slug, logging and skipping rejects.
pub fn pair_by_slug(
    predict_markets: &[PredictMarket],
    gamma_markets: &[GammaMarket],
) -> Vec<MarketMapping> {
    let mut mappings = Vec::new();
    for predict_market in predict_markets {
        let Some(gamma_market) = gamma_markets
            .iter()
            .find(|g| !g.slug.is_empty() && g.slug == predict_market.id)
            .or_else(|| {
                gamma_markets
                    .iter()
                    .find(|g| g.question.eq_ignore_ascii_case(&predict_market.question))
            })
        else {
            continue;
        };

        match build_mapping(predict_market, gamma_market, false) {
            Ok(mapping) => mappings.push(mapping),
            Err(e) => warn!("[Discovery] Skipping {}: {}", predict_market.id, e),
        }
    }
    mappings
}
