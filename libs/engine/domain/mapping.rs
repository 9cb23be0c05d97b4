//! Cross-venue market mapping

use serde::{Deserialize, Serialize};

/// Binary outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn invert(self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pairing of a Predict market with a Polymarket condition.
///
/// `is_inverted` is true when YES on Predict corresponds to NO on
/// Polymarket; the opposing outcome prices derive by `p_no = 1 - p_yes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMapping {
    pub predict_market_id: String,
    pub condition_id: String,
    pub event_title: String,
    pub predict_yes_token_id: String,
    pub predict_no_token_id: String,
    pub poly_yes_token_id: String,
    pub poly_no_token_id: String,
    pub is_inverted: bool,
    pub neg_risk: bool,
    pub yield_bearing: bool,
    pub tick_size: f64,
    pub fee_rate_bps: u64,
}

impl MarketMapping {
    /// Queue key: one task at a time per venue pair + market.
    pub fn market_key(&self) -> String {
        format!("{}:{}", self.predict_market_id, self.condition_id)
    }

    /// Predict token for an outcome
    pub fn predict_token_for(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.predict_yes_token_id,
            Outcome::No => &self.predict_no_token_id,
        }
    }

    /// Polymarket token for an outcome as labeled on Polymarket
    pub fn poly_token_for(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Yes => &self.poly_yes_token_id,
            Outcome::No => &self.poly_no_token_id,
        }
    }

    /// Polymarket outcome that hedges a Predict position on `arb_side`.
    ///
    /// Normally the hedge is the opposite outcome; when the mapping is
    /// inverted (YES here is NO there) the hedge is the same label.
    pub fn hedge_outcome(&self, arb_side: Outcome) -> Outcome {
        if self.is_inverted {
            arb_side
        } else {
            arb_side.invert()
        }
    }

    /// Polymarket token that hedges a Predict position on `arb_side`
    pub fn hedge_token_for(&self, arb_side: Outcome) -> &str {
        self.poly_token_for(self.hedge_outcome(arb_side))
    }

    /// Derive the outcome from a Predict token id, if it belongs here
    pub fn outcome_from_predict_token(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.predict_yes_token_id {
            Some(Outcome::Yes)
        } else if token_id == self.predict_no_token_id {
            Some(Outcome::No)
        } else {
            None
        }
    }

    /// Derive the outcome from a Polymarket token id, if it belongs here
    pub fn outcome_from_poly_token(&self, token_id: &str) -> Option<Outcome> {
        if token_id == self.poly_yes_token_id {
            Some(Outcome::Yes)
        } else if token_id == self.poly_no_token_id {
            Some(Outcome::No)
        } else {
            None
        }
    }
}

/// Shared registry of market mappings, keyed by the queue market key.
#[derive(Default)]
pub struct MappingStore {
    by_key: parking_lot::RwLock<std::collections::HashMap<String, MarketMapping>>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mapping: MarketMapping) {
        self.by_key.write().insert(mapping.market_key(), mapping);
    }

    pub fn get(&self, market_key: &str) -> Option<MarketMapping> {
        self.by_key.read().get(market_key).cloned()
    }

    pub fn by_condition(&self, condition_id: &str) -> Option<MarketMapping> {
        self.by_key
            .read()
            .values()
            .find(|m| m.condition_id == condition_id)
            .cloned()
    }

    pub fn by_predict_market(&self, market_id: &str) -> Option<MarketMapping> {
        self.by_key
            .read()
            .values()
            .find(|m| m.predict_market_id == market_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<MarketMapping> {
        self.by_key.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.read().is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_mapping(is_inverted: bool) -> MarketMapping {
    MarketMapping {
        predict_market_id: "pm-1".to_string(),
        condition_id: "0xcond".to_string(),
        event_title: "Will it rain?".to_string(),
        predict_yes_token_id: "p-yes".to_string(),
        predict_no_token_id: "p-no".to_string(),
        poly_yes_token_id: "g-yes".to_string(),
        poly_no_token_id: "g-no".to_string(),
        is_inverted,
        neg_risk: false,
        yield_bearing: false,
        tick_size: 0.01,
        fee_rate_bps: 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_invert() {
        assert_eq!(Outcome::Yes.invert(), Outcome::No);
        assert_eq!(Outcome::No.invert(), Outcome::Yes);
    }

    #[test]
    fn test_hedge_token_straight() {
        let mapping = test_mapping(false);
        // Buying YES on Predict hedges with NO on Polymarket
        assert_eq!(mapping.hedge_token_for(Outcome::Yes), "g-no");
        assert_eq!(mapping.hedge_token_for(Outcome::No), "g-yes");
    }

    #[test]
    fn test_hedge_token_inverted() {
        let mapping = test_mapping(true);
        // YES here is NO there, so the hedge keeps the label
        assert_eq!(mapping.hedge_token_for(Outcome::Yes), "g-yes");
        assert_eq!(mapping.hedge_token_for(Outcome::No), "g-no");
    }

    #[test]
    fn test_outcome_from_tokens() {
        let mapping = test_mapping(false);
        assert_eq!(mapping.outcome_from_predict_token("p-yes"), Some(Outcome::Yes));
        assert_eq!(mapping.outcome_from_poly_token("g-no"), Some(Outcome::No));
        // Unknown tokens stay unknown, never defaulted to YES
        assert_eq!(mapping.outcome_from_predict_token("other"), None);
    }
}
