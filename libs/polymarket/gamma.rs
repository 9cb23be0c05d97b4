//! Gamma discovery API client
//!
//! Read-only metadata source used to build market mappings: markets by
//! condition id or slug, events with their nested markets.

use crate::constants::GAMMA_BASE_URL;
use crate::rest::{Result, RestError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Market as Gamma reports it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub condition_id: String,
    /// JSON-encoded array of the two outcome token ids
    #[serde(default)]
    pub clob_token_ids: Option<String>,
    #[serde(default)]
    pub outcomes: Option<String>,
    #[serde(default)]
    pub neg_risk: Option<bool>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub order_price_min_tick_size: Option<f64>,
    #[serde(default)]
    pub order_min_size: Option<f64>,
}

impl GammaMarket {
    /// Decode the JSON-encoded token id array
    pub fn parse_token_ids(&self) -> Vec<String> {
        self.clob_token_ids
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }

    /// Decode the JSON-encoded outcome name array
    pub fn parse_outcomes(&self) -> Vec<String> {
        self.outcomes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }
}

/// Event with nested markets
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

/// Gamma API client
pub struct GammaClient {
    base_url: String,
    client: Client,
}

impl GammaClient {
    pub fn new() -> Self {
        Self::with_base_url(GAMMA_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[Gamma] GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Markets, optionally filtered by condition ids
    pub async fn get_markets(
        &self,
        condition_ids: &[String],
        limit: usize,
    ) -> Result<Vec<GammaMarket>> {
        let mut path = format!("/markets?limit={}", limit);
        for id in condition_ids {
            path.push_str(&format!("&condition_ids={}", id));
        }
        let value = self.get_json(&path).await?;
        serde_json::from_value(value).map_err(|e| RestError::DeserializeFailed(e.to_string()))
    }

    /// One market by slug
    pub async fn get_market_by_slug(&self, slug: &str) -> Result<Option<GammaMarket>> {
        let value = self.get_json(&format!("/markets?slug={}", slug)).await?;
        let markets: Vec<GammaMarket> =
            serde_json::from_value(value).map_err(|e| RestError::DeserializeFailed(e.to_string()))?;
        Ok(markets.into_iter().next())
    }

    /// Events (non-closed unless `include_closed`)
    pub async fn get_events(&self, include_closed: bool, limit: usize) -> Result<Vec<GammaEvent>> {
        let mut path = format!("/events?limit={}", limit);
        if !include_closed {
            path.push_str("&closed=false");
        }
        let value = self.get_json(&path).await?;
        serde_json::from_value(value).map_err(|e| RestError::DeserializeFailed(e.to_string()))
    }
}

impl Default for GammaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ids_parse() {
        let market = GammaMarket {
            id: "1".to_string(),
            question: "Will it rain?".to_string(),
            slug: "will-it-rain".to_string(),
            condition_id: "0xcond".to_string(),
            clob_token_ids: Some(r#"["111","222"]"#.to_string()),
            outcomes: Some(r#"["Yes","No"]"#.to_string()),
            neg_risk: Some(false),
            active: Some(true),
            closed: Some(false),
            order_price_min_tick_size: Some(0.01),
            order_min_size: Some(5.0),
        };

        assert_eq!(market.parse_token_ids(), vec!["111", "222"]);
        assert_eq!(market.parse_outcomes(), vec!["Yes", "No"]);
    }

    #[test]
    fn test_malformed_token_ids_yield_empty() {
        let market = GammaMarket {
            id: String::new(),
            question: String::new(),
            slug: String::new(),
            condition_id: String::new(),
            clob_token_ids: Some("not-json".to_string()),
            outcomes: None,
            neg_risk: None,
            active: None,
            closed: None,
            order_price_min_tick_size: None,
            order_min_size: None,
        };
        assert!(market.parse_token_ids().is_empty());
        assert!(market.parse_outcomes().is_empty());
    }
}
