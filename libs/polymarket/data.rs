//! Data API client (positions)
//!
//! Positions live with the proxy wallet, not the signer; callers must pass
//! the proxy address. The endpoint is unauthenticated.

use crate::constants::DATA_BASE_URL;
use crate::rest::{Result, RestError};
use crate::types::DataPosition;
use ethers::types::Address;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub struct DataClient {
    base_url: String,
    client: Client,
}

impl DataClient {
    pub fn new() -> Self {
        Self::with_base_url(DATA_BASE_URL)
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

    /// Positions held by `user` (the proxy wallet)
    pub async fn get_positions(&self, user: Address) -> Result<Vec<DataPosition>> {
        let url = format!("{}/positions?user={:?}", self.base_url, user);
        debug!("[DataApi] GET {}", url);

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
}

impl Default for DataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_deserialization() {
        let json = r#"[{
            "asset": "123",
            "conditionId": "0xcond",
            "size": 42.5,
            "avgPrice": 0.47,
            "curPrice": 0.51,
            "title": "Will it rain?",
            "outcome": "Yes",
            "negativeRisk": false
        }]"#;

        let positions: Vec<DataPosition> = serde_json::from_str(json).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].asset, "123");
        assert_eq!(positions[0].size, 42.5);
        assert_eq!(positions[0].avg_price, 0.47);
    }
}
