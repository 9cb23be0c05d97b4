//! Engine configuration
//!
//! Loaded from environment variables (a `.env` file is honored when
//! present). Credentials for both venues are required; the engine does not
//! run without them.

use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarMissing(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Venue-A (Predict) credentials and endpoints
#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Key pool: PREDICT_API_KEY plus PREDICT_API_KEY_SCAN* and
    /// PREDICT_API_KEY_TRADE when present
    pub api_keys: Vec<String>,
    pub signer_private_key: String,
    pub smart_wallet_address: String,
    pub api_base_url: String,
    /// Comma-separated BSC WSS endpoints for the on-chain watcher
    pub bsc_wss_urls: Vec<String>,
}

/// Venue-B (Polymarket) credentials
#[derive(Debug, Clone)]
pub struct PolymarketConfig {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
    pub trader_address: String,
    pub proxy_address: String,
    pub trader_private_key: String,
}

/// Full engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub predict: PredictConfig,
    pub polymarket: PolymarketConfig,
    /// Account-reply cache TTL (ACCOUNT_CACHE_MS, default 5000)
    pub account_cache: Duration,
    /// Bearer token guarding the internal HTTP surface
    pub dashboard_api_token: Option<String>,
    /// Bind address for the internal HTTP surface
    pub api_bind_addr: String,
    /// Base directory for the durable task log
    pub log_dir: String,
    pub log_level: String,
}

impl EngineConfig {
    /// Load from the environment (after `dotenv`).
    pub fn from_env() -> Result<Self> {
        let mut api_keys = vec![required("PREDICT_API_KEY")?];
        // Scan keys are numbered: PREDICT_API_KEY_SCAN, _SCAN2, _SCAN3...
        if let Some(key) = optional("PREDICT_API_KEY_SCAN") {
            api_keys.push(key);
        }
        for n in 2..=9 {
            if let Some(key) = optional(&format!("PREDICT_API_KEY_SCAN{}", n)) {
                api_keys.push(key);
            }
        }
        if let Some(key) = optional("PREDICT_API_KEY_TRADE") {
            api_keys.push(key);
        }

        let config = Self {
            predict: PredictConfig {
                api_keys,
                signer_private_key: required("PREDICT_SIGNER_PRIVATE_KEY")?,
                smart_wallet_address: required("PREDICT_SMART_WALLET_ADDRESS")?,
                api_base_url: optional("PREDICT_API_BASE_URL")
                    .unwrap_or_else(|| predict::constants::REST_BASE_URL.to_string()),
                bsc_wss_urls: required("BSC_WSS_URLS")?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            polymarket: PolymarketConfig {
                api_key: required("POLYMARKET_API_KEY")?,
                api_secret: required("POLYMARKET_API_SECRET")?,
                passphrase: required("POLYMARKET_PASSPHRASE")?,
                trader_address: required("POLYMARKET_TRADER_ADDRESS")?,
                proxy_address: required("POLYMARKET_PROXY_ADDRESS")?,
                trader_private_key: required("POLYMARKET_TRADER_PRIVATE_KEY")?,
            },
            account_cache: Duration::from_millis(
                optional("ACCOUNT_CACHE_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
            ),
            dashboard_api_token: optional("DASHBOARD_API_TOKEN"),
            api_bind_addr: optional("API_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8787".to_string()),
            log_dir: optional("DATA_LOG_DIR").unwrap_or_else(|| "data/logs".to_string()),
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        validate_private_key("PREDICT_SIGNER_PRIVATE_KEY", &self.predict.signer_private_key)?;
        validate_private_key(
            "POLYMARKET_TRADER_PRIVATE_KEY",
            &self.polymarket.trader_private_key,
        )?;
        validate_address(
            "PREDICT_SMART_WALLET_ADDRESS",
            &self.predict.smart_wallet_address,
        )?;
        validate_address("POLYMARKET_TRADER_ADDRESS", &self.polymarket.trader_address)?;
        validate_address("POLYMARKET_PROXY_ADDRESS", &self.polymarket.proxy_address)?;

        if self.predict.bsc_wss_urls.is_empty() {
            return Err(ConfigError::ValidationError(
                "BSC_WSS_URLS must contain at least one endpoint".to_string(),
            ));
        }
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    /// Log a redacted summary.
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Predict base URL: {}", self.predict.api_base_url);
        info!("  Predict API keys: {}", self.predict.api_keys.len());
        info!("  BSC WSS endpoints: {}", self.predict.bsc_wss_urls.len());
        info!("  Smart wallet: {}", self.predict.smart_wallet_address);
        info!("  Polymarket proxy: {}", self.polymarket.proxy_address);
        info!("  Account cache: {:?}", self.account_cache);
        info!("  API bind: {}", self.api_bind_addr);
        info!("  Log dir: {}", self.log_dir);
    }
}

fn validate_private_key(name: &str, key: &str) -> Result<()> {
    if !key.starts_with("0x") || key.len() != 66 {
        return Err(ConfigError::ValidationError(format!(
            "{} must be a 0x-prefixed 64-hex-character string",
            name
        )));
    }
    Ok(())
}

fn validate_address(name: &str, address: &str) -> Result<()> {
    if !address.starts_with("0x") || address.len() != 42 {
        return Err(ConfigError::ValidationError(format!(
            "{} must be a 0x-prefixed 40-hex-character address",
            name
        )));
    }
    Ok(())
}
