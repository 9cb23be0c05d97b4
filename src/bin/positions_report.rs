//! One-shot positions report
//!
//! Reads positions from both venues, matches them through the mapping
//! registry and prints the delta-neutral pairs with their close metrics.

use anyhow::{Context, Result};
use arb_engine::config::EngineConfig;
use arb_engine::domain::{MappingStore, MarketMapping};
use arb_engine::positions::{
    close_opportunities, match_positions, LivePositionSource, PositionReconciler,
};
use arb_engine::logging;
use books::BookCache;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = EngineConfig::from_env().context("loading configuration")?;
    logging::init_tracing_with_level(&config.log_level);

    let mappings = Arc::new(MappingStore::new());
    let path = std::env::var("MAPPINGS_FILE").unwrap_or_else(|_| "data/mappings.json".to_string());
    if let Ok(raw) = std::fs::read_to_string(&path) {
        for mapping in serde_json::from_str::<Vec<MarketMapping>>(&raw)? {
            mappings.insert(mapping);
        }
    }
    info!("{} mappings loaded", mappings.len());

    let predict_auth = Arc::new(predict::JwtAuth::new(
        config.predict.api_base_url.clone(),
        &config.predict.signer_private_key,
        config.predict.smart_wallet_address.parse()?,
    )?);
    let predict_rest = Arc::new(predict::PredictRestClient::with_base_url(
        config.predict.api_base_url.clone(),
        predict_auth,
        predict::ApiKeyPool::new(config.predict.api_keys.clone()),
    ));
    let data_client = Arc::new(polymarket::DataClient::new());

    let reconciler = PositionReconciler::new(
        Arc::new(LivePositionSource::new(
            predict_rest,
            data_client,
            config.polymarket.proxy_address.parse()?,
            Arc::clone(&mappings),
        )),
        config.account_cache,
    );

    let snapshot = reconciler.snapshot().await;
    println!(
        "Predict positions ({}, as of {}):",
        snapshot.predict.len(),
        snapshot.predict_as_of_ms
    );
    for p in &snapshot.predict {
        println!(
            "  {} {} {:.2} @ {:.4} ({})",
            p.outcome, p.market_id, p.shares, p.avg_entry_price, p.event_title
        );
    }

    println!(
        "Polymarket positions ({}, as of {}):",
        snapshot.poly.len(),
        snapshot.poly_as_of_ms
    );
    for p in &snapshot.poly {
        println!(
            "  {} {} {:.2} @ {:.4} ({})",
            p.outcome, p.market_id, p.shares, p.avg_entry_price, p.event_title
        );
    }

    let report = match_positions(&mappings, &snapshot.predict, &snapshot.poly);
    println!("\nMatched pairs: {}", report.pairs.len());
    for pair in &report.pairs {
        println!(
            "  {} {}x{} matched {:.2} @ entry {:.4}",
            pair.event_title,
            pair.predict_outcome,
            pair.poly_outcome,
            pair.matched_shares,
            pair.entry_cost_per_share
        );
    }
    println!("Unmatched entries: {}", report.unmatched.len());
    for u in &report.unmatched {
        println!(
            "  {} {} {:.2} shares: {:?}",
            u.position.venue, u.position.market_id, u.shares, u.reason
        );
    }

    // Books are empty in this one-shot run, so quotes only appear when a
    // cache warm-up is added; keep the wiring in place.
    let cache = BookCache::new();
    let opportunities = close_opportunities(&mappings, &cache, &report.pairs);
    println!("\nClose opportunities priced: {}", opportunities.len());

    Ok(())
}
