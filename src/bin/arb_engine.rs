//! Arbitrage engine entry point
//!
//! Wires both venue clients, the book cache, the scanner, the scheduler
//! and the internal API together, then runs until Ctrl+C.

use anyhow::{Context, Result};
use arb_engine::config::EngineConfig;
use arb_engine::domain::{MappingStore, MarketMapping};
use arb_engine::exec::{PolymarketHedgeVenue, PredictMakerVenue, TwoLegExecutor};
use arb_engine::positions::{
    spawn_reconciliation_task, LivePositionSource, PositionReconciler, RECONCILE_INTERVAL,
};
use arb_engine::scanner::{Scanner, ScannerConfig};
use arb_engine::sched::{Scheduler, TaskLog, TaskQueue};
use arb_engine::{api, logging, ShutdownManager};
use books::{AssetMetadata, BookCache, Venue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = EngineConfig::from_env().context("loading configuration")?;
    logging::init_tracing_with_level(&config.log_level);
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    // Shared state
    let cache = Arc::new(BookCache::new());
    let mappings = Arc::new(MappingStore::new());
    load_mappings(&mappings);

    // Venue-B: auth, REST, WebSockets
    let poly_credentials = polymarket::ApiCredentials {
        key: config.polymarket.api_key.clone(),
        secret: config.polymarket.api_secret.clone(),
        passphrase: config.polymarket.passphrase.clone(),
    };
    let poly_auth = Arc::new(
        polymarket::PolymarketAuth::new(
            &config.polymarket.trader_private_key,
            config
                .polymarket
                .proxy_address
                .parse()
                .context("parsing POLYMARKET_PROXY_ADDRESS")?,
            poly_credentials.clone(),
        )
        .context("building Polymarket auth")?,
    );
    let clob = Arc::new(polymarket::ClobClient::new(Arc::clone(&poly_auth)));
    let data_client = Arc::new(polymarket::DataClient::new());

    let mut market_ws = polymarket::MarketWs::new(Arc::clone(&cache));
    market_ws.connect();
    let mut user_ws = polymarket::UserWs::new(poly_credentials);
    user_ws.connect();
    let user_ws = Arc::new(user_ws);

    // Venue-A: auth, REST, orderbook WS, on-chain watcher
    let smart_wallet = config
        .predict
        .smart_wallet_address
        .parse()
        .context("parsing PREDICT_SMART_WALLET_ADDRESS")?;
    let predict_auth = Arc::new(
        predict::JwtAuth::new(
            config.predict.api_base_url.clone(),
            &config.predict.signer_private_key,
            smart_wallet,
        )
        .context("building Predict auth")?,
    );
    let predict_rest = Arc::new(predict::PredictRestClient::with_base_url(
        config.predict.api_base_url.clone(),
        Arc::clone(&predict_auth),
        predict::ApiKeyPool::new(config.predict.api_keys.clone()),
    ));

    let mut predict_ws = predict::PredictWs::new(Arc::clone(&cache));
    match predict_auth.token(arb_engine::domain::now_ms()).await {
        Ok(jwt) => predict_ws.enable_wallet_events(jwt),
        Err(e) => warn!("JWT handshake failed, wallet events disabled: {}", e),
    }
    predict_ws.connect();

    let mut watcher =
        predict::OrderFilledWatcher::new(config.predict.bsc_wss_urls.clone(), smart_wallet);
    watcher.start();
    let watcher = Arc::new(watcher);

    // Subscribe everything we have a mapping for and warm metadata
    subscribe_mappings(&mappings, &market_ws, &predict_ws);
    warm_metadata(&mappings, &cache, &clob, &predict_rest).await;

    // Execution + scheduling
    let maker_venue = Arc::new(PredictMakerVenue::new(
        Arc::clone(&predict_rest),
        Arc::clone(&watcher),
        Arc::clone(&cache),
    ));
    let hedge_venue = Arc::new(PolymarketHedgeVenue::new(
        Arc::clone(&clob),
        Arc::clone(&user_ws),
        Arc::clone(&cache),
    ));
    let executor = Arc::new(TwoLegExecutor::new(
        maker_venue,
        hedge_venue,
        Arc::clone(&mappings),
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(TaskQueue::new()),
        Arc::new(TaskLog::new(config.log_dir.clone())),
        executor,
    ));

    // Positions
    let reconciler = Arc::new(PositionReconciler::new(
        Arc::new(LivePositionSource::new(
            Arc::clone(&predict_rest),
            Arc::clone(&data_client),
            poly_auth.proxy_address(),
            Arc::clone(&mappings),
        )),
        config.account_cache,
    ));
    let reconciler_handle = spawn_reconciliation_task(
        Arc::clone(&reconciler),
        shutdown.flag(),
        RECONCILE_INTERVAL,
    );

    // Scanner
    let scanner = Scanner::new(
        Arc::clone(&mappings),
        Arc::clone(&cache),
        Arc::clone(&scheduler),
        ScannerConfig::default(),
    );
    let scanner_handle = tokio::spawn(scanner.run(shutdown.flag()));

    // Scheduler loop
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown.flag()));

    // Internal API
    let api_state = api::ApiState {
        scheduler: Arc::clone(&scheduler),
        reconciler: Arc::clone(&reconciler),
        mappings: Arc::clone(&mappings),
        cache: Arc::clone(&cache),
        bearer_token: config.dashboard_api_token.clone(),
    };
    let bind_addr = config.api_bind_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, &bind_addr).await {
            warn!("API server exited: {}", e);
        }
    });

    info!("Engine running with {} market mappings", mappings.len());

    // Park until Ctrl+C
    while shutdown.is_running() {
        shutdown.interruptible_sleep(Duration::from_secs(1)).await;
    }

    info!("Shutting down components...");
    let _ = scanner_handle.await;
    let _ = scheduler_handle.await;
    let _ = reconciler_handle.await;
    market_ws.disconnect(true).await;
    predict_ws.disconnect(true).await;
    watcher.signal_stop();
    info!("Engine stopped");
    Ok(())
}

/// Load market mappings from the JSON file named by MAPPINGS_FILE
/// (default `data/mappings.json`).
fn load_mappings(store: &MappingStore) {
    let path = std::env::var("MAPPINGS_FILE").unwrap_or_else(|_| "data/mappings.json".to_string());
    match std::fs::read_to_string(&path) {
        Ok(raw) => match serde_json::from_str::<Vec<MarketMapping>>(&raw) {
            Ok(mappings) => {
                for mapping in mappings {
                    store.insert(mapping);
                }
                info!("Loaded {} mappings from {}", store.len(), path);
            }
            Err(e) => warn!("Failed to parse {}: {}", path, e),
        },
        Err(_) => warn!("No mapping file at {}; engine starts idle", path),
    }
}

fn subscribe_mappings(
    mappings: &MappingStore,
    market_ws: &polymarket::MarketWs,
    predict_ws: &predict::PredictWs,
) {
    let all = mappings.all();
    let poly_tokens: Vec<String> = all
        .iter()
        .flat_map(|m| [m.poly_yes_token_id.clone(), m.poly_no_token_id.clone()])
        .collect();
    let predict_markets: Vec<String> =
        all.iter().map(|m| m.predict_market_id.clone()).collect();

    market_ws.subscribe(&poly_tokens);
    predict_ws.subscribe(&predict_markets);
}

/// WS payloads carry no min-order-size / tick-size; warm those once per
/// asset from the REST clients.
async fn warm_metadata(
    mappings: &MappingStore,
    cache: &BookCache,
    clob: &polymarket::ClobClient,
    predict_rest: &predict::PredictRestClient,
) {
    for mapping in mappings.all() {
        for token in [&mapping.poly_yes_token_id, &mapping.poly_no_token_id] {
            if cache.has_metadata(Venue::Polymarket, token) {
                continue;
            }
            match clob.get_tick_size(token).await {
                Ok(tick_size) => cache.set_metadata(
                    Venue::Polymarket,
                    token,
                    AssetMetadata {
                        min_order_size: 5.0,
                        tick_size,
                    },
                ),
                Err(e) => warn!("Metadata warm failed for {}: {}", token, e),
            }
        }

        if !cache.has_metadata(Venue::Predict, &mapping.predict_market_id) {
            match predict_rest.get_market(&mapping.predict_market_id).await {
                Ok(market) => cache.set_metadata(
                    Venue::Predict,
                    &mapping.predict_market_id,
                    AssetMetadata {
                        min_order_size: market.min_order_size.unwrap_or(1.0),
                        tick_size: market.tick_size.unwrap_or(mapping.tick_size),
                    },
                ),
                Err(e) => warn!(
                    "Metadata warm failed for {}: {}",
                    mapping.predict_market_id, e
                ),
            }
        }
    }
}
