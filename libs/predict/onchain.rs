//! On-chain `OrderFilled` watcher
//!
//! Subscribes to the four exchange contracts over a rotating list of BSC
//! WSS endpoints, with two topic filters (maker = wallet, taker = wallet).
//! Matched fills are cached per order hash for a bounded TTL so a watcher
//! attached after a fast settlement still observes the event; REST remains
//! the source of truth for filled quantities.

use crate::constants::{all_exchange_addresses, order_filled_topic};
use ethers::providers::{Middleware, Provider, StreamExt, Ws};
use ethers::types::{Address, Filter, Log, H256};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wsfabric::{EndpointRotation, ReconnectPolicy};

/// Retention window for matched fills
const FILL_CACHE_TTL: Duration = Duration::from_secs(60);

/// Matched on-chain fill
#[derive(Debug, Clone)]
pub struct OnchainFill {
    pub order_hash: H256,
    pub maker: Address,
    pub taker: Address,
    pub block_number: Option<u64>,
    pub tx_hash: Option<H256>,
}

struct WatcherState {
    wallet: Address,
    recent: Mutex<HashMap<H256, (Instant, OnchainFill)>>,
    waiters: Mutex<HashMap<H256, Vec<oneshot::Sender<OnchainFill>>>>,
}

impl WatcherState {
    fn record_fill(&self, fill: OnchainFill) {
        let mut recent = self.recent.lock();
        recent.retain(|_, (at, _)| at.elapsed() < FILL_CACHE_TTL);
        recent.insert(fill.order_hash, (Instant::now(), fill.clone()));
        drop(recent);

        if let Some(senders) = self.waiters.lock().remove(&fill.order_hash) {
            for sender in senders {
                let _ = sender.send(fill.clone());
            }
        }
    }

    /// Decode an OrderFilled log; returns None unless our wallet is the
    /// maker or the taker.
    fn match_log(&self, log: &Log) -> Option<OnchainFill> {
        if log.topics.len() < 4 {
            return None;
        }
        let order_hash = log.topics[1];
        let maker = Address::from_slice(&log.topics[2].as_bytes()[12..]);
        let taker = Address::from_slice(&log.topics[3].as_bytes()[12..]);

        if maker != self.wallet && taker != self.wallet {
            return None;
        }

        Some(OnchainFill {
            order_hash,
            maker,
            taker,
            block_number: log.block_number.map(|b| b.as_u64()),
            tx_hash: log.transaction_hash,
        })
    }
}

/// Watcher over the exchange contracts' settlement events
pub struct OrderFilledWatcher {
    endpoints: Arc<EndpointRotation>,
    state: Arc<WatcherState>,
    should_run: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl OrderFilledWatcher {
    pub fn new(wss_urls: Vec<String>, wallet: Address) -> Self {
        Self {
            endpoints: Arc::new(EndpointRotation::new(wss_urls)),
            state: Arc::new(WatcherState {
                wallet,
                recent: Mutex::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
            }),
            should_run: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    /// Spawn the subscription loop.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let endpoints = Arc::clone(&self.endpoints);
        let state = Arc::clone(&self.state);
        let should_run = Arc::clone(&self.should_run);

        self.task = Some(tokio::spawn(async move {
            run_watcher(endpoints, state, should_run).await;
        }));
    }

    /// Signal the loop to stop without waiting for the task (for shared
    /// handles at process shutdown).
    pub fn signal_stop(&self) {
        self.should_run.store(false, Ordering::Release);
    }

    /// Stop the loop and terminate the socket.
    pub async fn stop(&mut self) {
        self.should_run.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("[OnchainWatcher] Stopped");
    }

    /// Wait until an OrderFilled for `order_hash` is observed, checking the
    /// recent-fill cache first. Returns `None` on timeout; the waiter slot
    /// is unregistered.
    pub async fn watch_order(&self, order_hash: H256, timeout: Duration) -> Option<OnchainFill> {
        {
            let mut recent = self.state.recent.lock();
            recent.retain(|_, (at, _)| at.elapsed() < FILL_CACHE_TTL);
            if let Some((_, fill)) = recent.get(&order_hash) {
                return Some(fill.clone());
            }
        }

        let (tx, rx) = oneshot::channel();
        self.state
            .waiters
            .lock()
            .entry(order_hash)
            .or_default()
            .push(tx);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(fill)) => Some(fill),
            _ => {
                if let Some(senders) = self.state.waiters.lock().get_mut(&order_hash) {
                    senders.retain(|s| !s.is_closed());
                }
                None
            }
        }
    }
}

async fn run_watcher(
    endpoints: Arc<EndpointRotation>,
    state: Arc<WatcherState>,
    should_run: Arc<AtomicBool>,
) {
    let policy = ReconnectPolicy::default();
    let mut attempt: usize = 0;

    loop {
        if !should_run.load(Ordering::Acquire) {
            break;
        }

        let url = if attempt == 0 {
            endpoints.current().to_string()
        } else {
            endpoints.advance().to_string()
        };

        match subscribe_once(&url, &state, &should_run).await {
            Ok(()) => {
                // Clean exit only happens on shutdown
                break;
            }
            Err(e) => {
                warn!("[OnchainWatcher] Subscription on {} ended: {}", url, e);
            }
        }

        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            warn!("[OnchainWatcher] Reconnection attempts exhausted");
            break;
        };
        debug!("[OnchainWatcher] Reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }

    debug!("[OnchainWatcher] Task exiting");
}

async fn subscribe_once(
    url: &str,
    state: &Arc<WatcherState>,
    should_run: &Arc<AtomicBool>,
) -> Result<(), String> {
    info!("[OnchainWatcher] Connecting to {}", url);
    let provider = Provider::<Ws>::connect(url)
        .await
        .map_err(|e| e.to_string())?;

    // Two filters: our wallet as maker (topic2) and as taker (topic3)
    let wallet_topic = H256::from(state.wallet);
    let base = Filter::new()
        .address(all_exchange_addresses())
        .topic0(order_filled_topic());
    let maker_filter = base.clone().topic2(wallet_topic);
    let taker_filter = base.topic3(wallet_topic);

    let maker_stream = provider
        .subscribe_logs(&maker_filter)
        .await
        .map_err(|e| e.to_string())?;
    let taker_stream = provider
        .subscribe_logs(&taker_filter)
        .await
        .map_err(|e| e.to_string())?;

    info!("[OnchainWatcher] Subscribed to OrderFilled on 4 exchange contracts");

    let mut merged = futures::stream::select(maker_stream, taker_stream);
    while let Some(log) = merged.next().await {
        if !should_run.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(fill) = state.match_log(&log) {
            debug!(
                "[OnchainWatcher] OrderFilled {} (maker={:?}, taker={:?})",
                fill.order_hash, fill.maker, fill.taker
            );
            state.record_fill(fill);
        }
    }

    if should_run.load(Ordering::Acquire) {
        Err("log stream ended".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Address {
        "0x1111111111111111111111111111111111111111".parse().unwrap()
    }

    fn test_state() -> Arc<WatcherState> {
        Arc::new(WatcherState {
            wallet: wallet(),
            recent: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    fn fill_log(order_hash: H256, maker: Address, taker: Address) -> Log {
        Log {
            address: all_exchange_addresses()[0],
            topics: vec![
                order_filled_topic(),
                order_hash,
                H256::from(maker),
                H256::from(taker),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_match_log_requires_our_wallet() {
        let state = test_state();
        let hash = H256::from_low_u64_be(7);
        let other: Address = "0x2222222222222222222222222222222222222222".parse().unwrap();

        assert!(state.match_log(&fill_log(hash, other, other)).is_none());
        assert!(state.match_log(&fill_log(hash, wallet(), other)).is_some());
        assert!(state.match_log(&fill_log(hash, other, wallet())).is_some());
    }

    #[test]
    fn test_match_log_short_topics_dropped() {
        let state = test_state();
        let log = Log {
            topics: vec![order_filled_topic()],
            ..Default::default()
        };
        assert!(state.match_log(&log).is_none());
    }

    #[tokio::test]
    async fn test_watch_sees_cached_fill() {
        let watcher = OrderFilledWatcher::new(vec!["wss://unused".to_string()], wallet());
        let hash = H256::from_low_u64_be(9);
        watcher.state.record_fill(OnchainFill {
            order_hash: hash,
            maker: wallet(),
            taker: Address::zero(),
            block_number: Some(100),
            tx_hash: None,
        });

        let fill = watcher
            .watch_order(hash, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(fill.order_hash, hash);
    }

    #[tokio::test]
    async fn test_watch_resolves_on_later_fill() {
        let watcher = OrderFilledWatcher::new(vec!["wss://unused".to_string()], wallet());
        let hash = H256::from_low_u64_be(11);
        let state = Arc::clone(&watcher.state);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            state.record_fill(OnchainFill {
                order_hash: hash,
                maker: wallet(),
                taker: Address::zero(),
                block_number: None,
                tx_hash: None,
            });
        });

        let fill = watcher.watch_order(hash, Duration::from_secs(2)).await;
        assert!(fill.is_some());
    }

    #[tokio::test]
    async fn test_watch_times_out() {
        let watcher = OrderFilledWatcher::new(vec!["wss://unused".to_string()], wallet());
        let fill = watcher
            .watch_order(H256::from_low_u64_be(13), Duration::from_millis(30))
            .await;
        assert!(fill.is_none());
    }
}
