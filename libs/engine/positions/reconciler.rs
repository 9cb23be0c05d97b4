//! Position reconciler
//!
//! Periodically reads positions from both venues. Replies are cached for a
//! short TTL with single-flight dedup; when a venue read fails the last
//! good list is served with its original `as_of_ms` so callers always see
//! how stale the data is.

use crate::domain::{now_ms, MappingStore, Outcome, Position};
use async_trait::async_trait;
use books::Venue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Default reconciliation cadence
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Venue position feed seam (REST clients behind it in production)
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn predict_positions(&self) -> anyhow::Result<Vec<Position>>;
    async fn poly_positions(&self) -> anyhow::Result<Vec<Position>>;
}

/// Both venues' positions with their fetch timestamps
#[derive(Debug, Clone, Default)]
pub struct PositionsSnapshot {
    pub predict: Vec<Position>,
    pub poly: Vec<Position>,
    pub predict_as_of_ms: u64,
    pub poly_as_of_ms: u64,
}

#[derive(Default)]
struct CacheState {
    snapshot: PositionsSnapshot,
    fetched_at_ms: u64,
}

/// TTL-cached, single-flight position reader
pub struct PositionReconciler {
    source: Arc<dyn PositionSource>,
    ttl: Duration,
    state: Mutex<CacheState>,
    /// Collapses concurrent refreshes into one venue round-trip
    flight: tokio::sync::Mutex<()>,
}

impl PositionReconciler {
    pub fn new(source: Arc<dyn PositionSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            state: Mutex::new(CacheState::default()),
            flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot: cached when fresh, refreshed otherwise. Venue
    /// failures keep the previous list and its original `as_of_ms`.
    pub async fn snapshot(&self) -> PositionsSnapshot {
        {
            let state = self.state.lock();
            if now_ms().saturating_sub(state.fetched_at_ms) < self.ttl.as_millis() as u64 {
                return state.snapshot.clone();
            }
        }

        let _guard = self.flight.lock().await;
        // A concurrent caller may have refreshed while we waited
        {
            let state = self.state.lock();
            if now_ms().saturating_sub(state.fetched_at_ms) < self.ttl.as_millis() as u64 {
                return state.snapshot.clone();
            }
        }

        let mut snapshot = self.state.lock().snapshot.clone();
        let fetch_ms = now_ms();

        match self.source.predict_positions().await {
            Ok(positions) => {
                snapshot.predict = positions;
                snapshot.predict_as_of_ms = fetch_ms;
            }
            Err(e) => warn!(
                "[Reconciler] Predict positions failed, serving cache from {}: {}",
                snapshot.predict_as_of_ms, e
            ),
        }

        match self.source.poly_positions().await {
            Ok(positions) => {
                snapshot.poly = positions;
                snapshot.poly_as_of_ms = fetch_ms;
            }
            Err(e) => warn!(
                "[Reconciler] Polymarket positions failed, serving cache from {}: {}",
                snapshot.poly_as_of_ms, e
            ),
        }

        let mut state = self.state.lock();
        state.snapshot = snapshot.clone();
        state.fetched_at_ms = fetch_ms;
        snapshot
    }
}

/// Background reconciliation loop (default every 30 s)
pub fn spawn_reconciliation_task(
    reconciler: Arc<PositionReconciler>,
    shutdown_flag: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "[Reconciler] Task started (interval: {}s)",
            interval.as_secs()
        );
        while shutdown_flag.load(Ordering::Acquire) {
            let snapshot = reconciler.snapshot().await;
            debug!(
                "[Reconciler] {} predict / {} polymarket positions",
                snapshot.predict.len(),
                snapshot.poly.len()
            );
            sleep(interval).await;
        }
        info!("[Reconciler] Task shutting down");
    })
}

/// Production feed: Predict GraphQL positions + Polymarket Data API,
/// normalized through the mapping registry.
pub struct LivePositionSource {
    predict_rest: Arc<predict::PredictRestClient>,
    data_client: Arc<polymarket::DataClient>,
    proxy_address: ethers::types::Address,
    mappings: Arc<MappingStore>,
}

impl LivePositionSource {
    pub fn new(
        predict_rest: Arc<predict::PredictRestClient>,
        data_client: Arc<polymarket::DataClient>,
        proxy_address: ethers::types::Address,
        mappings: Arc<MappingStore>,
    ) -> Self {
        Self {
            predict_rest,
            data_client,
            proxy_address,
            mappings,
        }
    }
}

fn parse_outcome_name(name: &str) -> Option<Outcome> {
    match name.to_uppercase().as_str() {
        "YES" => Some(Outcome::Yes),
        "NO" => Some(Outcome::No),
        _ => None,
    }
}

#[async_trait]
impl PositionSource for LivePositionSource {
    async fn predict_positions(&self) -> anyhow::Result<Vec<Position>> {
        let raw = self.predict_rest.get_positions().await?;
        let as_of_ms = now_ms();

        Ok(raw
            .into_iter()
            .filter(|p| p.quantity.abs() > 1e-6)
            .filter_map(|p| {
                let mapping = self.mappings.by_predict_market(&p.market_id);
                // Outcome from the token id through the mapping; the
                // outcome name is only a fallback, never a YES default.
                let outcome = mapping
                    .as_ref()
                    .and_then(|m| m.outcome_from_predict_token(&p.token_id))
                    .or_else(|| parse_outcome_name(&p.outcome_name))?;

                // Multi-outcome markets display as "<event> - <outcome>"
                let event_title = if parse_outcome_name(&p.outcome_name).is_none()
                    && !p.outcome_name.is_empty()
                {
                    format!("{} - {}", p.event_title, p.outcome_name)
                } else {
                    p.event_title.clone()
                };

                Some(Position {
                    venue: Venue::Predict,
                    market_id: p.market_id,
                    token_id: p.token_id,
                    event_title,
                    outcome,
                    shares: p.quantity,
                    avg_entry_price: p.avg_entry_price,
                    mark_value: p.mark_value,
                    as_of_ms,
                })
            })
            .collect())
    }

    async fn poly_positions(&self) -> anyhow::Result<Vec<Position>> {
        let raw = self.data_client.get_positions(self.proxy_address).await?;
        let as_of_ms = now_ms();

        Ok(raw
            .into_iter()
            .filter(|p| p.size.abs() > 1e-6)
            .filter_map(|p| {
                let outcome = parse_outcome_name(&p.outcome).or_else(|| {
                    self.mappings
                        .by_condition(&p.condition_id)
                        .and_then(|m| m.outcome_from_poly_token(&p.asset))
                })?;

                Some(Position {
                    venue: Venue::Polymarket,
                    market_id: p.condition_id,
                    token_id: p.asset,
                    event_title: p.title,
                    outcome,
                    shares: p.size,
                    avg_entry_price: p.avg_price,
                    mark_value: p.size * p.cur_price,
                    as_of_ms,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct FlakySource {
        calls: AtomicU32,
        fail_after: u32,
    }

    #[async_trait]
    impl PositionSource for FlakySource {
        async fn predict_positions(&self) -> anyhow::Result<Vec<Position>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_after {
                anyhow::bail!("venue down");
            }
            Ok(vec![Position {
                venue: Venue::Predict,
                market_id: "pm-1".to_string(),
                token_id: "p-yes".to_string(),
                event_title: "Will it rain?".to_string(),
                outcome: Outcome::Yes,
                shares: 10.0 + call as f64,
                avg_entry_price: 0.45,
                mark_value: 4.5,
                as_of_ms: now_ms(),
            }])
        }

        async fn poly_positions(&self) -> anyhow::Result<Vec<Position>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_snapshot_cached_within_ttl() {
        let source = Arc::new(FlakySource {
            calls: AtomicU32::new(0),
            fail_after: u32::MAX,
        });
        let reconciler = PositionReconciler::new(source.clone(), Duration::from_secs(60));

        let first = reconciler.snapshot().await;
        let second = reconciler.snapshot().await;
        assert_eq!(first.predict[0].shares, second.predict[0].shares);
        // Only one venue round-trip happened
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_with_old_as_of() {
        let source = Arc::new(FlakySource {
            calls: AtomicU32::new(0),
            fail_after: 1,
        });
        let reconciler = PositionReconciler::new(source, Duration::from_millis(1));

        let first = reconciler.snapshot().await;
        assert_eq!(first.predict.len(), 1);
        let first_as_of = first.predict_as_of_ms;

        sleep(Duration::from_millis(10)).await;

        // Second refresh fails; the stale list and timestamp survive
        let second = reconciler.snapshot().await;
        assert_eq!(second.predict.len(), 1);
        assert_eq!(second.predict[0].shares, first.predict[0].shares);
        assert_eq!(second.predict_as_of_ms, first_as_of);
    }
}
