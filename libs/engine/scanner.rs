//! Opportunity scanner
//!
//! Walks the cached books for every mapped market on each tick and turns
//! profitable dislocations into BUY tasks. A busy market is simply skipped
//! until its running task finishes.

use crate::arb::{buy_opportunity, BuyQuote};
use crate::domain::{MappingStore, MarketMapping, Outcome, Task, TaskKind, TaskParams, TaskStrategy};
use crate::sched::{QueueError, Scheduler};
use books::{round4, BookCache, Venue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub tick_interval: Duration,
    /// Required profit per share before a task is emitted
    pub min_profit: f64,
    /// Position cap per opportunity, in shares
    pub max_position: f64,
    /// Books older than this are not acted on
    pub max_book_age_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            min_profit: 0.01,
            max_position: 100.0,
            max_book_age_ms: 10_000,
        }
    }
}

pub struct Scanner {
    mappings: Arc<MappingStore>,
    cache: Arc<BookCache>,
    scheduler: Arc<Scheduler>,
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(
        mappings: Arc<MappingStore>,
        cache: Arc<BookCache>,
        scheduler: Arc<Scheduler>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            mappings,
            cache,
            scheduler,
            config,
        }
    }

    /// Evaluate both arbitrage sides of one mapping.
    fn evaluate(&self, mapping: &MarketMapping, now_ms: u64) -> Option<(Outcome, BuyQuote)> {
        let predict_book = self.cache.get(Venue::Predict, &mapping.predict_market_id)?;
        if predict_book.staleness_ms(now_ms) > self.config.max_book_age_ms {
            return None;
        }

        for arb_side in [Outcome::Yes, Outcome::No] {
            let hedge_token = mapping.hedge_token_for(arb_side);
            let Some(poly_book) = self.cache.get(Venue::Polymarket, hedge_token) else {
                continue;
            };
            if poly_book.staleness_ms(now_ms) > self.config.max_book_age_ms {
                continue;
            }

            let (maker, _taker) = buy_opportunity(
                &predict_book,
                &poly_book,
                arb_side,
                mapping.fee_rate_bps,
                self.config.max_position,
            );

            if maker.valid
                && maker.profit_per_share >= self.config.min_profit
                && maker.max_qty > 0.0
            {
                return Some((arb_side, maker));
            }
        }
        None
    }

    fn emit_task(&self, mapping: &MarketMapping, arb_side: Outcome, quote: &BuyQuote) {
        let predict_book = match self.cache.get(Venue::Predict, &mapping.predict_market_id) {
            Some(book) => book,
            None => return,
        };
        let view = match arb_side {
            Outcome::Yes => predict_book,
            Outcome::No => predict_book.inverted(),
        };
        let Some(bid) = view.best_bid() else {
            return;
        };

        let hedge_cap = round4(quote.cost - bid.price + quote.profit_per_share / 2.0);
        let mut task = Task::new(
            TaskKind::Buy,
            TaskStrategy::Maker,
            mapping.predict_market_id.clone(),
            mapping.condition_id.clone(),
            arb_side,
            quote.max_qty,
            TaskParams {
                predict_price: Some(bid.price),
                polymarket_max_ask: Some(hedge_cap),
                min_profit_buffer: Some(self.config.min_profit / 2.0),
                ..Default::default()
            },
        );
        task.fee_rate_bps = mapping.fee_rate_bps;

        match self.scheduler.submit(task) {
            Ok(id) => info!(
                "[Scanner] {} {} arb on {}: cost {} qty {} -> task {}",
                mapping.event_title,
                arb_side,
                mapping.predict_market_id,
                quote.cost,
                quote.max_qty,
                id
            ),
            Err(QueueError::MarketBusy(key)) => {
                debug!("[Scanner] {} busy, skipping", key);
            }
            Err(e) => warn!("[Scanner] Task submit failed: {}", e),
        }
    }

    /// Main loop.
    pub async fn run(self, shutdown_flag: Arc<AtomicBool>) {
        info!(
            "[Scanner] Started ({} mappings, min profit {})",
            self.mappings.len(),
            self.config.min_profit
        );

        while shutdown_flag.load(Ordering::Acquire) {
            let now_ms = crate::domain::now_ms();
            for mapping in self.mappings.all() {
                if let Some((arb_side, quote)) = self.evaluate(&mapping, now_ms) {
                    self.emit_task(&mapping, arb_side, &quote);
                }
            }
            sleep(self.config.tick_interval).await;
        }

        info!("[Scanner] Stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketMapping;
    use crate::sched::{TaskLog, TaskQueue};
    use books::{NormalizedOrderBook, PriceLevel};
    use tempfile::TempDir;

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
            fee_rate_bps: 200,
        }
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl crate::sched::TaskExecutor for NoopExecutor {
        async fn execute(&self, _ctx: &mut crate::sched::TaskContext) -> crate::sched::ExecOutcome {
            crate::sched::ExecOutcome::Completed
        }
    }

    fn scanner_with_age(cache: Arc<BookCache>, age_ms: u64) -> (TempDir, Scanner, Arc<Scheduler>) {
        let dir = TempDir::new().unwrap();
        let mappings = Arc::new(MappingStore::new());
        mappings.insert(mapping());
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(TaskQueue::new()),
            Arc::new(TaskLog::new(dir.path())),
            Arc::new(NoopExecutor),
        ));
        let scanner = Scanner::new(
            mappings,
            cache,
            Arc::clone(&scheduler),
            ScannerConfig {
                max_book_age_ms: age_ms,
                ..Default::default()
            },
        );
        (dir, scanner, scheduler)
    }

    fn scanner(cache: Arc<BookCache>) -> (TempDir, Scanner, Arc<Scheduler>) {
        scanner_with_age(cache, u64::MAX)
    }

    fn seed_books(cache: &BookCache, predict_bid: f64, poly_no_ask: f64) {
        cache.insert(NormalizedOrderBook::from_levels(
            Venue::Predict,
            "pm-1",
            "pm-1",
            1_000,
            vec![PriceLevel::new(predict_bid, 100.0)],
            vec![PriceLevel::new(round4(predict_bid + 0.02), 100.0)],
        ));
        cache.insert(NormalizedOrderBook::from_levels(
            Venue::Polymarket,
            "0xcond",
            "g-no",
            1_000,
            vec![PriceLevel::new(round4(poly_no_ask - 0.02), 80.0)],
            vec![PriceLevel::new(poly_no_ask, 80.0)],
        ));
    }

    #[test]
    fn test_scanner_detects_and_submits() {
        let cache = Arc::new(BookCache::new());
        seed_books(&cache, 0.45, 0.52);
        let (_dir, scanner, scheduler) = scanner(Arc::clone(&cache));

        let mapping = mapping();
        let found = scanner.evaluate(&mapping, 1_000).unwrap();
        assert_eq!(found.0, Outcome::Yes);
        assert_eq!(found.1.cost, 0.97);

        scanner.emit_task(&mapping, found.0, &found.1);
        assert_eq!(scheduler.queue().active_count(), 1);

        // Second emission hits MARKET_BUSY and is skipped quietly
        scanner.emit_task(&mapping, found.0, &found.1);
        assert_eq!(scheduler.queue().active_count(), 1);
    }

    #[test]
    fn test_scanner_ignores_unprofitable_books() {
        let cache = Arc::new(BookCache::new());
        seed_books(&cache, 0.49, 0.53);
        let (_dir, scanner, _scheduler) = scanner(Arc::clone(&cache));
        // 0.49 + 0.53 = 1.02: no arbitrage on either side
        assert!(scanner.evaluate(&mapping(), 1_000).is_none());
    }

    #[test]
    fn test_scanner_skips_stale_books() {
        let cache = Arc::new(BookCache::new());
        seed_books(&cache, 0.45, 0.52);

        // Books stamped at 1_000; at now=100_000 they are far too old
        let (_dir, scanner, _scheduler) = scanner_with_age(Arc::clone(&cache), 5_000);
        assert!(scanner.evaluate(&mapping(), 100_000).is_none());

        let (_dir2, scanner, _scheduler2) = scanner_with_age(cache, u64::MAX);
        assert!(scanner.evaluate(&mapping(), 100_000).is_some());
    }
}
