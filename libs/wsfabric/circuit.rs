//! REST circuit breaker
//!
//! Tracks consecutive failures per client. After `rebuild_threshold`
//! consecutive failures the caller should rebuild its connection pool;
//! after any failure the breaker opens for `cooldown` during which callers
//! serve cached values instead of re-attempting the wire.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitStats {
    pub ok: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct CircuitInner {
    stats: CircuitStats,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Per-client breaker state.
#[derive(Debug)]
pub struct CircuitBreaker {
    rebuild_threshold: u32,
    cooldown: Duration,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(rebuild_threshold: u32, cooldown: Duration) -> Self {
        Self {
            rebuild_threshold,
            cooldown,
            inner: Mutex::new(CircuitInner {
                stats: CircuitStats::default(),
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    /// Defaults from the market-data fabric: 3 failures, 60 s cooldown.
    pub fn standard() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    /// Whether callers should skip the wire and serve cached values.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        inner.open_until.map_or(false, |t| Instant::now() < t)
    }

    pub fn record_ok(&self) {
        let mut inner = self.inner.lock();
        inner.stats.ok += 1;
        inner.consecutive_failures = 0;
        inner.open_until = None;
    }

    /// Record a failure. Returns `true` when the consecutive-failure count
    /// has reached the rebuild threshold and the caller should recreate
    /// its connection pool.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.stats.failed += 1;
        inner.consecutive_failures += 1;
        inner.open_until = Some(Instant::now() + self.cooldown);
        inner.consecutive_failures >= self.rebuild_threshold
    }

    pub fn stats(&self) -> CircuitStats {
        self.inner.lock().stats
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}
