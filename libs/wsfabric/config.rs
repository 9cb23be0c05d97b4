//! Connection configuration: reconnect policy and endpoint rotation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Exponential-backoff reconnection policy
///
/// The delay before attempt `n` (1-indexed) is
/// `base * multiplier^(n-1)`, capped at `max_delay`. Once `max_attempts`
/// is exceeded the client stops reconnecting.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: usize,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-indexed).
    ///
    /// Returns `None` once the attempt budget is exhausted.
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi((attempt - 1) as i32);
        let millis = (self.base.as_millis() as f64 * factor) as u64;
        Some(Duration::from_millis(millis).min(self.max_delay))
    }

    pub fn should_reconnect(&self, attempt: usize) -> bool {
        attempt <= self.max_attempts
    }
}

/// Round-robin endpoint list
///
/// Between reconnection attempts the next URL in the list is tried, so a
/// single bad endpoint does not pin the client down.
#[derive(Debug)]
pub struct EndpointRotation {
    urls: Vec<String>,
    cursor: AtomicUsize,
}

impl EndpointRotation {
    pub fn new(urls: Vec<String>) -> Self {
        assert!(!urls.is_empty(), "endpoint rotation requires at least one URL");
        Self {
            urls,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn single(url: impl Into<String>) -> Self {
        Self::new(vec![url.into()])
    }

    /// Current endpoint without advancing.
    pub fn current(&self) -> &str {
        &self.urls[self.cursor.load(Ordering::Relaxed) % self.urls.len()]
    }

    /// Advance to the next endpoint and return it.
    pub fn advance(&self) -> &str {
        let next = self.cursor.fetch_add(1, Ordering::Relaxed) + 1;
        &self.urls[next % self.urls.len()]
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Full client configuration
#[derive(Debug)]
pub struct WsConfig {
    pub endpoints: EndpointRotation,
    pub reconnect: ReconnectPolicy,
    /// Periodic heartbeat frame (interval, payload). `None` disables the
    /// active heartbeat; passive pings are always answered by the handler.
    pub heartbeat: Option<(Duration, String)>,
}

impl WsConfig {
    pub fn new(endpoints: EndpointRotation) -> Self {
        Self {
            endpoints,
            reconnect: ReconnectPolicy::default(),
            heartbeat: None,
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, payload: impl Into<String>) -> Self {
        self.heartbeat = Some((interval, payload.into()));
        self
    }
}
