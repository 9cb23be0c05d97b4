//! Order watcher
//!
//! Races the venue's low-latency event channel against a bounded REST
//! poll. An event only triggers an immediate poll: the REST readout is
//! always the source of truth for `{status, filled}`, so a lost or bogus
//! event can delay detection but never corrupt state.

use super::{MakerVenue, OrderReadout, PlacedOrder, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Outcome of one watch round
#[derive(Debug, Clone)]
pub struct WatchResult {
    pub readout: OrderReadout,
    pub timed_out: bool,
}

/// Poll cadence while an order rests
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Watch an order until terminal status, a fill-quantity change, or the
/// deadline. Returns the latest REST readout either way.
pub async fn watch_order<V: MakerVenue + ?Sized>(
    venue: &V,
    order: &PlacedOrder,
    baseline_filled: f64,
    timeout: Duration,
) -> Result<WatchResult> {
    let deadline = Instant::now() + timeout;
    let mut readout = venue.status(order).await?;

    loop {
        if readout.status.is_terminal() || readout.filled > baseline_filled {
            return Ok(WatchResult {
                readout,
                timed_out: false,
            });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(WatchResult {
                readout,
                timed_out: true,
            });
        }

        tokio::select! {
            hinted = venue.wait_fill_hint(order, remaining.min(POLL_INTERVAL * 4)) => {
                if hinted {
                    debug!("[Watcher] Fill event for {}, confirming via REST", order.order_id);
                }
            }
            _ = sleep(POLL_INTERVAL.min(remaining)) => {}
        }

        readout = venue.status(order).await?;
    }
}

/// Final reconciliation read: always trust REST before acting on a
/// partial fill that straddled a timeout.
pub async fn reconcile<V: MakerVenue + ?Sized>(
    venue: &V,
    order: &PlacedOrder,
) -> Result<OrderReadout> {
    let readout = venue.status(order).await?;
    if !readout.status.is_terminal() {
        debug!(
            "[Watcher] Order {} still {} at reconcile",
            order.order_id, readout.status
        );
    }
    Ok(readout)
}
