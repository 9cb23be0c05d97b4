//! Two-leg hedged execution
//!
//! BUY: rest a limit order on Predict; on every fill delta fire a
//! marketable IOC hedge on Polymarket, bounded by the task's price limit,
//! with retries and a final unwind of any unhedged residue. SELL closes a
//! matched pair with the legs reversed. The hedge-side book is monitored
//! while the maker leg rests; a drift beyond the limit pauses the task
//! until the market returns or the task is cancelled.

use super::watcher::{reconcile, watch_order};
use super::{ExecError, HedgeVenue, MakerVenue, PlacedOrder};
use crate::domain::{
    MappingStore, MarketMapping, Outcome, Side, TaskEventKind, TaskKind, TaskStatus, TaskStrategy,
};
use crate::sched::{ExecOutcome, TaskContext, TaskExecutor};
use async_trait::async_trait;
use books::num::{snap_quantity, snap_to_tick};
use books::{round4, NormalizedOrderBook, EPSILON};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Quantity granularity guard
const QTY_EPS: f64 = 1e-6;

/// Consecutive transient failures tolerated before the task fails
const MAX_TRANSIENT_STRIKES: u32 = 5;

/// One watch round; drift is re-checked between rounds
const WATCH_ROUND: Duration = Duration::from_secs(1);

/// Poll cadence while paused
const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Derived per-task execution parameters
struct LegPlan {
    maker_side: Side,
    maker_outcome: Outcome,
    maker_price: f64,
    /// Ceiling on the hedge ask (BUY) or floor on the hedge bid (SELL)
    hedge_limit: f64,
    hedge_token: String,
    min_profit_buffer: Option<f64>,
    settle_timeout: Duration,
}

impl LegPlan {
    fn from_task(ctx: &TaskContext, mapping: &MarketMapping) -> Result<LegPlan, ExecError> {
        let task = &ctx.task;
        let p = &task.params;

        let (maker_side, maker_price, hedge_limit) = match (task.kind, task.strategy) {
            (TaskKind::Buy, TaskStrategy::Maker) => {
                (Side::Buy, p.predict_price, p.polymarket_max_ask)
            }
            (TaskKind::Buy, TaskStrategy::Taker) => {
                (Side::Buy, p.predict_ask_price, p.polymarket_max_ask)
            }
            (TaskKind::Sell, TaskStrategy::Taker) => {
                (Side::Sell, p.predict_price, p.polymarket_min_bid)
            }
            (TaskKind::Sell, TaskStrategy::Maker) => {
                (Side::Sell, p.predict_ask_price, p.polymarket_min_bid)
            }
        };

        let maker_price = maker_price
            .ok_or_else(|| ExecError::Fatal("missing maker price parameter".to_string()))?;
        let hedge_limit = hedge_limit
            .ok_or_else(|| ExecError::Fatal("missing hedge limit parameter".to_string()))?;

        Ok(LegPlan {
            maker_side,
            maker_outcome: task.arb_side,
            maker_price: snap_to_tick(maker_price, mapping.tick_size),
            hedge_limit,
            hedge_token: mapping.hedge_token_for(task.arb_side).to_string(),
            min_profit_buffer: p.min_profit_buffer,
            settle_timeout: Duration::from_secs(task.order_timeout_secs.max(5)),
        })
    }

    /// The hedge leg trades the same direction as the maker leg.
    fn hedge_side(&self) -> Side {
        self.maker_side
    }
}

/// Two-leg execution engine
pub struct TwoLegExecutor {
    maker: Arc<dyn MakerVenue>,
    hedge: Arc<dyn HedgeVenue>,
    mappings: Arc<MappingStore>,
}

impl TwoLegExecutor {
    pub fn new(
        maker: Arc<dyn MakerVenue>,
        hedge: Arc<dyn HedgeVenue>,
        mappings: Arc<MappingStore>,
    ) -> Self {
        Self {
            maker,
            hedge,
            mappings,
        }
    }

    /// Hedge-side price level for the plan, if the book supports it.
    fn hedge_level(&self, plan: &LegPlan) -> Option<books::PriceLevel> {
        let book = self.hedge.book(&plan.hedge_token)?;
        match plan.hedge_side() {
            Side::Buy => book.best_ask(),
            Side::Sell => book.best_bid(),
        }
    }

    /// Whether the hedge book still supports execution within the limit.
    fn hedge_in_band(&self, plan: &LegPlan) -> bool {
        let Some(level) = self.hedge_level(plan) else {
            return false;
        };
        match plan.hedge_side() {
            Side::Buy => {
                let within = level.price <= plan.hedge_limit + EPSILON;
                match plan.min_profit_buffer {
                    Some(buffer) => {
                        within && plan.maker_price + level.price <= 1.0 - buffer + EPSILON
                    }
                    None => within,
                }
            }
            Side::Sell => level.price + EPSILON >= plan.hedge_limit,
        }
    }

    fn attach_snapshot(&self, ctx: &TaskContext, mapping: &MarketMapping, plan: &LegPlan) {
        let predict_book = self.maker.book(mapping);
        let poly_book = self.hedge.book(&plan.hedge_token);

        let (total_cost, valid, max_depth) = match &poly_book {
            Some(poly) => {
                let level = match plan.hedge_side() {
                    Side::Buy => poly.best_ask(),
                    Side::Sell => poly.best_bid(),
                };
                match level {
                    Some(level) => {
                        let cost = round4(plan.maker_price + level.price);
                        (cost, self.hedge_in_band(plan), level.size)
                    }
                    None => (0.0, false, 0.0),
                }
            }
            None => (0.0, false, 0.0),
        };

        let profit_pct = if total_cost > 0.0 {
            round4((1.0 - total_cost) * 100.0)
        } else {
            0.0
        };
        ctx.snapshot(predict_book, poly_book, total_cost, profit_pct, valid, max_depth);
    }

    /// Cancel the resting maker order, reconcile its final fill through
    /// REST and hedge anything that slipped in.
    async fn retire_order(
        &self,
        ctx: &mut TaskContext,
        mapping: &MarketMapping,
        plan: &LegPlan,
        order: PlacedOrder,
        counted: f64,
    ) -> Result<(), ExecError> {
        if let Err(e) = self.maker.cancel(&order).await {
            warn!("[TwoLeg] Cancel of {} failed: {}", order.order_id, e);
        }

        let readout = reconcile(self.maker.as_ref(), &order).await?;
        let delta = readout.filled - counted;
        if delta > QTY_EPS {
            ctx.task.counters.record_predict_fill(delta, plan.maker_price);
            ctx.emit(
                TaskEventKind::OrderFilled,
                Some(order.order_id.clone()),
                order.order_hash.clone(),
                serde_json::json!({"filled": readout.filled, "delta": delta, "atCancel": true}),
            );
            self.hedge_fill(ctx, mapping, plan, delta).await?;
        }

        ctx.emit(
            TaskEventKind::OrderCancelled,
            Some(order.order_id),
            order.order_hash,
            serde_json::json!({"filled": readout.filled}),
        );
        Ok(())
    }

    /// Wait for the market to come back inside the band. Returns false
    /// when the task was cancelled while paused.
    async fn pause_until_band(&self, ctx: &mut TaskContext, plan: &LegPlan) -> bool {
        ctx.task.counters.pause_count += 1;
        ctx.emit(
            TaskEventKind::Pause,
            None,
            None,
            serde_json::json!({"pauseCount": ctx.task.counters.pause_count}),
        );
        ctx.set_transient_status(TaskStatus::Paused);

        loop {
            if ctx.is_cancelled() {
                return false;
            }
            if self.hedge_in_band(plan) {
                ctx.emit(TaskEventKind::Resume, None, None, serde_json::json!({}));
                ctx.set_transient_status(TaskStatus::Running);
                return true;
            }
            sleep(PAUSE_POLL).await;
        }
    }

    /// Fire IOC hedges for `quantity` shares, retrying with refreshed
    /// books up to the task budget, then unwinding the shortfall.
    async fn hedge_fill(
        &self,
        ctx: &mut TaskContext,
        mapping: &MarketMapping,
        plan: &LegPlan,
        quantity: f64,
    ) -> Result<(), ExecError> {
        let mut remaining = snap_quantity(quantity);
        if remaining <= QTY_EPS {
            return Ok(());
        }
        let mut attempt: u32 = 0;

        while remaining > QTY_EPS {
            let level = self.hedge_level(plan);
            let price = match (plan.hedge_side(), level) {
                (Side::Buy, Some(level)) if level.price <= plan.hedge_limit + EPSILON => {
                    level.price.min(plan.hedge_limit)
                }
                (Side::Sell, Some(level)) if level.price + EPSILON >= plan.hedge_limit => {
                    level.price
                }
                _ => {
                    // Book moved outside the band; burn a retry and refresh
                    attempt += 1;
                    ctx.task.counters.hedge_retry_count += 1;
                    if attempt > ctx.task.max_hedge_retries {
                        return self.unwind(ctx, mapping, plan, remaining).await;
                    }
                    sleep(Duration::from_millis(200)).await;
                    continue;
                }
            };

            attempt += 1;
            ctx.emit(
                TaskEventKind::HedgeAttempt,
                None,
                None,
                serde_json::json!({
                    "attempt": attempt,
                    "price": price,
                    "quantity": remaining,
                    "token": plan.hedge_token,
                }),
            );

            let filled = match self
                .hedge
                .place_ioc(
                    mapping,
                    &plan.hedge_token,
                    plan.hedge_side(),
                    price,
                    snap_quantity(remaining).max(0.01),
                )
                .await
            {
                Ok(placed) => match self.hedge.settle(&placed, plan.settle_timeout).await {
                    Ok(readout) => readout.filled,
                    Err(ExecError::Transient(e)) => {
                        warn!("[TwoLeg] Hedge settle failed: {}", e);
                        0.0
                    }
                    Err(fatal) => return Err(fatal),
                },
                Err(ExecError::Transient(e)) => {
                    warn!("[TwoLeg] Hedge placement failed: {}", e);
                    0.0
                }
                Err(fatal) => return Err(fatal),
            };

            if filled > QTY_EPS {
                ctx.task.counters.record_hedge_fill(filled, price);
                remaining = round4(remaining - filled).max(0.0);
            }

            if remaining > QTY_EPS {
                ctx.task.counters.hedge_retry_count += 1;
                if attempt > ctx.task.max_hedge_retries {
                    return self.unwind(ctx, mapping, plan, remaining).await;
                }
                sleep(Duration::from_millis(200)).await;
            }
        }

        ctx.emit(
            TaskEventKind::HedgeComplete,
            None,
            None,
            serde_json::json!({"hedgedQty": ctx.task.counters.hedged_qty}),
        );
        Ok(())
    }

    /// Sell the unhedged residue back into the maker venue (or buy it back
    /// for SELL tasks) and record the realized loss.
    async fn unwind(
        &self,
        ctx: &mut TaskContext,
        mapping: &MarketMapping,
        plan: &LegPlan,
        shortfall: f64,
    ) -> Result<(), ExecError> {
        ctx.emit(
            TaskEventKind::UnwindStart,
            None,
            None,
            serde_json::json!({"shortfall": shortfall}),
        );

        let book = self
            .maker
            .book(mapping)
            .ok_or_else(|| ExecError::Transient("no maker book for unwind".to_string()))?;
        let view = match plan.maker_outcome {
            Outcome::Yes => book,
            Outcome::No => book.inverted(),
        };

        let (unwind_side, level) = match plan.maker_side {
            Side::Buy => (Side::Sell, view.best_bid()),
            Side::Sell => (Side::Buy, view.best_ask()),
        };
        let level =
            level.ok_or_else(|| ExecError::Transient("empty maker book for unwind".to_string()))?;

        let placed = self
            .maker
            .place_limit(
                mapping,
                plan.maker_outcome,
                unwind_side,
                level.price,
                snap_quantity(shortfall).max(0.01),
            )
            .await?;

        let watch = watch_order(self.maker.as_ref(), &placed, 0.0, plan.settle_timeout).await?;
        let salvaged = watch.readout.filled;
        let loss = round4((plan.maker_price - level.price).abs() * shortfall);

        let counters = &mut ctx.task.counters;
        counters.unwound_qty = round4(counters.unwound_qty + shortfall);
        counters.unwind_loss = round4(counters.unwind_loss + loss);

        ctx.emit(
            TaskEventKind::UnwindComplete,
            Some(placed.order_id),
            placed.order_hash,
            serde_json::json!({
                "salvaged": salvaged,
                "salvagePrice": level.price,
                "loss": loss,
            }),
        );
        Ok(())
    }

    /// Main per-task loop.
    async fn run_leg(
        &self,
        ctx: &mut TaskContext,
        mapping: &MarketMapping,
    ) -> Result<bool, ExecError> {
        let plan = LegPlan::from_task(ctx, mapping)?;
        let target = ctx.task.quantity;
        let mut open: Option<(PlacedOrder, f64)> = None;
        let mut transient_strikes: u32 = 0;

        loop {
            if ctx.task.counters.filled_qty + QTY_EPS >= target {
                break;
            }

            if ctx.is_cancelled() {
                if let Some((order, counted)) = open.take() {
                    self.retire_order(ctx, mapping, &plan, order, counted).await?;
                }
                return Ok(false);
            }

            // Drift gate: the hedge book must stay inside the band while
            // the maker leg rests.
            if !self.hedge_in_band(&plan) {
                if let Some((order, counted)) = open.take() {
                    self.retire_order(ctx, mapping, &plan, order, counted).await?;
                }
                self.attach_snapshot(ctx, mapping, &plan);
                if !self.pause_until_band(ctx, &plan).await {
                    return Ok(false);
                }
                continue;
            }

            if open.is_none() {
                let remaining = snap_quantity(target - ctx.task.counters.filled_qty).max(0.01);
                self.attach_snapshot(ctx, mapping, &plan);

                match self
                    .maker
                    .place_limit(
                        mapping,
                        plan.maker_outcome,
                        plan.maker_side,
                        plan.maker_price,
                        remaining,
                    )
                    .await
                {
                    Ok(placed) => {
                        transient_strikes = 0;
                        ctx.emit(
                            TaskEventKind::OrderSubmitted,
                            Some(placed.order_id.clone()),
                            placed.order_hash.clone(),
                            serde_json::json!({
                                "side": plan.maker_side,
                                "outcome": plan.maker_outcome,
                                "price": plan.maker_price,
                                "quantity": remaining,
                            }),
                        );
                        open = Some((placed, 0.0));
                    }
                    Err(ExecError::Transient(e)) => {
                        transient_strikes += 1;
                        warn!(
                            "[TwoLeg] Maker placement failed ({}/{}): {}",
                            transient_strikes, MAX_TRANSIENT_STRIKES, e
                        );
                        if transient_strikes >= MAX_TRANSIENT_STRIKES {
                            return Err(ExecError::Transient(e));
                        }
                        sleep(Duration::from_millis(250 * transient_strikes as u64)).await;
                        continue;
                    }
                    Err(fatal) => return Err(fatal),
                }
            }

            let (order, baseline) = {
                let (order, counted) = open.as_ref().expect("maker order just placed");
                (order.clone(), *counted)
            };

            match watch_order(self.maker.as_ref(), &order, baseline, WATCH_ROUND).await {
                Ok(watch) => {
                    transient_strikes = 0;
                    let delta = watch.readout.filled - baseline;
                    if delta > QTY_EPS {
                        if let Some((_, counted)) = open.as_mut() {
                            *counted = watch.readout.filled;
                        }
                        ctx.task.counters.record_predict_fill(delta, plan.maker_price);
                        ctx.emit(
                            TaskEventKind::OrderFilled,
                            Some(order.order_id.clone()),
                            order.order_hash.clone(),
                            serde_json::json!({
                                "filled": watch.readout.filled,
                                "delta": delta,
                                "status": watch.readout.status.to_string(),
                            }),
                        );
                        self.hedge_fill(ctx, mapping, &plan, delta).await?;
                    }

                    if watch.readout.status.is_terminal() {
                        debug!(
                            "[TwoLeg] Maker order {} terminal: {}",
                            order.order_id, watch.readout.status
                        );
                        open = None;
                    }
                    // Non-terminal watch rounds loop back through the
                    // drift gate before watching again.
                }
                Err(ExecError::Transient(e)) => {
                    transient_strikes += 1;
                    warn!(
                        "[TwoLeg] Watch failed ({}/{}): {}",
                        transient_strikes, MAX_TRANSIENT_STRIKES, e
                    );
                    if transient_strikes >= MAX_TRANSIENT_STRIKES {
                        return Err(ExecError::Transient(e));
                    }
                    sleep(Duration::from_millis(250 * transient_strikes as u64)).await;
                }
                Err(fatal) => {
                    if let Some((order, counted)) = open.take() {
                        let _ = self.retire_order(ctx, mapping, &plan, order, counted).await;
                    }
                    return Err(fatal);
                }
            }
        }

        // Flatten any hedge shortfall left by the final partial; unwound
        // shares no longer need a hedge.
        let counters = &ctx.task.counters;
        let hedge_gap = counters.filled_qty - counters.hedged_qty - counters.unwound_qty;
        if hedge_gap > QTY_EPS {
            self.hedge_fill(ctx, mapping, &plan, hedge_gap).await?;
        }

        self.record_realized_pnl(ctx);
        self.attach_snapshot(ctx, mapping, &plan);
        Ok(true)
    }

    fn record_realized_pnl(&self, ctx: &mut TaskContext) {
        let counters = &mut ctx.task.counters;
        let per_share = match ctx.task.kind {
            // Locked settlement profit on a completed pair
            TaskKind::Buy => 1.0 - (counters.avg_predict_price + counters.avg_poly_price),
            // Close proceeds versus the recorded entry cost
            TaskKind::Sell => {
                let entry = ctx.task.params.entry_cost.unwrap_or(0.0);
                (counters.avg_predict_price + counters.avg_poly_price) - entry
            }
        };
        counters.realized_pnl = round4(per_share * counters.hedged_qty - counters.unwind_loss);
    }
}

#[async_trait]
impl TaskExecutor for TwoLegExecutor {
    async fn execute(&self, ctx: &mut TaskContext) -> ExecOutcome {
        let Some(mapping) = self.mappings.get(&ctx.task.market_key()) else {
            return ExecOutcome::Failed(format!(
                "no market mapping for {}",
                ctx.task.market_key()
            ));
        };

        info!(
            "[TwoLeg] Executing {} {:?}/{:?} qty {} on {}",
            ctx.task.id, ctx.task.kind, ctx.task.strategy, ctx.task.quantity, mapping.event_title
        );

        match self.run_leg(ctx, &mapping).await {
            Ok(true) => ExecOutcome::Completed,
            Ok(false) => ExecOutcome::Cancelled,
            Err(ExecError::Fatal(reason)) => ExecOutcome::Failed(reason),
            Err(ExecError::Transient(reason)) => {
                ExecOutcome::Failed(format!("retry budget exhausted: {}", reason))
            }
        }
    }
}
