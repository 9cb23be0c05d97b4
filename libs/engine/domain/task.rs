//! Task model and the append-only event log entries

use super::mapping::Outcome;
use super::now_ms;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStrategy {
    Maker,
    Taker,
}

/// Task lifecycle. COMPLETED / FAILED / CANCELLED are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn apply(self, newer: TaskStatus) -> TaskStatus {
        if self.is_terminal() {
            self
        } else {
            newer
        }
    }
}

/// Price parameters; which fields are required depends on (kind, strategy)
/// and is enforced at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    /// Maker limit price on Predict (BUY+MAKER, SELL+TAKER)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predict_price: Option<f64>,
    /// Aggressive Predict ask price (BUY+TAKER, SELL+MAKER)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predict_ask_price: Option<f64>,
    /// Ceiling for the Polymarket hedge ask (BUY tasks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polymarket_max_ask: Option<f64>,
    /// Floor for the Polymarket bid (SELL tasks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polymarket_min_bid: Option<f64>,
    /// Hard ceiling on the two-leg cost (BUY+TAKER)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_total_cost: Option<f64>,
    /// Required profit margin before resuming a paused maker leg
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_profit_buffer: Option<f64>,
    /// Entry cost per share of the position being closed (SELL only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_cost: Option<f64>,
}

/// Aggregated execution counters, updated by the worker as legs fill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounters {
    pub filled_qty: f64,
    pub hedged_qty: f64,
    pub avg_predict_price: f64,
    pub avg_poly_price: f64,
    pub realized_pnl: f64,
    pub pause_count: u32,
    pub hedge_retry_count: u32,
    /// Shares flattened back on the maker venue after hedge shortfall
    pub unwound_qty: f64,
    pub unwind_loss: f64,
}

impl TaskCounters {
    /// Fold `qty` shares at `price` into the Predict running average
    pub fn record_predict_fill(&mut self, qty: f64, price: f64) {
        let total = self.filled_qty + qty;
        if total > 0.0 {
            self.avg_predict_price =
                books::round4((self.avg_predict_price * self.filled_qty + price * qty) / total);
        }
        self.filled_qty = total;
    }

    /// Fold `qty` shares at `price` into the hedge running average
    pub fn record_hedge_fill(&mut self, qty: f64, price: f64) {
        let total = self.hedged_qty + qty;
        if total > 0.0 {
            self.avg_poly_price =
                books::round4((self.avg_poly_price * self.hedged_qty + price * qty) / total);
        }
        self.hedged_qty = total;
    }
}

/// Persisted task record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub strategy: TaskStrategy,
    pub predict_market_id: String,
    pub condition_id: String,
    pub arb_side: Outcome,
    pub quantity: f64,
    pub params: TaskParams,
    pub fee_rate_bps: u64,
    /// Per-order watch timeout in seconds
    pub order_timeout_secs: u64,
    pub max_hedge_retries: u32,
    pub status: TaskStatus,
    pub counters: TaskCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    pub created_ms: u64,
    pub updated_ms: u64,
}

impl Task {
    pub fn new(
        kind: TaskKind,
        strategy: TaskStrategy,
        predict_market_id: impl Into<String>,
        condition_id: impl Into<String>,
        arb_side: Outcome,
        quantity: f64,
        params: TaskParams,
    ) -> Self {
        let created_ms = now_ms();
        Self {
            id: generate_task_id(created_ms),
            kind,
            strategy,
            predict_market_id: predict_market_id.into(),
            condition_id: condition_id.into(),
            arb_side,
            quantity,
            params,
            fee_rate_bps: 0,
            order_timeout_secs: 60,
            max_hedge_retries: 3,
            status: TaskStatus::Queued,
            counters: TaskCounters::default(),
            fail_reason: None,
            created_ms,
            updated_ms: created_ms,
        }
    }

    pub fn market_key(&self) -> String {
        format!("{}:{}", self.predict_market_id, self.condition_id)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = self.status.apply(status);
        self.updated_ms = now_ms();
    }
}

fn generate_task_id(created_ms: u64) -> String {
    use rand::Rng;
    let suffix: u16 = rand::thread_rng().gen();
    format!("t{}-{:04x}", created_ms, suffix)
}

/// Log event kinds emitted by the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventKind {
    TaskQueued,
    TaskStarted,
    OrderSubmitted,
    OrderFilled,
    OrderCancelled,
    Pause,
    Resume,
    HedgeAttempt,
    HedgeComplete,
    UnwindStart,
    UnwindComplete,
    TaskComplete,
    TaskFailed,
    TaskCancelled,
}

/// Append-only log entry. `(task_id, sequence)` is unique and gap-free
/// within a task; sequence numbers, not timestamps, drive ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: String,
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub kind: TaskEventKind,
    pub priority: String,
    pub executor_id: String,
    pub attempt_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_hash: Option<String>,
    pub payload: serde_json::Value,
}

/// Periodic two-venue book snapshot with the derived arbitrage metrics,
/// attached to the task log at decision points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub task_id: String,
    pub sequence: u64,
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predict_book: Option<books::NormalizedOrderBook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poly_book: Option<books::NormalizedOrderBook>,
    pub total_cost: f64,
    pub profit_pct: f64,
    pub valid: bool,
    pub max_depth: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_stickiness() {
        let mut task = Task::new(
            TaskKind::Buy,
            TaskStrategy::Maker,
            "pm-1",
            "0xcond",
            Outcome::Yes,
            100.0,
            TaskParams::default(),
        );
        assert_eq!(task.status, TaskStatus::Queued);

        task.set_status(TaskStatus::Running);
        task.set_status(TaskStatus::Completed);
        task.set_status(TaskStatus::Running);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_task_ids_unique() {
        let a = generate_task_id(1_700_000_000_000);
        let b = generate_task_id(1_700_000_000_000);
        // Same millisecond, random suffix keeps them distinct (whp)
        assert!(a.starts_with("t1700000000000-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_counters_running_average() {
        let mut counters = TaskCounters::default();
        counters.record_predict_fill(50.0, 0.40);
        counters.record_predict_fill(50.0, 0.50);
        assert_eq!(counters.filled_qty, 100.0);
        assert_eq!(counters.avg_predict_price, 0.45);

        counters.record_hedge_fill(30.0, 0.52);
        assert_eq!(counters.hedged_qty, 30.0);
        assert_eq!(counters.avg_poly_price, 0.52);
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = TaskEvent {
            task_id: "t1-0001".to_string(),
            sequence: 1,
            timestamp_ms: 123,
            kind: TaskEventKind::OrderSubmitted,
            priority: "normal".to_string(),
            executor_id: "exec-1".to_string(),
            attempt_id: 1,
            order_id: Some("o1".to_string()),
            order_hash: None,
            payload: serde_json::json!({"price": 0.45}),
        };

        let line = serde_json::to_string(&event).unwrap();
        let parsed: TaskEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.sequence, 1);
        assert_eq!(parsed.kind, TaskEventKind::OrderSubmitted);
        assert_eq!(parsed.payload["price"], 0.45);
    }
}
