//! Scheduler: claims queued tasks and drives one worker per task
//!
//! Workers run concurrently across markets; the queue guarantees a single
//! active task per market key. Cancellation propagates through an explicit
//! per-task cancel handle checked at every suspension point of the
//! executor.

use crate::domain::{now_ms, BookSnapshot, Task, TaskEventKind, TaskStatus};
use crate::sched::log::TaskLog;
use crate::sched::queue::{QueueError, TaskQueue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker verdict for a task
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Mutable execution context handed to the executor
pub struct TaskContext {
    pub task: Task,
    pub executor_id: String,
    pub attempt_id: u32,
    log: Arc<TaskLog>,
    queue: Arc<TaskQueue>,
    cancel: Arc<AtomicBool>,
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Append an event and persist the task counters in one step.
    pub fn emit(
        &mut self,
        kind: TaskEventKind,
        order_id: Option<String>,
        order_hash: Option<String>,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.log.emit(
            &self.task.id,
            kind,
            &self.executor_id,
            self.attempt_id,
            order_id,
            order_hash,
            payload,
        ) {
            error!("[Scheduler] Event append failed for {}: {}", self.task.id, e);
        }
        self.task.updated_ms = now_ms();
        self.queue.update(&self.task);
    }

    /// Attach a two-venue book snapshot at a decision point.
    pub fn snapshot(
        &self,
        predict_book: Option<books::NormalizedOrderBook>,
        poly_book: Option<books::NormalizedOrderBook>,
        total_cost: f64,
        profit_pct: f64,
        valid: bool,
        max_depth: f64,
    ) {
        let snapshot = BookSnapshot {
            task_id: self.task.id.clone(),
            sequence: self.log.next_snapshot_sequence(&self.task.id),
            timestamp_ms: now_ms(),
            predict_book,
            poly_book,
            total_cost,
            profit_pct,
            valid,
            max_depth,
        };
        if let Err(e) = self.log.append_snapshot(&snapshot) {
            error!("[Scheduler] Snapshot append failed for {}: {}", self.task.id, e);
        }
    }

    /// Mark the task paused/resumed in the store so readers see it.
    pub fn set_transient_status(&mut self, status: TaskStatus) {
        self.task.set_status(status);
        self.queue.update(&self.task);
    }
}

/// Strategy seam: the two-leg execution engine implements this.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: &mut TaskContext) -> ExecOutcome;
}

/// Claims queued tasks and runs them to terminal status
pub struct Scheduler {
    queue: Arc<TaskQueue>,
    log: Arc<TaskLog>,
    executor: Arc<dyn TaskExecutor>,
    cancels: Mutex<HashMap<String, Arc<AtomicBool>>>,
    executor_id: String,
}

impl Scheduler {
    pub fn new(queue: Arc<TaskQueue>, log: Arc<TaskLog>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            queue,
            log,
            executor,
            cancels: Mutex::new(HashMap::new()),
            executor_id: format!("exec-{}", std::process::id()),
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn log(&self) -> &Arc<TaskLog> {
        &self.log
    }

    /// Validate and admit a task; the TASK_QUEUED event is its first log
    /// entry.
    pub fn submit(&self, task: Task) -> Result<String, QueueError> {
        let task_id = self.queue.enqueue(task.clone())?;
        let _ = self.log.emit(
            &task_id,
            TaskEventKind::TaskQueued,
            &self.executor_id,
            0,
            None,
            None,
            serde_json::json!({
                "kind": task.kind,
                "strategy": task.strategy,
                "quantity": task.quantity,
                "market": task.market_key(),
            }),
        );
        info!("[Scheduler] Task {} queued for {}", task_id, task.market_key());
        Ok(task_id)
    }

    /// Cancel a task: queued tasks terminate immediately, running tasks
    /// through their worker's cancel handle.
    pub fn cancel(&self, task_id: &str) -> Result<(), QueueError> {
        if self.queue.cancel_queued(task_id)? {
            if let Some(task) = self.queue.get(task_id) {
                let _ = self.log.emit(
                    task_id,
                    TaskEventKind::TaskCancelled,
                    &self.executor_id,
                    0,
                    None,
                    None,
                    serde_json::json!({"reason": "cancelled while queued"}),
                );
                let _ = self.log.write_summary(&task);
            }
            return Ok(());
        }

        if let Some(flag) = self.cancels.lock().get(task_id) {
            flag.store(true, Ordering::Release);
            info!("[Scheduler] Cancel requested for running task {}", task_id);
        }
        Ok(())
    }

    /// Main loop: claim and spawn workers until shutdown.
    pub async fn run(self: Arc<Self>, shutdown_flag: Arc<AtomicBool>) {
        info!("[Scheduler] Started");
        while shutdown_flag.load(Ordering::Acquire) {
            match self.queue.claim_next() {
                Some(task) => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.run_task(task).await;
                    });
                }
                None => sleep(Duration::from_millis(200)).await,
            }
        }
        info!("[Scheduler] Stopped");
    }

    /// Drive one task to terminal status.
    pub async fn run_task(&self, task: Task) {
        let task_id = task.id.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.lock().insert(task_id.clone(), Arc::clone(&cancel));

        let mut ctx = TaskContext {
            task,
            executor_id: self.executor_id.clone(),
            attempt_id: 1,
            log: Arc::clone(&self.log),
            queue: Arc::clone(&self.queue),
            cancel,
        };

        ctx.emit(TaskEventKind::TaskStarted, None, None, serde_json::json!({}));

        let outcome = self.executor.execute(&mut ctx).await;

        let (status, kind, payload) = match &outcome {
            ExecOutcome::Completed => (
                TaskStatus::Completed,
                TaskEventKind::TaskComplete,
                serde_json::json!({"counters": ctx.task.counters}),
            ),
            ExecOutcome::Failed(reason) => {
                warn!("[Scheduler] Task {} failed: {}", task_id, reason);
                ctx.task.fail_reason = Some(reason.clone());
                (
                    TaskStatus::Failed,
                    TaskEventKind::TaskFailed,
                    serde_json::json!({"reason": reason}),
                )
            }
            ExecOutcome::Cancelled => (
                TaskStatus::Cancelled,
                TaskEventKind::TaskCancelled,
                serde_json::json!({"counters": ctx.task.counters}),
            ),
        };

        ctx.task.set_status(status);
        ctx.emit(kind, None, None, payload);
        if let Err(e) = self.log.write_summary(&ctx.task) {
            error!("[Scheduler] Summary write failed for {}: {}", task_id, e);
        }

        self.cancels.lock().remove(&task_id);
        info!("[Scheduler] Task {} finished: {:?}", task_id, outcome);
    }
}
