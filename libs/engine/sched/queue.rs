//! Task queue
//!
//! FIFO per market key `(venue pair, marketId)`, at most one non-terminal
//! task per key. A second task for a busy market is rejected with
//! `MARKET_BUSY`. Create/cancel are serialized behind one lock.

use crate::domain::{Task, TaskStatus};
use crate::sched::validate::{validate_task, ValidationError};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("MARKET_BUSY: market {0} already has an active task")]
    MarketBusy(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Default)]
struct QueueInner {
    /// All tasks ever enqueued this run, by id
    tasks: HashMap<String, Task>,
    /// FIFO arrival order of task ids
    arrival: Vec<String>,
}

/// Serialized task store
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and admit a task. Rejected when its market key already has
    /// a queued/running/paused task.
    pub fn enqueue(&self, task: Task) -> Result<String, QueueError> {
        validate_task(&task)?;

        let mut inner = self.inner.lock();
        let key = task.market_key();
        let busy = inner
            .tasks
            .values()
            .any(|t| t.market_key() == key && !t.status.is_terminal());
        if busy {
            return Err(QueueError::MarketBusy(key));
        }

        let id = task.id.clone();
        inner.arrival.push(id.clone());
        inner.tasks.insert(id.clone(), task);
        Ok(id)
    }

    /// Oldest QUEUED task, marked RUNNING and handed to the caller.
    pub fn claim_next(&self) -> Option<Task> {
        let mut inner = self.inner.lock();
        let id = inner
            .arrival
            .iter()
            .find(|id| {
                inner
                    .tasks
                    .get(*id)
                    .map_or(false, |t| t.status == TaskStatus::Queued)
            })?
            .clone();

        let task = inner.tasks.get_mut(&id)?;
        task.set_status(TaskStatus::Running);
        Some(task.clone())
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().tasks.get(task_id).cloned()
    }

    /// Write back the worker's view of a task.
    pub fn update(&self, task: &Task) {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.tasks.get_mut(&task.id) {
            let mut updated = task.clone();
            // Terminal statuses recorded earlier stay sticky
            updated.status = existing.status.apply(task.status);
            *existing = updated;
        }
    }

    /// Move a QUEUED task to CANCELLED. Running tasks are cancelled through
    /// their worker's cancel handle, not here.
    pub fn cancel_queued(&self, task_id: &str) -> Result<bool, QueueError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::UnknownTask(task_id.to_string()))?;

        if task.status == TaskStatus::Queued {
            task.set_status(TaskStatus::Cancelled);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn all_tasks(&self) -> Vec<Task> {
        let inner = self.inner.lock();
        inner
            .arrival
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Outcome, TaskKind, TaskParams, TaskStrategy};

    fn buy_task(market: &str) -> Task {
        Task::new(
            TaskKind::Buy,
            TaskStrategy::Maker,
            market,
            "0xcond",
            Outcome::Yes,
            100.0,
            TaskParams {
                predict_price: Some(0.45),
                polymarket_max_ask: Some(0.55),
                min_profit_buffer: Some(0.01),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_enqueue_and_claim_fifo() {
        let queue = TaskQueue::new();
        let first = queue.enqueue(buy_task("pm-1")).unwrap();
        let second = queue.enqueue(buy_task("pm-2")).unwrap();

        assert_eq!(queue.claim_next().unwrap().id, first);
        assert_eq!(queue.claim_next().unwrap().id, second);
        assert!(queue.claim_next().is_none());
    }

    #[test]
    fn test_busy_market_rejected() {
        let queue = TaskQueue::new();
        queue.enqueue(buy_task("pm-1")).unwrap();
        let result = queue.enqueue(buy_task("pm-1"));
        assert!(matches!(result, Err(QueueError::MarketBusy(_))));
        // A different market is fine
        assert!(queue.enqueue(buy_task("pm-2")).is_ok());
    }

    #[test]
    fn test_market_frees_after_terminal() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(buy_task("pm-1")).unwrap();

        let mut task = queue.claim_next().unwrap();
        task.set_status(TaskStatus::Completed);
        queue.update(&task);

        assert!(queue.enqueue(buy_task("pm-1")).is_ok());
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_invalid_task_rejected() {
        let queue = TaskQueue::new();
        let mut task = buy_task("pm-1");
        task.params.min_profit_buffer = None;
        assert!(matches!(
            queue.enqueue(task),
            Err(QueueError::Validation(ValidationError::MissingField(
                "minProfitBuffer"
            )))
        ));
    }

    #[test]
    fn test_cancel_queued() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(buy_task("pm-1")).unwrap();
        assert!(queue.cancel_queued(&id).unwrap());
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Cancelled);
        // Cancelled task frees the market
        assert!(queue.enqueue(buy_task("pm-1")).is_ok());
        // Cancelling a non-queued task is a no-op
        assert!(!queue.cancel_queued(&id).unwrap());
    }

    #[test]
    fn test_terminal_status_sticky_through_update() {
        let queue = TaskQueue::new();
        let id = queue.enqueue(buy_task("pm-1")).unwrap();
        let mut task = queue.claim_next().unwrap();

        task.set_status(TaskStatus::Failed);
        queue.update(&task);

        // A later stale RUNNING write-back cannot revive it
        let mut stale = queue.get(&id).unwrap();
        stale.status = TaskStatus::Running;
        queue.update(&stale);
        assert_eq!(queue.get(&id).unwrap().status, TaskStatus::Failed);
    }
}
