//! Durable task log
//!
//! Layout per task:
//!   `<base>/tasks/<taskId>/events.jsonl`      append-only, one event/line
//!   `<base>/tasks/<taskId>/orderbooks.jsonl`  append-only snapshots
//!   `<base>/tasks/<taskId>/summary.json`      written once, on terminal
//!
//! Sequences are assigned here, monotonically from 1 and gap-free per
//! task. Appends are idempotent on `(taskId, sequence)`: replaying an
//! already-persisted sequence is a no-op.

use crate::domain::{now_ms, BookSnapshot, Task, TaskEvent, TaskEventKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

#[derive(Default)]
struct TaskCursor {
    /// Highest sequence already persisted to events.jsonl
    last_event_seq: u64,
    last_snapshot_seq: u64,
    summary_written: bool,
}

/// Append-only persistence for task events and book snapshots
pub struct TaskLog {
    base_dir: PathBuf,
    cursors: Mutex<HashMap<String, TaskCursor>>,
}

impl TaskLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.base_dir.join("tasks").join(task_id)
    }

    fn ensure_dir(&self, task_id: &str) -> Result<PathBuf> {
        let dir = self.task_dir(task_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Recover the persisted cursor for a task by scanning its files.
    /// Replayed appends below the cursor become no-ops.
    fn cursor_for(&self, task_id: &str) -> TaskCursor {
        let dir = self.task_dir(task_id);
        TaskCursor {
            last_event_seq: last_sequence(&dir.join("events.jsonl")),
            last_snapshot_seq: last_sequence(&dir.join("orderbooks.jsonl")),
            summary_written: dir.join("summary.json").exists(),
        }
    }

    fn with_cursor<R>(&self, task_id: &str, f: impl FnOnce(&mut TaskCursor) -> R) -> R {
        let mut cursors = self.cursors.lock();
        if !cursors.contains_key(task_id) {
            let cursor = self.cursor_for(task_id);
            cursors.insert(task_id.to_string(), cursor);
        }
        f(cursors.get_mut(task_id).expect("cursor just inserted"))
    }

    /// Next gap-free event sequence for a task
    pub fn next_sequence(&self, task_id: &str) -> u64 {
        self.with_cursor(task_id, |c| c.last_event_seq + 1)
    }

    /// Append an event. Returns false when `(task, sequence)` was already
    /// persisted (idempotent replay).
    pub fn append_event(&self, event: &TaskEvent) -> Result<bool> {
        let already = self.with_cursor(&event.task_id, |c| event.sequence <= c.last_event_seq);
        if already {
            debug!(
                "[TaskLog] Duplicate event ({}, {}) skipped",
                event.task_id, event.sequence
            );
            return Ok(false);
        }

        let dir = self.ensure_dir(&event.task_id)?;
        append_line(&dir.join("events.jsonl"), event)?;

        self.with_cursor(&event.task_id, |c| {
            c.last_event_seq = c.last_event_seq.max(event.sequence);
        });
        Ok(true)
    }

    /// Build and append the next event in one step.
    #[allow(clippy::too_many_arguments)]
    pub fn emit(
        &self,
        task_id: &str,
        kind: TaskEventKind,
        executor_id: &str,
        attempt_id: u32,
        order_id: Option<String>,
        order_hash: Option<String>,
        payload: serde_json::Value,
    ) -> Result<TaskEvent> {
        let event = TaskEvent {
            task_id: task_id.to_string(),
            sequence: self.next_sequence(task_id),
            timestamp_ms: now_ms(),
            kind,
            priority: "normal".to_string(),
            executor_id: executor_id.to_string(),
            attempt_id,
            order_id,
            order_hash,
            payload,
        };
        self.append_event(&event)?;
        Ok(event)
    }

    /// Append a book snapshot (own sequence space).
    pub fn append_snapshot(&self, snapshot: &BookSnapshot) -> Result<bool> {
        let already =
            self.with_cursor(&snapshot.task_id, |c| snapshot.sequence <= c.last_snapshot_seq);
        if already {
            return Ok(false);
        }

        let dir = self.ensure_dir(&snapshot.task_id)?;
        append_line(&dir.join("orderbooks.jsonl"), snapshot)?;

        self.with_cursor(&snapshot.task_id, |c| {
            c.last_snapshot_seq = c.last_snapshot_seq.max(snapshot.sequence);
        });
        Ok(true)
    }

    pub fn next_snapshot_sequence(&self, task_id: &str) -> u64 {
        self.with_cursor(task_id, |c| c.last_snapshot_seq + 1)
    }

    /// Write `summary.json` once, when the task reaches a terminal status.
    pub fn write_summary(&self, task: &Task) -> Result<bool> {
        let already = self.with_cursor(&task.id, |c| c.summary_written);
        if already {
            return Ok(false);
        }

        let dir = self.ensure_dir(&task.id)?;
        let summary = serde_json::json!({
            "task": task,
            "eventCount": self.with_cursor(&task.id, |c| c.last_event_seq),
            "finishedMs": now_ms(),
        });
        let path = dir.join("summary.json");
        let mut file = fs::File::create(&path)?;
        file.write_all(serde_json::to_string_pretty(&summary)?.as_bytes())?;
        file.sync_all()?;

        self.with_cursor(&task.id, |c| c.summary_written = true);
        Ok(true)
    }

    /// Read back the persisted events for a task, in file order.
    pub fn read_events(&self, task_id: &str) -> Result<Vec<TaskEvent>> {
        let path = self.task_dir(task_id).join("events.jsonl");
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(path)?);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!("[TaskLog] Skipping corrupt event line: {}", e),
            }
        }
        Ok(events)
    }
}

fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Highest `"sequence"` value in a JSONL file; 0 for missing/empty files.
fn last_sequence(path: &Path) -> u64 {
    let Ok(file) = fs::File::open(path) else {
        return 0;
    };
    let reader = BufReader::new(file);
    let mut last = 0u64;
    for line in reader.lines().map_while(|l| l.ok()) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
            if let Some(seq) = value.get("sequence").and_then(|s| s.as_u64()) {
                last = last.max(seq);
            }
        }
    }
    last
}
