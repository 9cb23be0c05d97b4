//! Domain model shared across the engine

pub mod mapping;
pub mod order;
pub mod position;
pub mod task;

pub use mapping::{MappingStore, MarketMapping, Outcome};
pub use order::{OpenOrder, OrderStatus, Side};
pub use position::{MatchedPair, Position, UnmatchedReason};
pub use task::{
    BookSnapshot, Task, TaskCounters, TaskEvent, TaskEventKind, TaskKind, TaskParams, TaskStatus,
    TaskStrategy,
};

/// Wall-clock UTC milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}
