//! Arbitrage engine
//!
//! Ties the two venue clients together: normalized market mappings, the
//! depth/arbitrage calculators, the two-leg execution state machine, the
//! position reconciliation and close-opportunity engine, and the task
//! scheduler with its durable JSONL log.

pub mod api;
pub mod arb;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod exec;
pub mod logging;
pub mod positions;
pub mod scanner;
pub mod sched;
pub mod shutdown;

pub use config::EngineConfig;
pub use domain::{
    MarketMapping, MatchedPair, OpenOrder, Outcome, Position, Side, Task, TaskEvent, TaskKind,
    TaskStatus, TaskStrategy,
};
pub use sched::{Scheduler, TaskLog, TaskQueue};
pub use shutdown::ShutdownManager;
