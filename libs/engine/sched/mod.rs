//! Task scheduler and durable log

pub mod log;
pub mod queue;
pub mod runner;
pub mod validate;

pub use log::TaskLog;
pub use queue::{QueueError, TaskQueue};
pub use runner::{ExecOutcome, Scheduler, TaskContext, TaskExecutor};
pub use validate::{validate_task, ValidationError};
