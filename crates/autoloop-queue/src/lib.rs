//! DAG-scheduled task queue: the unit of executable work the
//! Orchestrator hands to the Executor.

mod queue;
mod scheduler;
mod task;

pub use queue::TaskQueue;
pub use scheduler::{SchedulerError, TaskProgress, TaskScheduler};
pub use task::{Task, TaskState};
