use crony_runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("Invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The scheduler no longer accepts registrations.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// A metric could not be created, registered or encoded.
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Reasons an execution is aborted before any reporting happens.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("can't start workload: {0}")]
    Start(#[source] RuntimeError),

    #[error("can't wait for the end of the execution: {0}")]
    Wait(#[source] RuntimeError),
}
