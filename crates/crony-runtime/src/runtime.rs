use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crony_core::Workload;

use crate::{
    error::Result,
    types::{EventStream, LogStream, WorkloadFilter},
};

/// Common interface implemented by every workload runtime.
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// the event watcher and every concurrently running execution.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Start the workload. Returns once the runtime accepted the request.
    async fn start(&self, workload: &Workload) -> Result<()>;

    /// Block until the workload stops and return its exit code.
    async fn wait_for_completion(&self, workload: &Workload) -> Result<i64>;

    /// Output produced by the workload since `since`, as tagged frames.
    async fn fetch_output(&self, workload: &Workload, since: DateTime<Utc>) -> Result<LogStream>;

    /// Every workload that carries a schedule, optionally narrowed to one identity.
    async fn list_schedulable(&self, filter: &WorkloadFilter) -> Result<Vec<Workload>>;

    /// Subscribe to created/destroyed notifications. The stream ends when the
    /// underlying transport closes; callers decide whether to re-subscribe.
    async fn subscribe_events(&self) -> Result<EventStream>;
}
