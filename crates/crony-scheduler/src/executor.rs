use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crony_core::{CapturedOutput, ExecutionRecord, Workload};
use crony_notify::{HeartbeatReporter, NotificationDispatcher};
use crony_runtime::{OutputCapture, Runtime, DEFAULT_CAPACITY};
use tracing::{debug, error, info, warn};

use crate::error::ExecutionError;
use crate::metrics::MetricsRecorder;

/// Work run on every trigger of a registered workload.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, workload: &Workload);
}

/// Drives one execution of a workload end-to-end.
///
/// Start and wait failures abort the run before anything is reported.
/// Once a return code is known, metrics are recorded and the reporting
/// steps (heartbeat, output capture, mail) run independently: each failure
/// is logged and never stops the others.
pub struct JobExecutor {
    runtime: Arc<dyn Runtime>,
    dispatcher: Arc<NotificationDispatcher>,
    metrics: Arc<dyn MetricsRecorder>,
    heartbeat: Option<Arc<HeartbeatReporter>>,
    capture_capacity: usize,
}

impl JobExecutor {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        dispatcher: Arc<NotificationDispatcher>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            runtime,
            dispatcher,
            metrics,
            heartbeat: None,
            capture_capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_heartbeat(mut self, reporter: Arc<HeartbeatReporter>) -> Self {
        self.heartbeat = Some(reporter);
        self
    }

    /// Per-stream bound of the captured output.
    pub fn with_capture_capacity(mut self, capacity: usize) -> Self {
        self.capture_capacity = capacity;
        self
    }

    pub async fn run(&self, workload: &Workload) -> Result<ExecutionRecord, ExecutionError> {
        // Taken before the start request so the log query covers the first lines.
        let started_at = Utc::now();
        debug!(workload = %workload.name, "starting execution");

        self.runtime
            .start(workload)
            .await
            .map_err(ExecutionError::Start)?;
        self.heartbeat_start(workload).await;

        let return_code = self
            .runtime
            .wait_for_completion(workload)
            .await
            .map_err(ExecutionError::Wait)?;
        let finished_at = Utc::now();

        let mut record = ExecutionRecord {
            workload: workload.name.clone(),
            started_at,
            finished_at,
            return_code,
            output: None,
        };
        self.metrics
            .record(&record.workload, record.success(), record.duration(), started_at);

        if record.success() {
            debug!(workload = %record.workload, duration = ?record.duration(), "execution succeeded");
        } else {
            warn!(
                workload = %record.workload,
                return_code,
                duration = ?record.duration(),
                "execution finished with non-zero return code"
            );
        }

        self.heartbeat_end(workload, return_code).await;

        match self.capture_output(workload, started_at).await {
            Some(output) => {
                record.output = Some(output);
                self.dispatcher.dispatch(workload.policy, &record).await;
            }
            None => {
                info!(workload = %record.workload, "no output available, skipping notification");
            }
        }

        Ok(record)
    }

    async fn heartbeat_start(&self, workload: &Workload) {
        let (Some(reporter), Some(id)) = (&self.heartbeat, &workload.heartbeat_id) else {
            return;
        };
        if let Err(e) = reporter.start(id).await {
            error!(workload = %workload.name, error = %e, "can't report execution start to heartbeat service");
        }
    }

    async fn heartbeat_end(&self, workload: &Workload, return_code: i64) {
        let (Some(reporter), Some(id)) = (&self.heartbeat, &workload.heartbeat_id) else {
            return;
        };
        let result = if return_code == 0 {
            reporter.success(id).await
        } else {
            reporter.fail(id, return_code).await
        };
        if let Err(e) = result {
            error!(workload = %workload.name, error = %e, "can't report execution end to heartbeat service");
        }
    }

    /// `None` when the runtime refused to hand out the output at all. A
    /// failure mid-stream keeps what was read up to that point.
    async fn capture_output(
        &self,
        workload: &Workload,
        since: DateTime<Utc>,
    ) -> Option<CapturedOutput> {
        let stream = match self.runtime.fetch_output(workload, since).await {
            Ok(s) => s,
            Err(e) => {
                error!(workload = %workload.name, error = %e, "can't fetch execution output");
                return None;
            }
        };

        let mut capture = OutputCapture::with_capacity(self.capture_capacity);
        if let Err(e) = capture.drain(stream).await {
            warn!(workload = %workload.name, error = %e, "output stream ended early, keeping partial output");
        }
        Some(capture.into_output())
    }
}

#[async_trait]
impl Job for JobExecutor {
    async fn execute(&self, workload: &Workload) {
        if let Err(e) = self.run(workload).await {
            error!(workload = %workload.name, error = %e, "execution aborted");
        }
    }
}
