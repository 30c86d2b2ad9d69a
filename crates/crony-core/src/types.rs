use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Runtime-assigned identity of a workload (a full container ID for Docker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadId(pub String);

impl WorkloadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkloadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WorkloadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// When an outcome message is sent for a finished execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NotificationPolicy {
    #[default]
    Never,
    Always,
    /// Only when the return code is non-zero. Spelled `onerror` in labels and config.
    OnFailure,
}

impl NotificationPolicy {
    /// Whether a run that ended with `return_code` should produce a message.
    pub fn should_notify(self, return_code: i64) -> bool {
        match self {
            NotificationPolicy::Never => false,
            NotificationPolicy::Always => true,
            NotificationPolicy::OnFailure => return_code != 0,
        }
    }
}

impl fmt::Display for NotificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationPolicy::Never => "never",
            NotificationPolicy::Always => "always",
            NotificationPolicy::OnFailure => "onerror",
        };
        write!(f, "{s}")
    }
}

impl FromStr for NotificationPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(NotificationPolicy::Never),
            "always" => Ok(NotificationPolicy::Always),
            "onerror" => Ok(NotificationPolicy::OnFailure),
            _ => Err(CoreError::InvalidPolicy(s.to_string())),
        }
    }
}

impl TryFrom<String> for NotificationPolicy {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NotificationPolicy> for String {
    fn from(p: NotificationPolicy) -> Self {
        p.to_string()
    }
}

/// A schedulable unit of work discovered from the runtime inventory.
///
/// Immutable once discovered: a changed schedule shows up as a destroy
/// followed by a create of a new workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    /// Human-readable name, used for logs, metric labels and mail. Runtime
    /// calls address the workload by `id`.
    pub name: String,
    /// Cron-style schedule expression.
    pub schedule: String,
    pub policy: NotificationPolicy,
    /// Heartbeat-service check identifier, if the workload is monitored.
    pub heartbeat_id: Option<String>,
}

/// Bounded stdout/stderr snapshots of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of one finished execution. Lives only for the duration of the
/// reporting phase and is never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub workload: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub return_code: i64,
    /// `None` when the output could not be fetched from the runtime.
    pub output: Option<CapturedOutput>,
}

impl ExecutionRecord {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
