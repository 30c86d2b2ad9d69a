use crony_core::WorkloadId;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// A workload lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created { id: WorkloadId },
    Destroyed { id: WorkloadId, name: String },
}

/// Which output stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One chunk of workload output, tagged with its source stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub stream: StreamKind,
    pub data: Vec<u8>,
}

impl LogFrame {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream: StreamKind::Stdout,
            data: data.into(),
        }
    }

    pub fn stderr(data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream: StreamKind::Stderr,
            data: data.into(),
        }
    }
}

/// Selects which part of the inventory to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadFilter {
    All,
    Id(WorkloadId),
}

/// Combined output of one workload, in arrival order.
pub type LogStream = BoxStream<'static, Result<LogFrame>>;

/// Possibly infinite sequence of lifecycle notifications.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent>>;
