//! `crony-core`: shared domain types and configuration for the crony daemon.
//!
//! Every other crate in the workspace depends on this one for the
//! [`Workload`](types::Workload) model, the
//! [`NotificationPolicy`](types::NotificationPolicy) rules, the per-run
//! [`ExecutionRecord`](types::ExecutionRecord) and the figment-backed
//! [`CronyConfig`](config::CronyConfig).

pub mod config;
pub mod error;
pub mod types;

pub use config::CronyConfig;
pub use error::{CoreError, Result};
pub use types::{CapturedOutput, ExecutionRecord, NotificationPolicy, Workload, WorkloadId};
