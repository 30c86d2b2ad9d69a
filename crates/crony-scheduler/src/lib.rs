//! `crony-scheduler`: the job registry and single-flight execution engine.
//!
//! # Overview
//!
//! The [`JobRegistry`] maps each discovered workload to a trigger registered
//! with a [`Scheduler`]. Every trigger runs the workload's job behind a
//! [`ConcurrencyGuard`], so a trigger that fires while the previous run is
//! still in flight is dropped. The [`JobExecutor`] drives one run end-to-end
//! and fans the outcome out to metrics, heartbeat and mail. The
//! [`EventWatcher`] keeps the registry in step with the runtime inventory.
//!
//! # Execution states
//!
//! | State               | Exit                                             |
//! |---------------------|--------------------------------------------------|
//! | Starting            | start failed -> Aborted                           |
//! | AwaitingCompletion  | wait failed -> Aborted, exit code -> Finished     |
//! | Finished            | metrics recorded, then Reporting                 |
//! | Reporting           | heartbeat, output capture, mail; failures logged |

pub mod error;
pub mod executor;
pub mod guard;
pub mod metrics;
pub mod registry;
pub mod trigger;
pub mod watcher;

pub use error::{ExecutionError, Result, SchedulerError};
pub use executor::{Job, JobExecutor};
pub use guard::ConcurrencyGuard;
pub use metrics::{MetricsRecorder, PrometheusMetrics};
pub use registry::{JobRegistry, RegistryEntry};
pub use trigger::{normalize_expression, CronScheduler, JobCallback, JobHandle, Scheduler};
pub use watcher::EventWatcher;
