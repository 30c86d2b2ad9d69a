//! `crony-runtime`: the boundary between crony and whatever actually runs
//! workloads.
//!
//! - [`Runtime`] is the collaborator trait the scheduler drives: start, wait,
//!   fetch output, list the inventory and subscribe to lifecycle events.
//! - [`DockerRuntime`] implements it on top of the `docker` CLI.
//! - [`OutputCapture`] splits a tagged log stream into two bounded buffers.

pub mod capture;
pub mod docker;
pub mod error;
pub mod runtime;
pub mod types;

pub use capture::{OutputCapture, RingBuffer, DEFAULT_CAPACITY};
pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};
pub use runtime::Runtime;
pub use types::{EventStream, LifecycleEvent, LogFrame, LogStream, StreamKind, WorkloadFilter};
