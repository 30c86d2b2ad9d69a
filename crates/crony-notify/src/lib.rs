//! `crony-notify`: best-effort outcome reporting side channels.
//!
//! - [`HeartbeatReporter`] pings an external dead-man's-switch endpoint with
//!   bounded retry.
//! - [`NotificationDispatcher`] applies a workload's
//!   [`NotificationPolicy`](crony_core::NotificationPolicy), renders the
//!   outcome mail and hands it to a [`MailTransport`].
//!
//! Both return their failures to the caller, which logs them; neither ever
//! influences the outcome of an execution.

pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod mail;
pub mod render;
pub mod truncate;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::{HeartbeatError, NotifyError, Result};
pub use heartbeat::{HeartbeatReporter, HeartbeatTransport, HttpHeartbeatTransport};
pub use mail::{MailMessage, MailTransport, SmtpMailer};
pub use render::{MessageRenderer, RenderedMessage};
