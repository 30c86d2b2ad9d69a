use std::sync::Arc;

use crony_core::{config::MailConfig, ExecutionRecord, NotificationPolicy};
use tracing::{debug, error, info};

use crate::{
    error::Result,
    mail::{MailMessage, MailTransport, SmtpMailer},
    render::MessageRenderer,
};

/// What [`NotificationDispatcher::dispatch`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The policy did not select a message, or mail is not configured.
    Skipped,
    Sent,
    /// A message was selected but rendering or delivery failed (already logged).
    Failed,
}

struct Delivery {
    transport: Arc<dyn MailTransport>,
    renderer: MessageRenderer,
    from: String,
    to: String,
}

/// Applies the notification policy and delivers outcome mails.
///
/// Delivery failures are logged here and reported only through
/// [`DispatchOutcome`]; they are never retried.
pub struct NotificationDispatcher {
    delivery: Option<Delivery>,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        renderer: MessageRenderer,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            delivery: Some(Delivery {
                transport,
                renderer,
                from: from.into(),
                to: to.into(),
            }),
        }
    }

    /// SMTP-backed dispatcher for the given mail settings.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        debug!("using {config}");
        Ok(Self::new(
            Arc::new(SmtpMailer::new(config)?),
            MessageRenderer::new(config.max_output_chars)?,
            config.mail_from.clone(),
            config.mail_to.clone(),
        ))
    }

    /// A dispatcher that never sends anything.
    pub fn disabled() -> Self {
        Self { delivery: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.delivery.is_some()
    }

    pub async fn dispatch(
        &self,
        policy: NotificationPolicy,
        record: &ExecutionRecord,
    ) -> DispatchOutcome {
        if !policy.should_notify(record.return_code) {
            return DispatchOutcome::Skipped;
        }
        let Some(delivery) = &self.delivery else {
            debug!(workload = %record.workload, %policy, "mail not configured, skipping notification");
            return DispatchOutcome::Skipped;
        };

        let rendered = match delivery.renderer.render(record) {
            Ok(r) => r,
            Err(e) => {
                error!(workload = %record.workload, error = %e, "can't render mail");
                return DispatchOutcome::Failed;
            }
        };

        let msg = MailMessage {
            from: delivery.from.clone(),
            to: delivery.to.clone(),
            subject: rendered.subject,
            html_body: rendered.html_body,
        };

        match delivery.transport.send(&msg).await {
            Ok(()) => {
                info!(workload = %record.workload, subject = %msg.subject, "notification sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!(workload = %record.workload, error = %e, "can't send mail");
                DispatchOutcome::Failed
            }
        }
    }
}
