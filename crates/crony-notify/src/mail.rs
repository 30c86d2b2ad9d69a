use async_trait::async_trait;
use crony_core::config::MailConfig;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use crate::error::{NotifyError, Result};

/// Port on which SMTP servers expect TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// A fully rendered outcome mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    /// One or more comma-separated recipients.
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivers rendered mails.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, msg: &MailMessage) -> Result<()>;
}

/// SMTP delivery through `lettre`'s async transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Port 465 uses implicit TLS; every other port upgrades with STARTTLS
    /// when the server offers it.
    pub fn new(config: &MailConfig) -> Result<Self> {
        let params = TlsParameters::new(config.smtp_host.clone())
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let tls = if config.smtp_port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(params)
        } else {
            Tls::Opportunistic(params)
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.as_str())
                .port(config.smtp_port)
                .tls(tls);

        match (config.smtp_user.as_deref(), config.smtp_password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() => {
                builder = builder.credentials(Credentials::new(user.to_string(), password.to_string()));
            }
            _ => {}
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, msg: &MailMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&msg.from)?)
            .subject(msg.subject.clone())
            .header(ContentType::TEXT_HTML);
        for to in recipients(&msg.to) {
            builder = builder.to(parse_mailbox(to)?);
        }

        let email = builder
            .body(msg.html_body.clone())
            .map_err(|e| NotifyError::Build(e.to_string()))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        debug!(code = %response.code(), "mail accepted by smtp server");
        Ok(())
    }
}

fn recipients(to: &str) -> impl Iterator<Item = &str> {
    to.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}
