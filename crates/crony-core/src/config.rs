use std::fmt;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::NotificationPolicy;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_CONFIG_FILE: &str = "crony.toml";
pub const DEFAULT_HEARTBEAT_URL: &str = "https://hc-ping.com/";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;

/// Top-level config (crony.toml + CRONY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Absent means outcome mails are disabled for every workload.
    #[serde(default)]
    pub mail: Option<MailConfig>,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Listener for the `/metrics` and `/health` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// How workloads are discovered and driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path or name of the docker CLI binary.
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    /// Label carrying the cron expression; only labelled containers are scheduled.
    #[serde(default = "default_schedule_label")]
    pub schedule_label: String,
    #[serde(default = "default_policy_label")]
    pub policy_label: String,
    #[serde(default = "default_heartbeat_label")]
    pub heartbeat_label: String,
    /// Delay before re-subscribing after the lifecycle event stream ends.
    #[serde(default = "default_resubscribe_delay_secs")]
    pub resubscribe_delay_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_bin: default_docker_bin(),
            schedule_label: default_schedule_label(),
            policy_label: default_policy_label(),
            heartbeat_label: default_heartbeat_label(),
            resubscribe_delay_secs: default_resubscribe_delay_secs(),
        }
    }
}

/// SMTP delivery settings plus the default notification policy.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    pub mail_to: String,
    pub mail_from: String,
    /// Applied to workloads that carry no policy label of their own.
    #[serde(default)]
    pub policy: NotificationPolicy,
    /// Per-stream character budget for output embedded in a mail body.
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl MailConfig {
    pub fn validate(&self) -> Result<()> {
        let user = self.smtp_user.as_deref().unwrap_or_default();
        let password = self.smtp_password.as_deref().unwrap_or_default();
        if user.is_empty() != password.is_empty() {
            return Err(CoreError::Config(
                "mail.smtp_user and mail.smtp_password must be provided together, or not at all"
                    .to_string(),
            ));
        }
        if self.smtp_host.trim().is_empty() {
            return Err(CoreError::Config("mail.smtp_host must not be empty".to_string()));
        }
        if self.mail_to.trim().is_empty() || self.mail_from.trim().is_empty() {
            return Err(CoreError::Config(
                "mail.mail_to and mail.mail_from must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Keeps the password out of debug logs.
impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mail config [host={}, port={}, user={}, mailTo={}, mailFrom={}, policy={}]",
            self.smtp_host,
            self.smtp_port,
            self.smtp_user.as_deref().unwrap_or(""),
            self.mail_to,
            self.mail_from,
            self.policy
        )
    }
}

/// External dead-man's-switch endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_url")]
    pub base_url: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait before the second attempt; doubles for every further attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            base_url: default_heartbeat_url(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long running executions may take to finish once shutdown starts.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_docker_bin() -> String {
    "docker".to_string()
}
fn default_schedule_label() -> String {
    "crony.schedule".to_string()
}
fn default_policy_label() -> String {
    "crony.mail_policy".to_string()
}
fn default_heartbeat_label() -> String {
    "crony.hcio_uuid".to_string()
}
fn default_resubscribe_delay_secs() -> u64 {
    1
}
fn default_max_output_chars() -> usize {
    DEFAULT_MAX_OUTPUT_CHARS
}
fn default_heartbeat_url() -> String {
    DEFAULT_HEARTBEAT_URL.to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_heartbeat_timeout_secs() -> u64 {
    10
}
fn default_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

impl CronyConfig {
    /// Load config from a TOML file with CRONY_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `CRONY_MAIL__SMTP_HOST`. A missing file is not an error; every
    /// section has defaults except `[mail]`, which is optional as a whole.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        let config: CronyConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CRONY_").split("__"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(mail) = &self.mail {
            mail.validate()?;
        }
        if self.heartbeat.max_attempts == 0 {
            return Err(CoreError::Config(
                "heartbeat.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Policy for workloads without a policy label.
    pub fn default_policy(&self) -> NotificationPolicy {
        self.mail
            .as_ref()
            .map(|m| m.policy)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_apply_without_file() {
        Jail::expect_with(|_jail| {
            let config = CronyConfig::load(Some("missing.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, DEFAULT_PORT);
            assert_eq!(config.runtime.schedule_label, "crony.schedule");
            assert_eq!(config.heartbeat.max_attempts, 3);
            assert!(config.mail.is_none());
            assert_eq!(config.default_policy(), NotificationPolicy::Never);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "crony.toml",
                r#"
                [server]
                port = 9000

                [mail]
                smtp_host = "smtp.example.com"
                smtp_port = 587
                mail_to = "ops@example.com"
                mail_from = "crony@example.com"
                policy = "OnError"
                "#,
            )?;
            jail.set_env("CRONY_SERVER__PORT", "9100");
            jail.set_env("CRONY_HEARTBEAT__BASE_URL", "http://localhost:8000/ping/");

            let config = CronyConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.heartbeat.base_url, "http://localhost:8000/ping/");
            assert_eq!(config.default_policy(), NotificationPolicy::OnFailure);
            Ok(())
        });
    }

    #[test]
    fn smtp_credentials_must_be_paired() {
        let mail = MailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 25,
            smtp_user: Some("user".into()),
            smtp_password: None,
            mail_to: "a@example.com".into(),
            mail_from: "b@example.com".into(),
            policy: NotificationPolicy::Always,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        };
        assert!(mail.validate().is_err());
    }

    #[test]
    fn debug_output_hides_password() {
        let mail = MailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 25,
            smtp_user: Some("user".into()),
            smtp_password: Some("hunter2".into()),
            mail_to: "a@example.com".into(),
            mail_from: "b@example.com".into(),
            policy: NotificationPolicy::Always,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        };
        assert!(!format!("{mail:?}").contains("hunter2"));
    }

    #[test]
    fn zero_heartbeat_attempts_rejected() {
        let mut config = CronyConfig::default();
        config.heartbeat.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
