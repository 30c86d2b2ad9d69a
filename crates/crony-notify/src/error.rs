use thiserror::Error;

/// Errors raised while rendering or delivering an outcome mail.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The mail template could not be registered or rendered.
    #[error("Render error: {0}")]
    Render(String),

    /// A sender or recipient address is malformed.
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    /// The message could not be assembled.
    #[error("Message build error: {0}")]
    Build(String),

    /// The SMTP exchange failed.
    #[error("Mail transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors raised by a heartbeat ping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeartbeatError {
    /// The request never produced a response (after all retries).
    #[error("heartbeat transport error: {0}")]
    Transport(String),

    /// The endpoint does not know the check identifier.
    #[error("the server could not find a check with ID: {id:?}")]
    NotFound { id: String },

    /// The check was pinged too frequently.
    #[error("the server indicates the check was pinged too frequently")]
    RateLimited,

    /// Any body other than the documented literals.
    #[error("the server returned an unknown response: {0}")]
    UnrecognizedResponse(String),
}
