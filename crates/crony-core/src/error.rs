use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unknown value '{0}' for notification policy, please use one of 'never, always, onerror'")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
