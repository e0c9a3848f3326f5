use thiserror::Error;

/// Errors produced by the SecureGo service.
#[derive(Debug, Error)]
pub enum SecureGoError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type SecureGoResult<T> = Result<T, SecureGoError>;
