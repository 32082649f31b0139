use broadcast_protocol::ErrorKind;
use thiserror::Error;

/// Errors surfaced to a client over the wire. Internal-only failures
/// (relay publish, webhook delivery, persistence, dedup-store) are logged
/// at the call site and never become one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("authorization denied: {0}")]
    Auth(String),
    #[error("at capacity: {0}")]
    Capacity(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimitExceeded { retry_after_ms: u64 },
    #[error("feature not supported: {0}")]
    NotSupported(String),
    #[error("internal server error: {0}")]
    Server(String),
    #[error("batch operation failed: {0}")]
    Batch(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Auth(_) => ErrorKind::AuthError,
            CoreError::Capacity(_) => ErrorKind::CapacityError,
            CoreError::Validation(_) => ErrorKind::ValidationError,
            CoreError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            CoreError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            CoreError::NotSupported(_) => ErrorKind::NotSupported,
            CoreError::Server(_) => ErrorKind::ServerError,
            CoreError::Batch(_) => ErrorKind::BatchError,
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status().unwrap_or(400)
    }
}
