use serde::{Deserialize, Serialize};

/// Error taxonomy surfaced to clients over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    AuthError,
    CapacityError,
    ValidationError,
    PayloadTooLarge,
    RateLimitExceeded,
    NotSupported,
    ServerError,
    BatchError,
}

impl ErrorKind {
    /// HTTP-style status code conventionally paired with this kind in
    /// `subscription_error` frames. Not all kinds carry one.
    pub fn status(self) -> Option<u16> {
        match self {
            ErrorKind::AuthError => Some(401),
            ErrorKind::CapacityError => Some(429),
            ErrorKind::ServerError => Some(500),
            _ => None,
        }
    }
}

/// Failure to parse or structurally validate an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing required field `event`")]
    MissingEvent,
    #[error("`event` must be a string")]
    EventNotString,
    #[error("`event` exceeds 100 characters")]
    EventTooLong,
    #[error("`event` contains characters outside [A-Za-z0-9._-] (with optional client- prefix)")]
    EventInvalidChars,
    #[error("`channel` must be a string when present")]
    ChannelNotString,
    #[error("frame exceeds the configured maximum payload size")]
    PayloadTooLarge,
    #[error("missing required field `{0}` for this event")]
    MissingField(&'static str),
}
