use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Machine-readable failure categories. Every error type in the gateway maps onto one of these, and HTTP error bodies
/// carry it as `error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Auth,
    NotFound,
    Conflict,
    RateLimited,
    Transient,
    Remote,
    Protocol,
    StoreIo,
    StateViolation,
    DuplicateRemote,
    SignatureInvalid,
    Config,
    /// The caller sent something malformed. Not a remote or storage failure.
    InvalidRequest,
    Forbidden,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "AUTH",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Transient => "TRANSIENT",
            Self::Remote => "REMOTE",
            Self::Protocol => "PROTOCOL",
            Self::StoreIo => "STORE_IO",
            Self::StateViolation => "STATE_VIOLATION",
            Self::DuplicateRemote => "DUPLICATE_REMOTE",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Config => "CONFIG",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Forbidden => "FORBIDDEN",
        }
    }

    /// Only these kinds are worth another attempt against the remote API.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
