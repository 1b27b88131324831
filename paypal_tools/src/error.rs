use std::time::Duration;

use ipg_common::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PayPalApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("PayPal refused the credentials or token. {0}")]
    Auth(String),
    #[error("The requested PayPal resource does not exist. {0}")]
    NotFound(String),
    #[error("PayPal rejected the request as conflicting with the resource state. {0}")]
    Conflict(String),
    #[error("PayPal is rate limiting requests. Retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Transient network failure talking to PayPal: {0}")]
    Transient(String),
    #[error("PayPal returned an error. Status {status}. {message}")]
    Remote { status: u16, message: String },
    #[error("Could not understand PayPal's response: {0}")]
    Protocol(String),
}

impl PayPalApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Initialization(_) => ErrorKind::Config,
            Self::Auth(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classifies a non-success HTTP response. `body` is PayPal's error document, which is kept in the message (it
    /// never contains credentials).
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            401 | 403 => Self::Auth(format!("Status {status}. {body}")),
            404 => Self::NotFound(body),
            409 | 422 => Self::Conflict(body),
            429 => Self::RateLimited { retry_after },
            408 => Self::Transient(format!("Status {status}. {body}")),
            _ => Self::Remote { status, message: body },
        }
    }
}

impl From<reqwest::Error> for PayPalApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Remote { status: e.status().map(|s| s.as_u16()).unwrap_or_default(), message: e.to_string() }
        }
    }
}
