use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use ipg_common::ErrorKind;
use ipg_engine::{PaymentServiceError, StoreError};
use log::error;
use paypal_tools::PayPalApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("No valid access token was provided")]
    Unauthenticated,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("The webhook signature is missing or invalid")]
    InvalidSignature,
    #[error("The webhook signature could not be checked right now. {0}")]
    VerificationUnavailable(String),
    #[error(transparent)]
    Service(#[from] PaymentServiceError),
    #[error("Background work stopped before it could finish: {0}")]
    BackgroundTaskFailed(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InitializeError(_) | Self::ConfigurationError(_) => ErrorKind::Config,
            Self::Unauthenticated => ErrorKind::Auth,
            Self::InsufficientPermissions(_) => ErrorKind::Forbidden,
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => ErrorKind::InvalidRequest,
            Self::InvalidSignature => ErrorKind::SignatureInvalid,
            Self::VerificationUnavailable(_) => ErrorKind::Transient,
            Self::Service(e) => e.kind(),
            Self::IOError(_) | Self::BackgroundTaskFailed(_) => ErrorKind::StoreIo,
        }
    }
}

impl From<PayPalApiError> for ServerError {
    fn from(e: PayPalApiError) -> Self {
        Self::Service(e.into())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::Service(e.into())
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            // The caller's credentials, not ours
            Self::Unauthenticated | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => match self.kind() {
                ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::StateViolation | ErrorKind::DuplicateRemote => StatusCode::CONFLICT,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                // An AUTH failure here is PayPal refusing our credentials
                ErrorKind::Auth | ErrorKind::Transient | ErrorKind::Remote | ErrorKind::Protocol => {
                    StatusCode::BAD_GATEWAY
                },
                ErrorKind::SignatureInvalid => StatusCode::UNAUTHORIZED,
                ErrorKind::StoreIo | ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error_kind": self.kind(), "error": self.to_string() }).to_string())
    }
}
