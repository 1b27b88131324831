//! A small PayPal REST client: OAuth2 token caching, request throttling and retry, Orders v2, capture refunds and
//! webhook signature verification.
mod api;
mod config;
mod error;
mod rate_limit;
mod retry;
mod token_cache;

pub mod data_objects;

pub use api::PayPalApi;
pub use config::{PayPalConfig, PayPalMode, DEFAULT_RATE_LIMIT_PER_SEC, DEFAULT_REQUEST_TIMEOUT, LIVE_API_BASE, SANDBOX_API_BASE};
pub use data_objects::{
    Capture,
    CaptureStatus,
    Money,
    NewOrderRequest,
    OrderStatusCode,
    PayPalOrder,
    Refund,
    RefundStatus,
    WebhookEvent,
    WebhookHeaders,
};
pub use error::PayPalApiError;
pub use rate_limit::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use token_cache::{TokenCache, TOKEN_REFRESH_MARGIN};
