use std::{env, fmt::Display, str::FromStr, time::Duration};

use ipg_common::Secret;
use log::*;

use crate::PayPalApiError;

pub const SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";
pub const LIVE_API_BASE: &str = "https://api-m.paypal.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_RATE_LIMIT_PER_SEC: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayPalMode {
    #[default]
    Sandbox,
    Live,
}

impl FromStr for PayPalMode {
    type Err = PayPalApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "live" => Ok(Self::Live),
            other => Err(PayPalApiError::Initialization(format!(
                "PAYPAL_MODE must be 'sandbox' or 'live', not '{other}'"
            ))),
        }
    }
}

impl Display for PayPalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox => f.write_str("sandbox"),
            Self::Live => f.write_str("live"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub mode: PayPalMode,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// The id PayPal assigned to our webhook subscription. Needed to verify webhook signatures.
    pub webhook_id: Option<String>,
    /// Overrides the REST base url implied by `mode`.
    pub api_base: Option<String>,
    pub request_timeout: Duration,
    /// Refill rate of the token bucket shared by every call made through one client.
    pub rate_limit_per_sec: f64,
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            mode: PayPalMode::Sandbox,
            client_id: String::default(),
            client_secret: Secret::default(),
            webhook_id: None,
            api_base: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
        }
    }
}

impl PayPalConfig {
    /// Loads the client configuration from the environment. The credentials and mode are mandatory; everything else
    /// falls back to its default with a log message.
    pub fn try_from_env() -> Result<Self, PayPalApiError> {
        let client_id = required_var("PAYPAL_CLIENT_ID")?;
        let client_secret = Secret::new(required_var("PAYPAL_CLIENT_SECRET")?);
        let mode = required_var("PAYPAL_MODE")?.parse::<PayPalMode>()?;
        let webhook_id = env::var("PAYPAL_WEBHOOK_ID").ok().filter(|s| !s.trim().is_empty());
        if webhook_id.is_none() {
            warn!("🪛️ PAYPAL_WEBHOOK_ID is not set. Incoming webhooks cannot be verified and will be rejected.");
        }
        let api_base = env::var("PAYPAL_API_BASE").ok().filter(|s| !s.trim().is_empty());
        let request_timeout = env::var("REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid value for REQUEST_TIMEOUT_MS ({s}). {e}. Using the default."))
                    .ok()
            })
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let rate_limit_per_sec = env::var("PAYPAL_RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|s| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| *v > 0.0)
                    .or_else(|| {
                        warn!("🪛️ Invalid value for PAYPAL_RATE_LIMIT_PER_SEC ({s}). Using the default.");
                        None
                    })
            })
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC);
        info!("🪛️ PayPal client configured for {mode} mode");
        Ok(Self { mode, client_id, client_secret, webhook_id, api_base, request_timeout, rate_limit_per_sec })
    }

    pub fn base_url(&self) -> &str {
        match (&self.api_base, self.mode) {
            (Some(base), _) => base.trim_end_matches('/'),
            (None, PayPalMode::Live) => LIVE_API_BASE,
            (None, PayPalMode::Sandbox) => SANDBOX_API_BASE,
        }
    }
}

fn required_var(name: &str) -> Result<String, PayPalApiError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(PayPalApiError::Initialization(format!("{name} is not set"))),
    }
}
