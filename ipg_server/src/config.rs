//! Server configuration, read from the environment (after `.env` has been loaded).
//!
//! The PayPal credentials and `RESULTS_DIR` are required. Everything else falls back to a default, with a log message
//! when a value was present but could not be used.
use std::{env, path::PathBuf, time::Duration};

use ipg_common::{parse_boolean_flag, parse_named_tokens, Secret};
use ipg_engine::{ServiceOptions, DEFAULT_RECONCILER_CONCURRENCY};
use log::*;
use paypal_tools::PayPalConfig;

use crate::{
    auth::{AccessTokens, Principal},
    errors::ServerError,
};

const DEFAULT_IPG_HOST: &str = "127.0.0.1";
const DEFAULT_IPG_PORT: u16 = 8380;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL PayPal sends buyers back to
    pub public_url: String,
    /// Directory holding the `history_YYYYMMDD.json` partitions
    pub results_dir: PathBuf,
    pub paypal: PayPalConfig,
    pub reconciler_concurrency: usize,
    /// Period of the background reconciliation job. `None` disables it.
    pub reconciler_interval: Option<Duration>,
    /// If false, webhook deliveries are accepted without checking their signature. **DANGER**
    pub webhook_signature_checks: bool,
    pub access_tokens: AccessTokens,
}

impl ServerConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let paypal = PayPalConfig::try_from_env().map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        let results_dir = env::var("RESULTS_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ServerError::ConfigurationError("RESULTS_DIR is not set".into()))?;
        let host = env::var("IPG_HOST").ok().unwrap_or_else(|| DEFAULT_IPG_HOST.into());
        let port = env::var("IPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for IPG_PORT. {e} Using the default, {DEFAULT_IPG_PORT}, instead."
                    );
                    DEFAULT_IPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_IPG_PORT);
        let public_url = env::var("IPG_PUBLIC_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                info!("🪛️ IPG_PUBLIC_URL is not set. PayPal will send buyers back to http://{host}:{port}");
                format!("http://{host}:{port}")
            });
        let reconciler_concurrency = parse_positive("RECONCILER_CONCURRENCY", DEFAULT_RECONCILER_CONCURRENCY as u64)
            .unwrap_or(DEFAULT_RECONCILER_CONCURRENCY as u64) as usize;
        let reconciler_interval = parse_positive("RECONCILER_INTERVAL_SECS", 0).map(Duration::from_secs);
        match reconciler_interval {
            Some(d) => info!("🪛️ Background reconciliation will run every {}s", d.as_secs()),
            None => info!("🪛️ Background reconciliation is disabled"),
        }
        let webhook_signature_checks = parse_boolean_flag(env::var("IPG_WEBHOOK_SIGNATURE_CHECKS").ok(), true);
        if !webhook_signature_checks {
            warn!("🚨️🚨️🚨️ Webhook signature checks are DISABLED. Anyone can forge PayPal events. 🚨️🚨️🚨️");
        }
        let access_tokens = access_tokens_from_env();
        Ok(Self {
            host,
            port,
            public_url,
            results_dir,
            paypal,
            reconciler_concurrency,
            reconciler_interval,
            webhook_signature_checks,
            access_tokens,
        })
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions { public_url: self.public_url.clone(), concurrency: self.reconciler_concurrency }
    }
}

// `None` when the variable is unset, zero, or invalid.
fn parse_positive(name: &str, default: u64) -> Option<u64> {
    let value = match env::var(name) {
        Ok(s) => s.trim().parse::<u64>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e}. Using the default, {default}.");
            default
        }),
        Err(_) => default,
    };
    (value > 0).then_some(value)
}

fn access_tokens_from_env() -> AccessTokens {
    let mut tokens = AccessTokens::new();
    let users = env::var("IPG_ACCESS_TOKENS").unwrap_or_default();
    for (name, token) in parse_named_tokens(&users) {
        tokens.add(Secret::new(token), Principal::user(name));
    }
    let admins = env::var("IPG_ADMIN_TOKENS").unwrap_or_default();
    for (name, token) in parse_named_tokens(&admins) {
        tokens.add(Secret::new(token), Principal::admin(name));
    }
    if tokens.is_empty() {
        warn!("🪛️ No access tokens are configured. Only the public and webhook endpoints will be usable.");
    } else {
        info!("🪛️ {} access tokens configured", tokens.len());
    }
    tokens
}
