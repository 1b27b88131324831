//! Bearer token cache for the client-credentials flow.
//!
//! The cache slot is guarded by an async mutex that is held for the duration of a refresh. Callers that arrive while a
//! refresh is in flight queue on the mutex and then find the fresh token, so a cold cache costs exactly one fetch no
//! matter how many requests race for it.
use std::{future::Future, time::Duration};

use ipg_common::Secret;
use log::*;
use tokio::{sync::Mutex, time::Instant};

use crate::{data_objects::TokenResponse, PayPalApiError};

/// Tokens are refreshed once less than this much lifetime remains.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct CachedToken {
    token: Secret<String>,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) > margin
    }
}

pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    margin: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(TOKEN_REFRESH_MARGIN)
    }
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self { slot: Mutex::new(None), margin }
    }

    /// Returns the cached token, or calls `fetch` to obtain a new one if the cache is empty or about to expire.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<Secret<String>, PayPalApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse, PayPalApiError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|t| t.is_fresh(self.margin)) {
            trace!("🔑️ Using cached access token");
            return Ok(cached.token.clone());
        }
        debug!("🔑️ Access token is missing or about to expire. Fetching a new one.");
        let response = fetch().await?;
        if response.access_token.is_empty() {
            return Err(PayPalApiError::Protocol("Token response did not contain an access token".into()));
        }
        let cached = CachedToken {
            token: Secret::new(response.access_token),
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        };
        debug!("🔑️ New access token cached. It expires in {}s", response.expires_in);
        let token = cached.token.clone();
        *slot = Some(cached);
        Ok(token)
    }

    /// Drops the cached token, e.g. after PayPal rejected it.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("🔑️ Cached access token invalidated");
        }
    }
}
