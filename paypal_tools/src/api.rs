use std::{sync::Arc, time::Duration};

use ipg_common::Secret;
use log::*;
use reqwest::{header::RETRY_AFTER, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::PayPalConfig,
    data_objects::{
        Money,
        NewOrderRequest,
        OrderStatusCode,
        PayPalOrder,
        Refund,
        TokenResponse,
        VerifySignatureRequest,
        VerifySignatureResponse,
        WebhookHeaders,
    },
    rate_limit::RateLimiter,
    retry::{with_retry, RetryPolicy},
    token_cache::{TokenCache, TOKEN_REFRESH_MARGIN},
    PayPalApiError,
};

/// A thin, shareable client for the PayPal REST API.
///
/// Every call is throttled by a shared token bucket, authenticated with a cached OAuth2 client-credentials token, and
/// retried on transient failures. Clones share the HTTP connection pool, token cache and rate limiter.
#[derive(Clone)]
pub struct PayPalApi {
    config: PayPalConfig,
    client: Arc<Client>,
    tokens: Arc<TokenCache>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl PayPalApi {
    pub fn new(config: PayPalConfig) -> Result<Self, PayPalApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PayPalApiError::Initialization(e.to_string()))?;
        let rate = config.rate_limit_per_sec.max(0.1);
        let burst = rate.ceil().max(1.0) as u32;
        let limiter = RateLimiter::new(burst, rate);
        info!("💳️ PayPal client created for {} ({})", config.mode, config.base_url());
        Ok(Self {
            config,
            client: Arc::new(client),
            tokens: Arc::new(TokenCache::new(TOKEN_REFRESH_MARGIN)),
            limiter: Arc::new(limiter),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn config(&self) -> &PayPalConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url().trim_end_matches('/'))
    }

    /// Returns a valid access token, fetching a new one only when the cached token is missing or close to expiry.
    /// Concurrent callers share a single fetch.
    ///
    /// The fetch is not retried here. A failed fetch fails the request attempt that needed it, and [`Self::rest_query`]
    /// decides whether to try again.
    pub async fn get_access_token(&self) -> Result<Secret<String>, PayPalApiError> {
        self.tokens.get_or_refresh(|| self.request_token()).await
    }

    async fn request_token(&self) -> Result<TokenResponse, PayPalApiError> {
        let url = self.url("/v1/oauth2/token");
        trace!("🔑️ Requesting access token from {url}");
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.reveal()))
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            response.json::<TokenResponse>().await.map_err(|e| PayPalApiError::Protocol(e.to_string()))
        } else {
            let retry_after = retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            Err(PayPalApiError::from_status(status.as_u16(), retry_after, body))
        }
    }

    /// Sends an authenticated JSON request, retrying according to the client's policy. An empty response body (e.g.
    /// `204 No Content`) deserializes as JSON `null`.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        request_id: Option<&str>,
    ) -> Result<T, PayPalApiError> {
        let url = self.url(path);
        let label = format!("{method} {path}");
        let url = url.as_str();
        let method = &method;
        let label_ref = label.as_str();
        with_retry(&self.retry, &self.limiter, label_ref, move || self.send_once(method.clone(), url, body, request_id))
            .await
    }

    // One attempt as seen by the retry policy. A 401 means the cached token went stale, so the request is sent once
    // more with a fresh token before giving up.
    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        request_id: Option<&str>,
    ) -> Result<T, PayPalApiError> {
        let mut reauthenticated = false;
        loop {
            let token = self.get_access_token().await?;
            trace!("💳️ Sending REST query: {method} {url}");
            let mut req = self
                .client
                .request(method.clone(), url)
                .bearer_auth(token.reveal())
                .header("Accept", "application/json")
                .header("Prefer", "return=representation");
            if let Some(id) = request_id {
                req = req.header("PayPal-Request-Id", id);
            }
            if let Some(body) = body {
                req = req.json(body);
            }
            let response = req.send().await?;
            let status = response.status();
            if status.is_success() {
                trace!("💳️ REST query successful. {status}");
                let text = response.text().await?;
                let text = if text.trim().is_empty() { "null" } else { text.as_str() };
                return serde_json::from_str::<T>(text).map_err(|e| PayPalApiError::Protocol(e.to_string()));
            }
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
                if !reauthenticated {
                    warn!("🔑️ PayPal rejected our access token. Fetching a new one and sending {method} {url} again.");
                    reauthenticated = true;
                    continue;
                }
            }
            let retry_after = retry_after(&response);
            let message = response.text().await.unwrap_or_default();
            return Err(PayPalApiError::from_status(status.as_u16(), retry_after, message));
        }
    }

    /// Creates a capture-intent checkout order. The invoice reference is used as the idempotency key, so a retried
    /// create returns the order PayPal already made.
    pub async fn create_order(&self, order: &NewOrderRequest) -> Result<PayPalOrder, PayPalApiError> {
        let body = serde_json::to_value(order).map_err(|e| PayPalApiError::Protocol(e.to_string()))?;
        let reference = order.reference().map(|r| format!("create-{r}"));
        debug!("💳️ Creating PayPal order for {}", order.reference().unwrap_or("<unreferenced>"));
        let result: PayPalOrder =
            self.rest_query(Method::POST, "/v2/checkout/orders", Some(&body), reference.as_deref()).await?;
        info!("💳️ Created PayPal order {} [{:?}]", result.id, result.status);
        Ok(result)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        let path = format!("/v2/checkout/orders/{order_id}");
        debug!("💳️ Fetching PayPal order {order_id}");
        let result: PayPalOrder = self.rest_query(Method::GET, &path, None, None).await?;
        trace!("💳️ PayPal order {order_id} is {:?}", result.status);
        Ok(result)
    }

    /// Captures an approved order. Capturing an order that is already captured is not an error: the current order
    /// is fetched and returned instead.
    pub async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        let path = format!("/v2/checkout/orders/{order_id}/capture");
        let request_id = format!("capture-{order_id}");
        let body = Value::Object(Default::default());
        debug!("💳️ Capturing PayPal order {order_id}");
        match self.rest_query::<PayPalOrder>(Method::POST, &path, Some(&body), Some(&request_id)).await {
            Ok(order) => {
                info!("💳️ Captured PayPal order {order_id} [{:?}]", order.status);
                Ok(order)
            },
            Err(PayPalApiError::Conflict(msg)) if msg.contains("ORDER_ALREADY_CAPTURED") => {
                info!("💳️ PayPal order {order_id} was already captured");
                self.get_order(order_id).await
            },
            Err(e) => Err(e),
        }
    }

    /// Refunds a capture. With no amount the full remaining balance is refunded.
    pub async fn refund_capture(&self, capture_id: &str, amount: Option<Money>) -> Result<Refund, PayPalApiError> {
        let path = format!("/v2/payments/captures/{capture_id}/refund");
        let request_id = match &amount {
            Some(m) => format!("refund-{capture_id}-{}-{}", m.value, m.currency_code),
            None => format!("refund-{capture_id}-full"),
        };
        let body = match amount {
            Some(m) => serde_json::json!({ "amount": m }),
            None => Value::Object(Default::default()),
        };
        debug!("💳️ Refunding PayPal capture {capture_id}");
        let refund: Refund = self.rest_query(Method::POST, &path, Some(&body), Some(&request_id)).await?;
        info!("💳️ Refund {} for capture {capture_id} is {:?}", refund.id, refund.status);
        Ok(refund)
    }

    pub async fn void_authorization(&self, authorization_id: &str) -> Result<(), PayPalApiError> {
        let path = format!("/v2/payments/authorizations/{authorization_id}/void");
        debug!("💳️ Voiding PayPal authorization {authorization_id}");
        let _: Value = self.rest_query(Method::POST, &path, None, None).await?;
        info!("💳️ Voided PayPal authorization {authorization_id}");
        Ok(())
    }

    /// Makes sure the remote order can no longer take money.
    ///
    /// Returns `true` when the order ends up (or already was) unpayable: voided, unknown to PayPal, or with its
    /// authorizations voided. Returns `false` when the order has already been captured and so cannot be cancelled.
    ///
    /// PayPal has no call that cancels a capture-intent order. When such an order was never captured, nothing is sent
    /// and `true` is returned: only this service can capture it, so the cancellation is local and PayPal lets the
    /// order expire on its own.
    pub async fn cancel_order(&self, order_id: &str) -> Result<bool, PayPalApiError> {
        let order = match self.get_order(order_id).await {
            Ok(order) => order,
            Err(PayPalApiError::NotFound(_)) => {
                info!("💳️ PayPal order {order_id} no longer exists. Treating it as cancelled.");
                return Ok(true);
            },
            Err(e) => return Err(e),
        };
        // An authorized order is COMPLETED too, so its captures decide whether the money has been taken
        match order.status {
            OrderStatusCode::Voided => Ok(true),
            _ if order.captures().next().is_some() => {
                info!("💳️ PayPal order {order_id} is already captured and cannot be cancelled");
                Ok(false)
            },
            _ if order.is_authorize_intent() => {
                let pending = order
                    .authorizations()
                    .filter(|a| a.status == "CREATED" || a.status == "PENDING")
                    .map(|a| a.id.clone())
                    .collect::<Vec<_>>();
                for id in pending {
                    self.void_authorization(&id).await?;
                }
                Ok(true)
            },
            OrderStatusCode::Completed => {
                info!("💳️ PayPal order {order_id} is already captured and cannot be cancelled");
                Ok(false)
            },
            status => {
                info!("💳️ PayPal order {order_id} [{status:?}] was never captured. It is abandoned.");
                Ok(true)
            },
        }
    }

    /// Asks PayPal whether a webhook delivery is authentic. Without a configured webhook id nothing can be verified and
    /// the result is always `false`.
    pub async fn verify_webhook_signature(
        &self,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<bool, PayPalApiError> {
        let Some(webhook_id) = self.config.webhook_id.as_deref() else {
            warn!("🔏️ No PayPal webhook id is configured. Webhook signatures cannot be verified.");
            return Ok(false);
        };
        let webhook_event = match serde_json::from_slice::<Value>(body) {
            Ok(v) => v,
            Err(e) => {
                warn!("🔏️ Webhook body is not valid JSON, so it cannot be verified. {e}");
                return Ok(false);
            },
        };
        let request = VerifySignatureRequest {
            auth_algo: &headers.auth_algo,
            cert_url: &headers.cert_url,
            transmission_id: &headers.transmission_id,
            transmission_sig: &headers.transmission_sig,
            transmission_time: &headers.transmission_time,
            webhook_id,
            webhook_event,
        };
        let body = serde_json::to_value(&request).map_err(|e| PayPalApiError::Protocol(e.to_string()))?;
        let result: VerifySignatureResponse =
            self.rest_query(Method::POST, "/v1/notifications/verify-webhook-signature", Some(&body), None).await?;
        let verified = result.verification_status.eq_ignore_ascii_case("SUCCESS");
        debug!("🔏️ Webhook transmission {} verification: {}", headers.transmission_id, result.verification_status);
        Ok(verified)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
