//! Webhook signature middleware.
//!
//! PayPal signs every webhook delivery and sends the signature in five `PAYPAL-*` transmission headers. This
//! middleware reads the raw body, asks the [`WebhookVerifier`] whether the delivery is authentic and, if it is, puts
//! the body back so the handler can read it.
//!
//! * Missing headers or a rejected signature answer 401.
//! * If the verifier cannot reach a verdict (PayPal is down, say), the answer is 503 so that PayPal delivers again.
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use ipg_engine::WebhookVerifier;
use log::*;
use paypal_tools::WebhookHeaders;

use crate::errors::ServerError;

pub struct WebhookSignatureFactory<V> {
    verifier: Arc<V>,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl<V> WebhookSignatureFactory<V> {
    pub fn new(verifier: Arc<V>, enabled: bool) -> Self {
        Self { verifier, enabled }
    }
}

impl<S, B, V> Transform<S, ServiceRequest> for WebhookSignatureFactory<V>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    V: WebhookVerifier + 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = WebhookSignatureService<S, V>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WebhookSignatureService {
            verifier: Arc::clone(&self.verifier),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct WebhookSignatureService<S, V> {
    verifier: Arc<V>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B, V> Service<ServiceRequest> for WebhookSignatureService<S, V>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
    V: WebhookVerifier + 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let verifier = Arc::clone(&self.verifier);
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature");
            if !enabled {
                trace!("🔐️ Webhook signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let headers = WebhookHeaders::from_lookup(|name| {
                req.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from)
            })
            .ok_or_else(|| {
                warn!("🔐️ Webhook delivery without PayPal transmission headers. Denying access.");
                ServerError::InvalidSignature
            })?;
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract webhook body: {e:?}");
                ServerError::InvalidRequestBody("Failed to extract request data.".into())
            })?;
            match verifier.verify(&headers, data.as_ref()).await {
                Ok(true) => {
                    trace!("🔐️ Webhook signature for transmission {} ✅️", headers.transmission_id);
                    req.set_payload(bytes_to_payload(data));
                    service.call(req).await
                },
                Ok(false) => {
                    warn!("🔐️ Invalid signature on webhook transmission {}. Denying access.", headers.transmission_id);
                    Err(ServerError::InvalidSignature.into())
                },
                Err(e) => {
                    error!("🔐️ Could not verify webhook transmission {}. {e}", headers.transmission_id);
                    Err(ServerError::VerificationUnavailable(e.to_string()).into())
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
