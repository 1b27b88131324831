//! Resolves the `ipg_access_token` header to a [`Principal`] and stores it in the request extensions.
//!
//! Requests without a known token are rejected with a 401 before they reach a handler.
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::*;

use crate::{
    auth::{AccessTokens, Principal, ACCESS_TOKEN_HEADER},
    errors::ServerError,
};

pub struct AccessTokenMiddlewareFactory {
    tokens: Arc<AccessTokens>,
}

impl AccessTokenMiddlewareFactory {
    pub fn new(tokens: Arc<AccessTokens>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessTokenMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AccessTokenMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessTokenMiddlewareService { tokens: Arc::clone(&self.tokens), service: Rc::new(service) }))
    }
}

pub struct AccessTokenMiddlewareService<S> {
    tokens: Arc<AccessTokens>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AccessTokenMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let principal: Option<Principal> = req
            .headers()
            .get(ACCESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|token| self.tokens.authenticate(token))
            .cloned();
        Box::pin(async move {
            let Some(principal) = principal else {
                debug!("🔐️ No valid access token on request to {}", req.path());
                return Err(ServerError::Unauthenticated.into());
            };
            trace!("🔐️ Request to {} authenticated as {}", req.path(), principal.name);
            req.extensions_mut().insert(principal);
            service.call(req).await
        })
    }
}
