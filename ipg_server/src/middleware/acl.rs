//! Access control list middleware.
//!
//! Place it on any route or scope behind the access token middleware. It checks the [`Principal`] of the request
//! against the roles the route requires, and answers 403 if any is missing.
use std::{pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::{
    future::{ok, Ready},
    Future,
};
use log::*;

use crate::{
    auth::{Principal, Role},
    errors::ServerError,
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let principal = req.extensions().get::<Principal>().cloned().ok_or_else(|| {
                warn!("🔐️ No principal found in request extensions. Is the access token middleware missing?");
                ServerError::Unauthenticated
            })?;
            if required_roles.iter().all(|role| principal.has_role(*role)) {
                service.call(req).await
            } else {
                let roles = required_roles.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
                info!("🔐️ {} tried to call {} without the {roles} role(s)", principal.name, req.path());
                Err(ServerError::InsufficientPermissions(format!("This call requires the {roles} role(s)")).into())
            }
        })
    }
}
