//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into the engine. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every store and PayPal call the handlers make is asynchronous, so
//! a slow PayPal response only parks the request that is waiting for it.
//!
//! Routes are grouped by who may call them:
//! * Public: `/health`, and the PayPal return and cancel landings that buyers' browsers are sent to.
//! * Operators (any valid access token): everything under `/orders`.
//! * Admins: everything under `/admin`.
//! * PayPal: `/webhook/paypal`, authenticated by its signature.
use std::future::Future;

use actix_web::{get, web, HttpResponse, Responder};
use ipg_engine::{
    db_types::{DayStamp, LocalId},
    CancelSignal,
    OrderStore,
    PaymentGateway,
    PaymentService,
};
use log::*;
use paypal_tools::WebhookEvent;

use crate::{
    auth::Principal,
    data_objects::{CreatedOrderResponse, NewOrderParams, RefundParams, WebhookAck},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ident),+ $(where requires [$($roles:expr),+])?) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                $( let res = res.wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+])); )?
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

fn parse_day(raw: &str) -> Result<DayStamp, ServerError> {
    raw.parse::<DayStamp>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))
}

/// Runs bulk work on its own task and waits for it. If the client goes away, only the wait is dropped; the work
/// carries on to the end and its report is logged.
async fn run_detached<F, T, E>(label: &'static str, work: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, E>> + 'static,
    T: 'static,
    E: Into<ServerError> + 'static,
{
    let task = actix_web::rt::spawn(async move {
        let result = work.await;
        if result.is_ok() {
            debug!("💻️ {label} has finished");
        }
        result
    });
    match task.await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(ServerError::BackgroundTaskFailed(format!("{label}. {e}"))),
    }
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl OrderStore, PaymentGateway);
/// Creates a record for an invoice and the PayPal order behind it.
///
/// Returns the new `local_id` and the `approval_url` the buyer must visit. If PayPal refuses the order, the record is
/// kept in `ERROR` and the PayPal failure is returned.
pub async fn create_order<S: OrderStore, G: PaymentGateway>(
    principal: Principal,
    body: web::Json<NewOrderParams>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST new order from {}", principal.name);
    let order = api.create_order(body.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(CreatedOrderResponse::from(order)))
}

route!(order_by_id => Get "/orders/{local_id}" impl OrderStore, PaymentGateway);
pub async fn order_by_id<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    trace!("💻️ GET order {local_id}");
    let order = api.fetch_order(&local_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(refresh_order => Post "/orders/{local_id}/refresh" impl OrderStore, PaymentGateway);
pub async fn refresh_order<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    debug!("💻️ POST refresh for {local_id}");
    let outcome = api.refresh(&local_id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(capture_order => Post "/orders/{local_id}/capture" impl OrderStore, PaymentGateway);
pub async fn capture_order<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    debug!("💻️ POST capture for {local_id}");
    let order = api.capture(&local_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Buyer landings  -------------------------------------------------
route!(order_return => Get "/orders/{local_id}/return" impl OrderStore, PaymentGateway);
/// PayPal sends the buyer here after they approve the payment. The payment is captured straight away.
pub async fn order_return<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    info!("💻️ Buyer returned from PayPal for {local_id}");
    let order = api.capture(&local_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(order_cancelled => Get "/orders/{local_id}/cancelled" impl OrderStore, PaymentGateway);
/// PayPal sends the buyer here if they abandon checkout. The order stays open at PayPal, so we only refresh it.
pub async fn order_cancelled<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    info!("💻️ Buyer left PayPal checkout for {local_id}");
    if let Err(e) = api.refresh(&local_id).await {
        // The buyer should still see the record
        warn!("💻️ Could not refresh {local_id} after an abandoned checkout. {e}");
    }
    let order = api.fetch_order(&local_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(cancel_order => Post "/orders/{local_id}/cancel" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
pub async fn cancel_order<S: OrderStore, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    info!("💻️ {} is cancelling {local_id}", principal.name);
    let order = api.cancel(&local_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(refund_order => Post "/orders/{local_id}/refund" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
pub async fn refund_order<S: OrderStore, G: PaymentGateway>(
    principal: Principal,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let local_id = LocalId::from(path.into_inner());
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        RefundParams::default()
    } else {
        serde_json::from_slice::<RefundParams>(&body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?
    };
    info!("💻️ {} is refunding {local_id} ({:?} minor units)", principal.name, params.amount_minor);
    let order = api.refund(&local_id, params.amount()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(history => Get "/history" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
pub async fn history<S: OrderStore, G: PaymentGateway>(
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let days = api.list_history().await?;
    Ok(HttpResponse::Ok().json(days))
}

route!(refresh_all => Post "/history/refresh_all" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
/// Reconciles every partition with PayPal. The refresh runs to completion even if the caller disconnects.
pub async fn refresh_all<S: OrderStore + 'static, G: PaymentGateway + 'static>(
    principal: Principal,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ {} requested a refresh of all history", principal.name);
    let service = api.get_ref().clone();
    let report =
        run_detached("Refresh of all history", async move { service.refresh_all(&CancelSignal::new()).await }).await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(delete_all => Post "/history/delete_all" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
/// Cancels every open PayPal order and deletes every history partition.
///
/// Once started, the deletion is not abandoned half way when the caller disconnects.
pub async fn delete_all<S: OrderStore + 'static, G: PaymentGateway + 'static>(
    principal: Principal,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    warn!("💻️ {} requested deletion of all history", principal.name);
    let service = api.get_ref().clone();
    let report = run_detached("Deletion of all history", async move {
        service.delete_all_with_cancel(&CancelSignal::new()).await
    })
    .await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(history_for_day => Get "/history/{day}" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
pub async fn history_for_day<S: OrderStore, G: PaymentGateway>(
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let day = parse_day(&path)?;
    let records = api.history_for(&day).await?;
    Ok(HttpResponse::Ok().json(records))
}

route!(refresh_day => Post "/history/{day}/refresh" impl OrderStore, PaymentGateway where requires [crate::auth::Role::Admin]);
pub async fn refresh_day<S: OrderStore + 'static, G: PaymentGateway + 'static>(
    principal: Principal,
    path: web::Path<String>,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let day = parse_day(&path)?;
    info!("💻️ {} requested a refresh of {day}", principal.name);
    let service = api.get_ref().clone();
    let report = run_detached("Partition refresh", async move {
        service.refresh_history(&day, &CancelSignal::new()).await
    })
    .await?;
    Ok(HttpResponse::Ok().json(report))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(paypal_webhook => Post "/paypal" impl OrderStore, PaymentGateway);
/// Applies a PayPal event. The signature has already been checked by the middleware on this scope.
///
/// Events we cannot use are acknowledged with a 200 so that PayPal stops sending them. Only storage failures produce
/// a 5xx, which makes PayPal deliver the event again later.
pub async fn paypal_webhook<S: OrderStore, G: PaymentGateway>(
    body: web::Bytes,
    api: web::Data<PaymentService<S, G>>,
) -> Result<HttpResponse, ServerError> {
    let event = serde_json::from_slice::<WebhookEvent>(&body).map_err(|e| {
        warn!("🪝️ Could not parse PayPal webhook body. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    debug!("🪝️ Received {} event {}", event.event_type, event.id);
    let outcome = api.ingest_event(&event).await?;
    Ok(HttpResponse::Ok().json(WebhookAck { event_id: event.id, outcome }))
}
