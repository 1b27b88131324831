use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use ipg_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderStatusChangedEvent},
    CancelSignal,
    JsonFileStore,
    OrderStore,
    PaymentGateway,
    PaymentService,
    WebhookVerifier,
};
use log::*;
use paypal_tools::PayPalApi;

use crate::{
    auth::AccessTokens,
    config::ServerConfig,
    errors::ServerError,
    middleware::{AccessTokenMiddlewareFactory, WebhookSignatureFactory},
    reconcile_worker::start_reconcile_worker,
    routes::{
        health,
        CancelOrderRoute,
        CaptureOrderRoute,
        CreateOrderRoute,
        DeleteAllRoute,
        HistoryForDayRoute,
        HistoryRoute,
        OrderByIdRoute,
        OrderCancelledRoute,
        OrderReturnRoute,
        PaypalWebhookRoute,
        RefreshAllRoute,
        RefreshDayRoute,
        RefreshOrderRoute,
        RefundOrderRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 64;

pub type LiveService = PaymentService<JsonFileStore, PayPalApi>;

/// Opens the history directory and the PayPal client, and composes them into the payment service.
///
/// The PayPal client is also returned on its own, since it verifies webhook signatures too.
pub fn build_service(
    config: &ServerConfig,
    producers: EventProducers,
) -> Result<(LiveService, Arc<PayPalApi>), ServerError> {
    let store = JsonFileStore::open(&config.results_dir)
        .map_err(|e| ServerError::InitializeError(format!("Could not open {}. {e}", config.results_dir.display())))?;
    let paypal = PayPalApi::new(config.paypal.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let paypal = Arc::new(paypal);
    let service = PaymentService::from_shared(Arc::new(store), Arc::clone(&paypal), producers, config.service_options());
    Ok((service, paypal))
}

/// Every status change is written to the `ipg::audit` log target.
pub fn audit_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_status_changed(|ev: OrderStatusChangedEvent| {
        Box::pin(async move {
            let order = &ev.order;
            info!(
                target: "ipg::audit",
                "{} {} → {} paypal_order_id={} amount={} {}",
                order.local_id,
                ev.previous,
                order.status,
                order.paypal_order_id.as_deref().unwrap_or("-"),
                order.amount_display(),
                order.note.as_deref().unwrap_or("")
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, audit_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();
    let (service, paypal) = build_service(&config, producers)?;
    let stop = CancelSignal::new();
    if let Some(period) = config.reconciler_interval {
        start_reconcile_worker(service.clone(), period, stop.clone());
    }
    let srv = create_server_instance(config, service, paypal)?;
    let result = srv.await;
    stop.cancel();
    result.map_err(ServerError::from)
}

pub fn create_server_instance<S, G, V>(
    config: ServerConfig,
    service: PaymentService<S, G>,
    verifier: Arc<V>,
) -> Result<Server, ServerError>
where
    S: OrderStore + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    V: WebhookVerifier + Send + Sync + 'static,
{
    let tokens = Arc::new(config.access_tokens.clone());
    let signature_checks = config.webhook_signature_checks;
    let srv = HttpServer::new(move || {
        let tokens = Arc::clone(&tokens);
        let verifier = Arc::clone(&verifier);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ipg::access_log"))
            .app_data(web::Data::new(service.clone()))
            .configure(|cfg| configure_routes::<S, G, V>(cfg, tokens, verifier, signature_checks))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Server listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Registers every route. The payment service must already be in the app data.
pub fn configure_routes<S, G, V>(
    cfg: &mut web::ServiceConfig,
    tokens: Arc<AccessTokens>,
    verifier: Arc<V>,
    signature_checks: bool,
) where
    S: OrderStore + 'static,
    G: PaymentGateway + 'static,
    V: WebhookVerifier + 'static,
{
    let webhook_scope = web::scope("/webhook")
        .wrap(WebhookSignatureFactory::new(verifier, signature_checks))
        .service(PaypalWebhookRoute::<S, G>::new());
    let admin_scope = web::scope("/admin")
        .wrap(AccessTokenMiddlewareFactory::new(Arc::clone(&tokens)))
        .service(CancelOrderRoute::<S, G>::new())
        .service(RefundOrderRoute::<S, G>::new())
        .service(HistoryRoute::<S, G>::new())
        .service(RefreshAllRoute::<S, G>::new())
        .service(DeleteAllRoute::<S, G>::new())
        .service(HistoryForDayRoute::<S, G>::new())
        .service(RefreshDayRoute::<S, G>::new());
    // Everything else needs an access token
    let operator_scope = web::scope("")
        .wrap(AccessTokenMiddlewareFactory::new(tokens))
        .service(CreateOrderRoute::<S, G>::new())
        .service(OrderByIdRoute::<S, G>::new())
        .service(RefreshOrderRoute::<S, G>::new())
        .service(CaptureOrderRoute::<S, G>::new());
    cfg.service(health)
        .service(OrderReturnRoute::<S, G>::new())
        .service(OrderCancelledRoute::<S, G>::new())
        .service(webhook_scope)
        .service(admin_scope)
        .service(operator_scope);
}
