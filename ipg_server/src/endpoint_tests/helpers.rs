use std::sync::Arc;

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use chrono::{DateTime, Utc};
use ipg_common::Secret;
use ipg_engine::{
    db_types::{InvoiceOrder, NewInvoice},
    events::EventProducers,
    CreatedOrder,
    JsonFileStore,
    PaymentService,
    ServiceOptions,
};
use log::debug;
use paypal_tools::{
    data_objects::{Payments, PurchaseUnit},
    Capture,
    CaptureStatus,
    OrderStatusCode,
    PayPalOrder,
    WebhookHeaders,
};
use serde_json::{json, Value};
use tempfile::TempDir;

use super::mocks::{MockGateway, MockVerifier};
use crate::{
    auth::{AccessTokens, Principal, ACCESS_TOKEN_HEADER},
    server::configure_routes,
};

pub const USER_TOKEN: &str = "ops-7f3c9a";
pub const ADMIN_TOKEN: &str = "root-b41d0e";

pub type TestService = PaymentService<JsonFileStore, MockGateway>;

pub fn test_service(gateway: MockGateway) -> (TempDir, TestService) {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::open(dir.path()).unwrap();
    let options = ServiceOptions { public_url: "https://pay.example.com".into(), concurrency: 2 };
    (dir, PaymentService::new(store, gateway, EventProducers::default(), options))
}

/// PayPal hands out sequential ids `PP-1`, `PP-2`, ...
pub fn expect_creates(gateway: &mut MockGateway) {
    let mut count = 0;
    gateway.expect_create_order().returning(move |_| {
        count += 1;
        Ok(CreatedOrder {
            order_id: format!("PP-{count}"),
            approval_url: format!("https://www.sandbox.paypal.com/checkoutnow?token=PP-{count}"),
        })
    });
}

pub async fn issue(service: &TestService, customer: &str, amount: u64) -> InvoiceOrder {
    service.create_order(NewInvoice::new(customer, amount, "JPY")).await.unwrap()
}

pub fn captured_order(id: &str) -> PayPalOrder {
    let capture = Capture { id: format!("CAP-{id}"), status: CaptureStatus::Completed, ..Default::default() };
    PayPalOrder {
        id: id.to_string(),
        status: OrderStatusCode::Completed,
        purchase_units: vec![PurchaseUnit {
            payments: Some(Payments { captures: vec![capture], ..Default::default() }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn tokens() -> Arc<AccessTokens> {
    let mut tokens = AccessTokens::new();
    tokens
        .add(Secret::new(USER_TOKEN.to_string()), Principal::user("ops"))
        .add(Secret::new(ADMIN_TOKEN.to_string()), Principal::admin("root"));
    Arc::new(tokens)
}

pub fn with_token(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header((ACCESS_TOKEN_HEADER, token))
}

/// Sends `req` through the full route table. Errors raised by middleware are rendered the way the server would.
pub async fn send(service: &TestService, verifier: MockVerifier, req: TestRequest) -> (StatusCode, String) {
    let tokens = tokens();
    let verifier = Arc::new(verifier);
    let app = App::new()
        .app_data(web::Data::new(service.clone()))
        .configure(|cfg| configure_routes::<JsonFileStore, MockGateway, MockVerifier>(cfg, tokens, verifier, true));
    let app = test::init_service(app).await;
    debug!("Making request");
    let (status, body) = match test::try_call_service(&app, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            (status, res.into_body().try_into_bytes().unwrap_or_default())
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            (status, res.into_body().try_into_bytes().unwrap_or_default())
        },
    };
    (status, String::from_utf8_lossy(&body).into_owned())
}

pub fn json_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Not JSON ({e}): {body}"))
}

pub fn webhook_body(event_id: &str, event_type: &str, order_id: &str, create_time: DateTime<Utc>) -> String {
    let resource = if event_type.starts_with("CHECKOUT.ORDER.") {
        json!({ "id": order_id, "status": "APPROVED" })
    } else {
        json!({
            "id": format!("CAP-{order_id}"),
            "status": "COMPLETED",
            "supplementary_data": { "related_ids": { "order_id": order_id } }
        })
    };
    json!({
        "id": event_id,
        "event_type": event_type,
        "create_time": create_time,
        "resource_type": "checkout-order",
        "summary": "An event",
        "resource": resource,
    })
    .to_string()
}

pub fn webhook_request(body: String) -> TestRequest {
    TestRequest::post()
        .uri("/webhook/paypal")
        .insert_header((WebhookHeaders::AUTH_ALGO, "SHA256withRSA"))
        .insert_header((WebhookHeaders::CERT_URL, "https://api.sandbox.paypal.com/v1/notifications/certs/CERT-360caa42"))
        .insert_header((WebhookHeaders::TRANSMISSION_ID, "69cd13f0-d67a-11e5-baa3-778b53f4ae55"))
        .insert_header((WebhookHeaders::TRANSMISSION_SIG, "lmI95Jx3Y9nhR5SJWlHVIWpg4AgFk7n9bCHSRxbrd8A9zrhdu2rMyFrmz+Zjh3s3boXB07VXCXUZy/UFzUlnGJn0wDugt7FlSvdKeIJenLRemUxYCPVoEZzg9VFNqOa48gMkvF+XTpxBeUx/kWy6B5cp7GkT2+pOowfRK7OaynuxUoKW3JcMWw272VKjLTtTAShncla7tGF+55rxyt2KNZIIqxNMJ48RDZheGU5w1npu9dZHnPgTXB9iomeVRoD8O/jhRpnKsGrDschyNdkeh81BJJMH4Ctc6lnCCquoP/GzCzz33MMsNdid7vL/NIWaCsekQpW26FpWPi/tfj8nLA=="))
        .insert_header((WebhookHeaders::TRANSMISSION_TIME, "2025-01-01T10:00:00Z"))
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
}
