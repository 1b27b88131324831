use actix_web::{http::StatusCode, test::TestRequest};
use chrono::Utc;
use ipg_engine::db_types::OrderStatus;
use paypal_tools::{PayPalApiError, WebhookHeaders};

use super::{
    helpers::{expect_creates, issue, json_body, send, test_service, webhook_body, webhook_request},
    mocks::{MockGateway, MockVerifier},
};

fn verifier_returning(result: Result<bool, PayPalApiError>) -> MockVerifier {
    let mut verifier = MockVerifier::new();
    verifier.expect_verify().times(1).returning(move |headers, body| {
        assert_eq!(headers.auth_algo, "SHA256withRSA");
        assert!(!body.is_empty());
        result.clone()
    });
    verifier
}

#[actix_web::test]
async fn verified_events_are_applied() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    let body = webhook_body("WH-1", "CHECKOUT.ORDER.APPROVED", "PP-1", Utc::now());
    let (status, body) = send(&service, verifier_returning(Ok(true)), webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["event_id"], "WH-1");
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["previous"], "ISSUED");
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(service.fetch_order(&order.local_id).await.unwrap().status, OrderStatus::Approved);

    // A redelivery is acknowledged and changes nothing
    let body = webhook_body("WH-1", "CHECKOUT.ORDER.APPROVED", "PP-1", Utc::now());
    let (status, body) = send(&service, verifier_returning(Ok(true)), webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["outcome"], "unchanged");
}

#[actix_web::test]
async fn forged_events_are_rejected() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    let body = webhook_body("WH-FORGED", "PAYMENT.CAPTURE.COMPLETED", "PP-1", Utc::now());
    let (status, body) = send(&service, verifier_returning(Ok(false)), webhook_request(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error_kind"], "SIGNATURE_INVALID");
    let stored = service.fetch_order(&order.local_id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Issued);
    assert!(stored.last_event_id.is_none());
}

#[actix_web::test]
async fn unsigned_events_are_rejected_without_asking_paypal() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;
    let mut verifier = MockVerifier::new();
    verifier.expect_verify().never();

    let req = TestRequest::post()
        .uri("/webhook/paypal")
        .insert_header((WebhookHeaders::TRANSMISSION_ID, "69cd13f0-d67a-11e5-baa3-778b53f4ae55"))
        .insert_header(("content-type", "application/json"))
        .set_payload(webhook_body("WH-2", "PAYMENT.CAPTURE.COMPLETED", "PP-1", Utc::now()));
    let (status, _) = send(&service, verifier, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(service.fetch_order(&order.local_id).await.unwrap().status, OrderStatus::Issued);
}

#[actix_web::test]
async fn verification_outage_asks_paypal_to_retry() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    let body = webhook_body("WH-3", "PAYMENT.CAPTURE.COMPLETED", "PP-1", Utc::now());
    let verifier = verifier_returning(Err(PayPalApiError::Transient("timed out".into())));
    let (status, _) = send(&service, verifier, webhook_request(body)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(service.fetch_order(&order.local_id).await.unwrap().status, OrderStatus::Issued);
}

#[actix_web::test]
async fn malformed_and_foreign_events() {
    let (_dir, service) = test_service(MockGateway::new());

    let req = webhook_request("{\"id\": \"WH-4\", \"event_type\": 7}".to_string());
    let (status, body) = send(&service, verifier_returning(Ok(true)), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error_kind"], "INVALID_REQUEST");

    let body = webhook_body("WH-5", "PAYMENT.CAPTURE.COMPLETED", "PP-SOMEONE-ELSE", Utc::now());
    let (status, body) = send(&service, verifier_returning(Ok(true)), webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["outcome"], "ignored");

    let body = webhook_body("WH-6", "BILLING.SUBSCRIPTION.CREATED", "PP-1", Utc::now());
    let (status, body) = send(&service, verifier_returning(Ok(true)), webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["outcome"], "ignored");
}
