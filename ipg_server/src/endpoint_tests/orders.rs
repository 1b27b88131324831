use actix_web::{http::StatusCode, test::TestRequest};
use ipg_engine::db_types::OrderStatus;
use paypal_tools::{OrderStatusCode, PayPalApiError};
use serde_json::json;

use super::{
    helpers::{captured_order, expect_creates, issue, json_body, send, test_service, with_token, USER_TOKEN},
    mocks::{MockGateway, MockVerifier},
};

#[actix_web::test]
async fn health() {
    let (_dir, service) = test_service(MockGateway::new());
    let (status, body) = send(&service, MockVerifier::new(), TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn creating_an_order_needs_a_token() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().never();
    let (_dir, service) = test_service(gateway);
    let req = TestRequest::post().uri("/orders").set_json(json!({"customer": "ACME", "amount_minor": 12000}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error_kind"], "AUTH");

    let req = with_token(TestRequest::post().uri("/orders"), "not-a-token")
        .set_json(json!({"customer": "ACME", "amount_minor": 12000}));
    let (status, _) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(service.list_history().await.unwrap().is_empty());
}

#[actix_web::test]
async fn create_order() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().times(1).returning(|req| {
        assert_eq!(req.currency, "JPY");
        assert_eq!(req.amount_minor.value(), 12000);
        assert!(req.return_url.starts_with("https://pay.example.com/orders/"));
        assert!(req.return_url.ends_with("/return"));
        Ok(ipg_engine::CreatedOrder {
            order_id: "5O190127TN364715T".into(),
            approval_url: "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T".into(),
        })
    });
    let (_dir, service) = test_service(gateway);
    let req = with_token(TestRequest::post().uri("/orders"), USER_TOKEN)
        .set_json(json!({"customer": "ACME", "amount_minor": 12000}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["status"], "ISSUED");
    assert_eq!(body["approval_url"], "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T");
    let local_id = body["local_id"].as_str().unwrap().to_string();

    let req = with_token(TestRequest::get().uri(&format!("/orders/{local_id}")), USER_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["paypal_order_id"], "5O190127TN364715T");
    assert_eq!(body["customer"], "ACME");
}

#[actix_web::test]
async fn invalid_orders_are_rejected() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().never();
    let (_dir, service) = test_service(gateway);
    let req = with_token(TestRequest::post().uri("/orders"), USER_TOKEN)
        .set_json(json!({"customer": "ACME", "amount_minor": 0}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error_kind"], "INVALID_REQUEST");

    let req = with_token(TestRequest::post().uri("/orders"), USER_TOKEN)
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"customer\": ");
    let (status, _) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(service.list_history().await.unwrap().is_empty());
}

#[actix_web::test]
async fn paypal_refusing_the_order_is_a_bad_gateway() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_order().returning(|_| Err(PayPalApiError::Auth("invalid_client".into())));
    let (_dir, service) = test_service(gateway);
    let req = with_token(TestRequest::post().uri("/orders"), USER_TOKEN)
        .set_json(json!({"customer": "ACME", "amount_minor": 5000}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&body)["error_kind"], "AUTH");

    // The failed attempt is kept
    let days = service.list_history().await.unwrap();
    let records = service.history_for(&days[0]).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, OrderStatus::Error);
}

#[actix_web::test]
async fn unknown_orders() {
    let (_dir, service) = test_service(MockGateway::new());
    let req = with_token(TestRequest::get().uri("/orders/20250101-deadbeef"), USER_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error_kind"], "NOT_FOUND");
}

#[actix_web::test]
async fn buyer_return_captures_the_payment() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_capture_order().times(1).returning(|id| Ok(captured_order(id)));
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    // No token: PayPal redirects the buyer's browser here
    let req = TestRequest::get().uri(&format!("/orders/{}/return", order.local_id));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["capture_id"], "CAP-PP-1");

    // Coming back twice does not capture twice
    let req = TestRequest::get().uri(&format!("/orders/{}/return", order.local_id));
    let (status, _) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn abandoned_checkout_refreshes_the_record() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_get_order().times(1).returning(|id| {
        Ok(paypal_tools::PayPalOrder { id: id.to_string(), status: OrderStatusCode::Voided, ..Default::default() })
    });
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;
    let req = TestRequest::get().uri(&format!("/orders/{}/cancelled", order.local_id));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json_body(&body)["status"], "CANCELLED");
}

#[actix_web::test]
async fn refresh_and_capture_by_operators() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_get_order().times(1).returning(|id| {
        Ok(paypal_tools::PayPalOrder { id: id.to_string(), status: OrderStatusCode::Approved, ..Default::default() })
    });
    gateway.expect_capture_order().times(1).returning(|id| Ok(captured_order(id)));
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    let req = with_token(TestRequest::post().uri(&format!("/orders/{}/refresh", order.local_id)), USER_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(service.fetch_order(&order.local_id).await.unwrap().status, OrderStatus::Approved);

    let req = with_token(TestRequest::post().uri(&format!("/orders/{}/capture", order.local_id)), USER_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json_body(&body)["status"], "COMPLETED");
}
