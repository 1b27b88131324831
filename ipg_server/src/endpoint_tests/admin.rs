use actix_web::{http::StatusCode, test::TestRequest};
use ipg_engine::db_types::OrderStatus;
use paypal_tools::{Refund, RefundStatus};
use serde_json::json;

use super::{
    helpers::{captured_order, expect_creates, issue, json_body, send, test_service, with_token, ADMIN_TOKEN, USER_TOKEN},
    mocks::{MockGateway, MockVerifier},
};

#[actix_web::test]
async fn operators_cannot_use_admin_routes() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_cancel_order().never();
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;

    let req = with_token(TestRequest::post().uri(&format!("/admin/orders/{}/cancel", order.local_id)), USER_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["error_kind"], "FORBIDDEN");

    let (status, _) = send(&service, MockVerifier::new(), TestRequest::get().uri("/admin/history")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(service.fetch_order(&order.local_id).await.unwrap().status, OrderStatus::Issued);
}

#[actix_web::test]
async fn cancel_order() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_cancel_order().returning(|id| Ok(id == "PP-1"));
    let (_dir, service) = test_service(gateway);
    let open = issue(&service, "ACME", 8000).await;
    let paid_elsewhere = issue(&service, "Initech", 9000).await;

    let req = with_token(TestRequest::post().uri(&format!("/admin/orders/{}/cancel", open.local_id)), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json_body(&body)["status"], "CANCELLED");

    // PayPal says PP-2 was already captured
    let req = with_token(
        TestRequest::post().uri(&format!("/admin/orders/{}/cancel", paid_elsewhere.local_id)),
        ADMIN_TOKEN,
    );
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_body(&body)["error_kind"], "CONFLICT");
    assert_eq!(service.fetch_order(&paid_elsewhere.local_id).await.unwrap().status, OrderStatus::Issued);
}

#[actix_web::test]
async fn refunds() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_capture_order().returning(|id| Ok(captured_order(id)));
    gateway.expect_refund_capture().times(2).returning(|capture_id, amount, currency| {
        assert_eq!(currency, "JPY");
        let id = match amount {
            Some(a) => format!("RF-{capture_id}-{}", a.value()),
            None => format!("RF-{capture_id}"),
        };
        Ok(Refund { id, status: RefundStatus::Completed, ..Default::default() })
    });
    let (_dir, service) = test_service(gateway);
    let first = issue(&service, "ACME", 10_000).await;
    let second = issue(&service, "Initech", 2_500).await;
    service.capture(&first.local_id).await.unwrap();
    service.capture(&second.local_id).await.unwrap();

    let uri = format!("/admin/orders/{}/refund", first.local_id);
    let req = with_token(TestRequest::post().uri(&uri), ADMIN_TOKEN).set_json(json!({"amount_minor": 20_000}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error_kind"], "INVALID_REQUEST");

    let req = with_token(TestRequest::post().uri(&uri), ADMIN_TOKEN).set_json(json!({"amount_minor": 4_000}));
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["status"], "REFUNDED");
    assert!(body["note"].as_str().unwrap().starts_with("Partially refunded 4000 JPY"));

    // An empty body refunds everything
    let req = with_token(TestRequest::post().uri(&format!("/admin/orders/{}/refund", second.local_id)), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(json_body(&body)["note"], "Refunded in full (refund RF-CAP-PP-2)");

    // Refunded records are final
    let req = with_token(TestRequest::post().uri(&uri), ADMIN_TOKEN);
    let (status, _) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn history() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    let (_dir, service) = test_service(gateway);
    let order = issue(&service, "ACME", 8000).await;
    let day = order.day();

    let req = with_token(TestRequest::get().uri("/admin/history"), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!([day.as_str()]));

    let req = with_token(TestRequest::get().uri(&format!("/admin/history/{day}")), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["local_id"], order.local_id.as_str());

    let req = with_token(TestRequest::get().uri("/admin/history/2025-01-01"), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error_kind"], "INVALID_REQUEST");

    let req = with_token(TestRequest::get().uri("/admin/history/19990101"), ADMIN_TOKEN);
    let (status, _) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn refresh_a_day() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_get_order().returning(|id| {
        if id == "PP-1" {
            Ok(captured_order(id))
        } else {
            Err(paypal_tools::PayPalApiError::Transient("connection reset".into()))
        }
    });
    let (_dir, service) = test_service(gateway);
    let first = issue(&service, "ACME", 8000).await;
    issue(&service, "Initech", 9000).await;

    let req = with_token(TestRequest::post().uri(&format!("/admin/history/{}/refresh", first.day())), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["changed"], 1);
    assert_eq!(body["errors"], 1);
    assert_eq!(body["failures"][0]["error_kind"], "TRANSIENT");
    assert_eq!(service.fetch_order(&first.local_id).await.unwrap().status, OrderStatus::Completed);

    let req = with_token(TestRequest::post().uri("/admin/history/refresh_all"), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["partitions"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"], 1);
}

#[actix_web::test]
async fn delete_all() {
    let mut gateway = MockGateway::new();
    expect_creates(&mut gateway);
    gateway.expect_capture_order().returning(|id| Ok(captured_order(id)));
    gateway.expect_cancel_order().times(2).returning(|_| Ok(true));
    let (_dir, service) = test_service(gateway);
    issue(&service, "ACME", 8000).await;
    issue(&service, "Initech", 9000).await;
    let paid = issue(&service, "Globex", 1000).await;
    service.capture(&paid.local_id).await.unwrap();

    let req = with_token(TestRequest::post().uri("/admin/history/delete_all"), ADMIN_TOKEN);
    let (status, body) = send(&service, MockVerifier::new(), req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body = json_body(&body);
    assert_eq!(body["deleted_files"], 1);
    assert_eq!(body["deleted_records"], 3);
    assert_eq!(body["cancelled_orders"], 2);
    assert_eq!(body["failed_cancels"], 0);
    assert!(service.list_history().await.unwrap().is_empty());
}
