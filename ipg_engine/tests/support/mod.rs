#![allow(dead_code)]
//! Shared fixtures: a scripted in-memory PayPal, and a service over a temporary history directory.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use ipg_common::MinorUnits;
use ipg_engine::{
    db_types::{DayStamp, InvoiceOrder, LocalId, NewInvoice, OrderStatus},
    events::EventProducers,
    store::PartitionDocument,
    CreatedOrder,
    JsonFileStore,
    OrderRequest,
    PaymentGateway,
    PaymentService,
    ServiceOptions,
};
use paypal_tools::{
    data_objects::{LinkDescription, Payments, PurchaseUnit},
    Capture,
    CaptureStatus,
    OrderStatusCode,
    PayPalApiError,
    PayPalOrder,
    Refund,
    RefundStatus,
    WebhookEvent,
};
use tempfile::TempDir;

#[derive(Default)]
struct FakeState {
    next_id: u32,
    orders: HashMap<String, PayPalOrder>,
    get_failures: HashMap<String, VecDeque<PayPalApiError>>,
    cancel_results: HashMap<String, Result<bool, PayPalApiError>>,
    create_failure: Option<PayPalApiError>,
    calls: Vec<String>,
}

/// A PayPal stand-in whose orders and failures are scripted by the test.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn insert_order(&self, order: PayPalOrder) {
        self.with_state(|s| s.orders.insert(order.id.clone(), order));
    }

    pub fn order(&self, id: &str) -> Option<PayPalOrder> {
        self.with_state(|s| s.orders.get(id).cloned())
    }

    pub fn set_status(&self, id: &str, status: OrderStatusCode) {
        self.with_state(|s| {
            if let Some(order) = s.orders.get_mut(id) {
                order.status = status;
            }
        });
    }

    pub fn add_capture(&self, id: &str, status: CaptureStatus) {
        self.with_state(|s| {
            if let Some(order) = s.orders.get_mut(id) {
                add_capture(order, status);
            }
        });
    }

    /// The next `times` lookups of `id` fail with `err`.
    pub fn fail_get(&self, id: &str, err: PayPalApiError, times: usize) {
        self.with_state(|s| s.get_failures.entry(id.to_string()).or_default().extend(std::iter::repeat(err).take(times)));
    }

    pub fn forget(&self, id: &str) {
        self.with_state(|s| s.orders.remove(id));
    }

    pub fn script_cancel(&self, id: &str, result: Result<bool, PayPalApiError>) {
        self.with_state(|s| s.cancel_results.insert(id.to_string(), result));
    }

    pub fn fail_create(&self, err: PayPalApiError) {
        self.with_state(|s| s.create_failure = Some(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    fn record(&self, call: String) {
        self.with_state(|s| s.calls.push(call));
    }
}

pub fn remote_order(id: &str, status: OrderStatusCode) -> PayPalOrder {
    PayPalOrder {
        id: id.to_string(),
        status,
        intent: Some("CAPTURE".into()),
        links: vec![LinkDescription {
            href: format!("https://www.sandbox.paypal.com/checkoutnow?token={id}"),
            rel: "payer-action".into(),
            method: Some("GET".into()),
        }],
        purchase_units: vec![PurchaseUnit::default()],
        ..Default::default()
    }
}

fn add_capture(order: &mut PayPalOrder, status: CaptureStatus) {
    let capture = Capture { id: format!("CAP-{}", order.id), status, ..Default::default() };
    if let Some(unit) = order.purchase_units.first_mut() {
        unit.payments.get_or_insert_with(Payments::default).captures.push(capture);
    }
}

impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalApiError> {
        self.record(format!("create:{}", request.reference));
        if let Some(err) = self.with_state(|s| s.create_failure.take()) {
            return Err(err);
        }
        let id = self.with_state(|s| {
            s.next_id += 1;
            format!("PP-{:04}", s.next_id)
        });
        let order = remote_order(&id, OrderStatusCode::PayerActionRequired);
        let approval_url = order.approval_url().unwrap_or_default().to_string();
        self.insert_order(order);
        Ok(CreatedOrder { order_id: id, approval_url })
    }

    async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        self.record(format!("get:{order_id}"));
        if let Some(err) = self.with_state(|s| s.get_failures.get_mut(order_id).and_then(|q| q.pop_front())) {
            return Err(err);
        }
        self.order(order_id).ok_or_else(|| PayPalApiError::NotFound(format!("{order_id} RESOURCE_NOT_FOUND")))
    }

    async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        self.record(format!("capture:{order_id}"));
        self.with_state(|s| {
            let order = s.orders.get_mut(order_id).ok_or_else(|| PayPalApiError::NotFound(order_id.to_string()))?;
            match order.status {
                OrderStatusCode::Completed => {},
                OrderStatusCode::Approved => {
                    order.status = OrderStatusCode::Completed;
                    add_capture(order, CaptureStatus::Completed);
                },
                _ => return Err(PayPalApiError::Conflict("ORDER_NOT_APPROVED".into())),
            }
            Ok(order.clone())
        })
    }

    async fn refund_capture(
        &self,
        capture_id: &str,
        amount: Option<MinorUnits>,
        _currency: &str,
    ) -> Result<Refund, PayPalApiError> {
        self.record(format!("refund:{capture_id}"));
        self.with_state(|s| {
            let capture = s
                .orders
                .values_mut()
                .flat_map(|o| o.purchase_units.iter_mut())
                .filter_map(|u| u.payments.as_mut())
                .flat_map(|p| p.captures.iter_mut())
                .find(|c| c.id == capture_id)
                .ok_or_else(|| PayPalApiError::NotFound(capture_id.to_string()))?;
            capture.status = if amount.is_some() { CaptureStatus::PartiallyRefunded } else { CaptureStatus::Refunded };
            Ok(Refund { id: format!("RF-{capture_id}"), status: RefundStatus::Completed, amount: None })
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, PayPalApiError> {
        self.record(format!("cancel:{order_id}"));
        if let Some(result) = self.with_state(|s| s.cancel_results.get(order_id).cloned()) {
            return result;
        }
        Ok(self.with_state(|s| match s.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatusCode::Completed => false,
            Some(order) => {
                order.status = OrderStatusCode::Voided;
                true
            },
            None => true,
        }))
    }
}

pub type TestService = PaymentService<JsonFileStore, FakeGateway>;

pub struct TestEnv {
    pub dir: TempDir,
    pub store: Arc<JsonFileStore>,
    pub gateway: Arc<FakeGateway>,
    pub service: TestService,
}

pub fn setup() -> TestEnv {
    setup_with_producers(EventProducers::default())
}

pub fn setup_with_producers(producers: EventProducers) -> TestEnv {
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let gateway = Arc::new(FakeGateway::default());
    let options = ServiceOptions { public_url: "https://invoices.example.com".into(), concurrency: 2 };
    let service = PaymentService::from_shared(Arc::clone(&store), Arc::clone(&gateway), producers, options);
    TestEnv { dir, store, gateway, service }
}

impl TestEnv {
    pub async fn issue(&self, customer: &str, amount: u64) -> InvoiceOrder {
        self.service.create_order(NewInvoice::new(customer, amount, "JPY")).await.unwrap()
    }

    pub async fn status_of(&self, local_id: &LocalId) -> OrderStatus {
        self.service.fetch_order(local_id).await.unwrap().status
    }

    /// Writes a history file for `day` holding one record per status, each with a matching remote order.
    pub fn seed_partition(&self, day: &str, statuses: &[OrderStatus]) -> Vec<InvoiceOrder> {
        let day: DayStamp = day.parse().unwrap();
        let created_at = day.start_of_day();
        let items = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let remote_id = format!("PP-{day}-{i}");
                let mut remote = remote_order(&remote_id, remote_status_for(*status));
                if matches!(status, OrderStatus::Completed | OrderStatus::Refunded) {
                    let capture = if *status == OrderStatus::Refunded { CaptureStatus::Refunded } else { CaptureStatus::Completed };
                    add_capture(&mut remote, capture);
                }
                self.gateway.insert_order(remote);
                let draft = NewInvoice::new(format!("customer {i}"), 1_000 * (i as u64 + 1), "JPY");
                let mut order = InvoiceOrder::new_draft(LocalId(format!("{day}-{i:08x}")), created_at, draft);
                order.status = *status;
                order.paypal_order_id = Some(remote_id.clone());
                order.approval_url = Some(format!("https://www.sandbox.paypal.com/checkoutnow?token={remote_id}"));
                order
            })
            .collect::<Vec<_>>();
        let doc = PartitionDocument { day: day.clone(), items: items.clone() };
        std::fs::write(self.store.partition_path(&day), serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
        items
    }
}

fn remote_status_for(status: OrderStatus) -> OrderStatusCode {
    match status {
        OrderStatus::Draft | OrderStatus::Issued | OrderStatus::Expired | OrderStatus::Error => OrderStatusCode::Created,
        OrderStatus::Approved => OrderStatusCode::Approved,
        OrderStatus::Completed | OrderStatus::Refunded => OrderStatusCode::Completed,
        OrderStatus::Cancelled => OrderStatusCode::Voided,
    }
}

/// A webhook delivery for `order_id`, shaped the way PayPal sends it.
pub fn webhook_event(event_id: &str, event_type: &str, order_id: &str, create_time: DateTime<Utc>) -> WebhookEvent {
    let resource = if event_type.starts_with("CHECKOUT.ORDER.") {
        serde_json::json!({ "id": order_id, "status": "APPROVED" })
    } else {
        serde_json::json!({
            "id": format!("CAP-{order_id}"),
            "status": "COMPLETED",
            "supplementary_data": { "related_ids": { "order_id": order_id } }
        })
    };
    WebhookEvent {
        id: event_id.to_string(),
        event_type: event_type.to_string(),
        create_time,
        resource_type: None,
        summary: None,
        resource,
    }
}
