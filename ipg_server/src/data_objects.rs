use ipg_common::{MinorUnits, DEFAULT_CURRENCY};
use ipg_engine::{
    db_types::{InvoiceOrder, LocalId, NewInvoice, OrderStatus},
    WebhookOutcome,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderParams {
    #[serde(default)]
    pub customer: String,
    pub amount_minor: u64,
    #[serde(default)]
    pub currency: Option<String>,
}

impl From<NewOrderParams> for NewInvoice {
    fn from(params: NewOrderParams) -> Self {
        let currency = params.currency.as_deref().map(str::trim).filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CURRENCY);
        NewInvoice::new(params.customer, params.amount_minor, &currency.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrderResponse {
    pub local_id: LocalId,
    pub status: OrderStatus,
    pub approval_url: Option<String>,
}

impl From<InvoiceOrder> for CreatedOrderResponse {
    fn from(order: InvoiceOrder) -> Self {
        Self { local_id: order.local_id, status: order.status, approval_url: order.approval_url }
    }
}

/// Body of `POST /admin/orders/{local_id}/refund`. Without an amount the capture is refunded in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    #[serde(default)]
    pub amount_minor: Option<u64>,
}

impl RefundParams {
    pub fn amount(&self) -> Option<MinorUnits> {
        self.amount_minor.map(MinorUnits::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub event_id: String,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}
