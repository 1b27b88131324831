//! The seams between the engine and the payment provider.
mod mapping;
mod paypal;

use ipg_common::MinorUnits;
pub use mapping::{latest_capture_id, local_status_for};
use paypal_tools::{data_objects::WebhookHeaders, PayPalApiError, PayPalOrder, Refund};

/// What the engine needs to create a remote order for an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Our reference for the order, sent to PayPal as the invoice id
    pub reference: String,
    pub description: String,
    pub amount_minor: MinorUnits,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub approval_url: String,
}

/// Remote order operations. Implementations handle authentication, rate limiting and retries themselves; errors that
/// reach the engine are final.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalApiError>;

    async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError>;

    /// Captures an approved order. Capturing an already captured order is not an error.
    async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError>;

    /// Refunds a capture, fully if `amount` is `None`.
    async fn refund_capture(
        &self,
        capture_id: &str,
        amount: Option<MinorUnits>,
        currency: &str,
    ) -> Result<Refund, PayPalApiError>;

    /// Best-effort cancellation. `true` when the order can no longer be paid.
    ///
    /// Open authorizations are voided. A capture-intent order that was never captured cannot be cancelled at PayPal,
    /// so for those `true` means the order was abandoned locally and is left to expire there.
    async fn cancel_order(&self, order_id: &str) -> Result<bool, PayPalApiError>;
}

/// Authenticates webhook deliveries.
#[allow(async_fn_in_trait)]
pub trait WebhookVerifier {
    /// `Ok(false)` means the delivery is not authentic. `Err` means the question could not be answered.
    async fn verify(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<bool, PayPalApiError>;
}
