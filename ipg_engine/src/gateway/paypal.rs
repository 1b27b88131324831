use ipg_common::MinorUnits;
use log::*;
use paypal_tools::{data_objects::WebhookHeaders, Money, NewOrderRequest, PayPalApi, PayPalApiError, PayPalOrder, Refund};

use super::{CreatedOrder, OrderRequest, PaymentGateway, WebhookVerifier};

impl PaymentGateway for PayPalApi {
    async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalApiError> {
        let amount = Money::new(&request.currency, request.amount_minor.to_decimal_string(&request.currency));
        let body = NewOrderRequest::for_invoice(
            &request.reference,
            &request.description,
            amount,
            &request.return_url,
            &request.cancel_url,
        );
        let order = PayPalApi::create_order(self, &body).await?;
        let approval_url = order.approval_url().map(String::from).ok_or_else(|| {
            error!("💳️ PayPal order {} was created without an approval link", order.id);
            PayPalApiError::Protocol(format!("Order {} has no approval link", order.id))
        })?;
        Ok(CreatedOrder { order_id: order.id, approval_url })
    }

    async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        PayPalApi::get_order(self, order_id).await
    }

    async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError> {
        PayPalApi::capture_order(self, order_id).await
    }

    async fn refund_capture(
        &self,
        capture_id: &str,
        amount: Option<MinorUnits>,
        currency: &str,
    ) -> Result<Refund, PayPalApiError> {
        let amount = amount.map(|a| Money::new(currency, a.to_decimal_string(currency)));
        PayPalApi::refund_capture(self, capture_id, amount).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, PayPalApiError> {
        PayPalApi::cancel_order(self, order_id).await
    }
}

impl WebhookVerifier for PayPalApi {
    async fn verify(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<bool, PayPalApiError> {
        self.verify_webhook_signature(headers, body).await
    }
}
