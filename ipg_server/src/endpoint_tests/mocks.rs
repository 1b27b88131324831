use ipg_common::MinorUnits;
use ipg_engine::{CreatedOrder, OrderRequest, PaymentGateway, WebhookVerifier};
use mockall::mock;
use paypal_tools::{PayPalApiError, PayPalOrder, Refund, WebhookHeaders};

mock! {
    pub Gateway {}
    impl PaymentGateway for Gateway {
        async fn create_order(&self, request: &OrderRequest) -> Result<CreatedOrder, PayPalApiError>;
        async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError>;
        async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalApiError>;
        async fn refund_capture(&self, capture_id: &str, amount: Option<MinorUnits>, currency: &str) -> Result<Refund, PayPalApiError>;
        async fn cancel_order(&self, order_id: &str) -> Result<bool, PayPalApiError>;
    }
}

mock! {
    pub Verifier {}
    impl WebhookVerifier for Verifier {
        async fn verify(&self, headers: &WebhookHeaders, body: &[u8]) -> Result<bool, PayPalApiError>;
    }
}
