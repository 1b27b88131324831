use log::*;
use paypal_tools::WebhookEvent;

use super::{PaymentService, PaymentServiceError, WebhookOutcome};
use crate::{
    db_types::{OrderStatus, StatusUpdate},
    store::{OrderStore, StoreError},
};

/// The local status a PayPal event type implies, if the event type is one we act on.
pub fn target_status(event_type: &str) -> Option<OrderStatus> {
    match event_type {
        "CHECKOUT.ORDER.APPROVED" => Some(OrderStatus::Approved),
        "CHECKOUT.ORDER.COMPLETED" | "PAYMENT.CAPTURE.COMPLETED" => Some(OrderStatus::Completed),
        "PAYMENT.CAPTURE.DENIED" => Some(OrderStatus::Error),
        "PAYMENT.CAPTURE.REFUNDED" => Some(OrderStatus::Refunded),
        "CHECKOUT.ORDER.VOIDED" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

impl<S: OrderStore, G> PaymentService<S, G> {
    /// Applies a (verified) PayPal webhook event.
    ///
    /// Events that are not ours, that target records which no longer exist, or that would move a record backwards
    /// are ignored. Only storage failures are returned as errors, so that PayPal redelivers the event.
    pub async fn ingest_event(&self, event: &WebhookEvent) -> Result<WebhookOutcome, PaymentServiceError> {
        let ignored = |reason: String| {
            debug!("🪝️ Event {} ({}) ignored: {reason}", event.id, event.event_type);
            Ok(WebhookOutcome::Ignored { reason })
        };
        let Some(target) = target_status(&event.event_type) else {
            return ignored(format!("{} events are not handled", event.event_type));
        };
        let Some(remote_id) = event.related_order_id() else {
            return ignored("the event does not name a PayPal order".to_string());
        };
        let Some(order) = self.store.find_by_remote(remote_id).await? else {
            info!("🪝️ Event {} is for PayPal order {remote_id}, which is not one of ours", event.id);
            return ignored(format!("PayPal order {remote_id} is unknown"));
        };
        let mut update = StatusUpdate::new(target)
            .with_event_id(event.id.clone())
            .with_remote_time(Some(event.create_time))
            .with_capture_id(event.capture_id().map(String::from));
        if target == OrderStatus::Error {
            update = update.with_note(event.summary.clone().unwrap_or_else(|| "PayPal denied the capture".into()));
        }
        let local_id = order.local_id;
        match self.apply_update(&local_id, update).await {
            Ok(change) if change.changed => {
                info!("🪝️ Event {} moved {local_id} from {} to {}", event.id, change.previous, change.order.status);
                Ok(WebhookOutcome::Applied { local_id, previous: change.previous, status: change.order.status })
            },
            Ok(change) => {
                debug!("🪝️ Event {} left {local_id} at {}", event.id, change.order.status);
                Ok(WebhookOutcome::Unchanged { local_id, status: change.order.status })
            },
            Err(PaymentServiceError::Store(StoreError::NotFound(_))) => {
                info!("🪝️ Event {} arrived after {local_id} was deleted", event.id);
                ignored(format!("record {local_id} no longer exists"))
            },
            Err(PaymentServiceError::Store(e @ StoreError::StateViolation { .. })) => {
                warn!("🪝️ Event {} rejected for {local_id}. {e}", event.id);
                ignored(e.to_string())
            },
            Err(e) => {
                error!("🪝️ Event {} could not be applied to {local_id}. {e}", event.id);
                Err(e)
            },
        }
    }
}
