use ipg_common::MinorUnits;
use log::*;
use paypal_tools::{PayPalApiError, RefundStatus};

use super::{PaymentService, PaymentServiceError};
use crate::{
    db_types::{InvoiceOrder, LocalId, NewInvoice, OrderStatus, StatusChange, StatusUpdate},
    gateway::{latest_capture_id, local_status_for, OrderRequest, PaymentGateway},
    store::{OrderStore, StoreError},
};

impl<S, G> PaymentService<S, G>
where
    S: OrderStore,
    G: PaymentGateway,
{
    /// Stores a new invoice and creates its PayPal order.
    ///
    /// On success the record is `ISSUED` and carries the approval URL. If PayPal refuses, the record is kept in
    /// `ERROR` with the reason in its note, and the error is returned.
    pub async fn create_order(&self, invoice: NewInvoice) -> Result<InvoiceOrder, PaymentServiceError> {
        invoice.validate().map_err(PaymentServiceError::InvalidRequest)?;
        let draft = self.store.create(invoice).await?;
        let local_id = draft.local_id.clone();
        let description = if draft.customer.is_empty() {
            format!("Invoice {local_id}")
        } else {
            format!("Invoice {local_id} for {}", draft.customer)
        };
        let request = OrderRequest {
            reference: local_id.to_string(),
            description,
            amount_minor: draft.amount_minor,
            currency: draft.currency.clone(),
            return_url: self.return_url(&local_id),
            cancel_url: self.cancel_url(&local_id),
        };
        let created = match self.gateway.create_order(&request).await {
            Ok(created) => created,
            Err(e) => {
                warn!("🔄️📦️ Could not create a PayPal order for {local_id}. {e}");
                self.mark_error(&local_id, format!("PayPal order creation failed. {e}")).await;
                return Err(e.into());
            },
        };
        match self.store.attach_remote(&local_id, &created.order_id, &created.approval_url).await {
            Ok(order) => {
                info!("🔄️📦️ Invoice {order} issued as PayPal order {}", created.order_id);
                let change = StatusChange { changed: true, previous: OrderStatus::Draft, order: order.clone() };
                self.publish_change(&change).await;
                Ok(order)
            },
            Err(e) => {
                error!("🔄️📦️ PayPal order {} could not be linked to {local_id}. {e}", created.order_id);
                if !matches!(e, StoreError::DuplicateRemote { .. }) {
                    // The remote order belongs to nobody now. Make sure it cannot be paid.
                    self.abandon_remote(&created.order_id).await;
                }
                self.mark_error(&local_id, format!("Could not record PayPal order {}. {e}", created.order_id)).await;
                Err(e.into())
            },
        }
    }

    async fn mark_error(&self, local_id: &LocalId, note: String) {
        let update = StatusUpdate::new(OrderStatus::Error).with_note(note);
        if let Err(e) = self.apply_update(local_id, update).await {
            error!("🔄️📦️ Could not mark {local_id} as failed. {e}");
        }
    }

    async fn abandon_remote(&self, order_id: &str) {
        match self.gateway.cancel_order(order_id).await {
            Ok(true) => info!("🔄️📦️ Orphaned PayPal order {order_id} cancelled"),
            Ok(false) => warn!("🔄️📦️ Orphaned PayPal order {order_id} could not be cancelled"),
            Err(e) => warn!("🔄️📦️ Orphaned PayPal order {order_id} could not be cancelled. {e}"),
        }
    }

    /// Captures the buyer's payment. Capturing a record that is already `COMPLETED` returns it unchanged.
    pub async fn capture(&self, local_id: &LocalId) -> Result<InvoiceOrder, PaymentServiceError> {
        let order = self.fetch_order(local_id).await?;
        if order.status == OrderStatus::Completed {
            debug!("🔄️💰️ {local_id} is already captured");
            return Ok(order);
        }
        let remote_id = match (&order.paypal_order_id, order.status) {
            (Some(id), OrderStatus::Issued | OrderStatus::Approved | OrderStatus::Error) => id.clone(),
            _ => return Err(PaymentServiceError::invalid_state(local_id, order.status, "captured")),
        };
        let remote = self.gateway.capture_order(&remote_id).await?;
        let status = local_status_for(&remote).ok_or_else(|| unknown_remote_status(&remote_id))?;
        let mut update = StatusUpdate::new(status)
            .with_remote_time(remote.last_modified())
            .with_capture_id(latest_capture_id(&remote));
        if status == OrderStatus::Error {
            update = update.with_note("PayPal declined the capture");
        }
        let change = self.apply_update(local_id, update).await?;
        info!("🔄️💰️ Capture of {local_id} finished. Record is {}", change.order.status);
        Ok(change.order)
    }

    /// Cancels the PayPal order behind a record and marks the record `CANCELLED`.
    pub async fn cancel(&self, local_id: &LocalId) -> Result<InvoiceOrder, PaymentServiceError> {
        let order = self.fetch_order(local_id).await?;
        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }
        let remote_id = match &order.paypal_order_id {
            Some(id) if !order.status.is_settled() => id.clone(),
            _ => return Err(PaymentServiceError::invalid_state(local_id, order.status, "cancelled")),
        };
        if !self.gateway.cancel_order(&remote_id).await? {
            warn!("🔄️❌️ PayPal order {remote_id} for {local_id} is captured and cannot be cancelled");
            return Err(PaymentServiceError::NotCancellable(local_id.clone()));
        }
        let update = StatusUpdate::new(OrderStatus::Cancelled).with_note("Cancelled by an administrator");
        let change = self.apply_update(local_id, update).await?;
        info!("🔄️❌️ {local_id} cancelled");
        Ok(change.order)
    }

    /// Refunds a captured record, in full or in part. Both collapse to `REFUNDED`.
    pub async fn refund(
        &self,
        local_id: &LocalId,
        amount: Option<MinorUnits>,
    ) -> Result<InvoiceOrder, PaymentServiceError> {
        let order = self.fetch_order(local_id).await?;
        if order.status != OrderStatus::Completed {
            return Err(PaymentServiceError::invalid_state(local_id, order.status, "refunded"));
        }
        if let Some(amount) = amount {
            if amount.value() == 0 || amount > order.amount_minor {
                return Err(PaymentServiceError::InvalidRequest(format!(
                    "Refund amount must be between 1 and {} minor units",
                    order.amount_minor
                )));
            }
        }
        let capture_id = match (&order.capture_id, &order.paypal_order_id) {
            (Some(capture_id), _) => capture_id.clone(),
            (None, Some(remote_id)) => {
                let remote = self.gateway.get_order(remote_id).await?;
                latest_capture_id(&remote).ok_or_else(|| {
                    PaymentServiceError::invalid_state(local_id, order.status, "refunded without a capture")
                })?
            },
            (None, None) => return Err(PaymentServiceError::invalid_state(local_id, order.status, "refunded")),
        };
        let refund = self.gateway.refund_capture(&capture_id, amount, &order.currency).await?;
        if !matches!(refund.status, RefundStatus::Completed | RefundStatus::Pending) {
            warn!("🔄️💸️ PayPal refund {} for {local_id} is {:?}", refund.id, refund.status);
            return Err(PaymentServiceError::RefundFailed { local_id: local_id.clone(), status: refund.status });
        }
        let note = match amount {
            Some(a) if a < order.amount_minor => {
                let partial = a.to_decimal_string(&order.currency);
                format!("Partially refunded {partial} {} (refund {})", order.currency, refund.id)
            },
            _ => format!("Refunded in full (refund {})", refund.id),
        };
        let update = StatusUpdate::new(OrderStatus::Refunded).with_capture_id(Some(capture_id)).with_note(note);
        let change = self.apply_update(local_id, update).await?;
        info!("🔄️💸️ {local_id} refunded");
        Ok(change.order)
    }
}

pub(super) fn unknown_remote_status(order_id: &str) -> PaymentServiceError {
    PaymentServiceError::Gateway(PayPalApiError::Protocol(format!("PayPal order {order_id} has an unknown status")))
}
