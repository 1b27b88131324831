use paypal_tools::{CaptureStatus, OrderStatusCode, PayPalOrder};

use crate::db_types::OrderStatus;

/// Derives the local status from a remote order. `None` when PayPal reports a status this version does not know.
///
/// Refunds win over everything else, then voiding. A `COMPLETED` order only counts as captured if a completed
/// capture is present (authorize-intent orders complete on authorization).
pub fn local_status_for(order: &PayPalOrder) -> Option<OrderStatus> {
    let captures = order.captures().map(|c| c.status).collect::<Vec<_>>();
    if captures.iter().any(|s| matches!(s, CaptureStatus::Refunded | CaptureStatus::PartiallyRefunded)) {
        return Some(OrderStatus::Refunded);
    }
    let status = match order.status {
        OrderStatusCode::Created | OrderStatusCode::Saved | OrderStatusCode::PayerActionRequired => OrderStatus::Issued,
        OrderStatusCode::Approved => OrderStatus::Approved,
        OrderStatusCode::Voided => OrderStatus::Cancelled,
        OrderStatusCode::Completed => {
            if captures.contains(&CaptureStatus::Completed) {
                OrderStatus::Completed
            } else if captures.iter().any(|s| matches!(s, CaptureStatus::Declined | CaptureStatus::Failed)) {
                OrderStatus::Error
            } else {
                // Authorized, or the capture is still pending
                OrderStatus::Approved
            }
        },
        OrderStatusCode::Unknown => return None,
    };
    Some(status)
}

/// The capture that holds the buyer's money, if any.
pub fn latest_capture_id(order: &PayPalOrder) -> Option<String> {
    order
        .captures()
        .filter(|c| {
            matches!(c.status, CaptureStatus::Completed | CaptureStatus::PartiallyRefunded | CaptureStatus::Refunded)
        })
        .max_by_key(|c| c.update_time.or(c.create_time))
        .map(|c| c.id.clone())
}

#[cfg(test)]
mod test {
    use paypal_tools::{data_objects::{Payments, PurchaseUnit}, Capture};

    use super::*;

    fn order(status: OrderStatusCode, captures: &[(&str, CaptureStatus)]) -> PayPalOrder {
        let captures = captures
            .iter()
            .map(|(id, status)| Capture { id: id.to_string(), status: *status, ..Default::default() })
            .collect();
        PayPalOrder {
            id: "5O190127TN364715T".into(),
            status,
            purchase_units: vec![PurchaseUnit {
                payments: Some(Payments { captures, authorizations: vec![] }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn remote_to_local() {
        use CaptureStatus as C;
        use OrderStatusCode as R;
        assert_eq!(local_status_for(&order(R::Created, &[])), Some(OrderStatus::Issued));
        assert_eq!(local_status_for(&order(R::Saved, &[])), Some(OrderStatus::Issued));
        assert_eq!(local_status_for(&order(R::PayerActionRequired, &[])), Some(OrderStatus::Issued));
        assert_eq!(local_status_for(&order(R::Approved, &[])), Some(OrderStatus::Approved));
        assert_eq!(local_status_for(&order(R::Completed, &[("C1", C::Completed)])), Some(OrderStatus::Completed));
        assert_eq!(local_status_for(&order(R::Completed, &[("C1", C::Refunded)])), Some(OrderStatus::Refunded));
        assert_eq!(
            local_status_for(&order(R::Completed, &[("C1", C::PartiallyRefunded)])),
            Some(OrderStatus::Refunded)
        );
        assert_eq!(local_status_for(&order(R::Voided, &[])), Some(OrderStatus::Cancelled));
        assert_eq!(local_status_for(&order(R::Completed, &[])), Some(OrderStatus::Approved));
        assert_eq!(local_status_for(&order(R::Completed, &[("C1", C::Pending)])), Some(OrderStatus::Approved));
        assert_eq!(local_status_for(&order(R::Completed, &[("C1", C::Declined)])), Some(OrderStatus::Error));
        assert_eq!(local_status_for(&order(R::Unknown, &[])), None);
    }

    #[test]
    fn capture_ids() {
        use CaptureStatus as C;
        assert_eq!(latest_capture_id(&order(OrderStatusCode::Approved, &[])), None);
        assert_eq!(
            latest_capture_id(&order(OrderStatusCode::Completed, &[("C0", C::Declined), ("C1", C::Completed)])),
            Some("C1".to_string())
        );
    }
}
