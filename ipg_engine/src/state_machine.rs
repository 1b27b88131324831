//! The status lifecycle of an invoice record.
//!
//! ```text
//! DRAFT     → ISSUED | ERROR
//! ISSUED    → APPROVED | CANCELLED | EXPIRED | ERROR
//! APPROVED  → COMPLETED | CANCELLED | ERROR
//! COMPLETED → REFUNDED
//! ERROR     → (prior status, or anywhere the prior status could go)
//! ```
//!
//! Two shortcuts are accepted because observations can be missed: a capture seen on an `ISSUED` record moves it
//! straight to `COMPLETED`, and a refund seen before the capture moves it straight to `REFUNDED`.
//!
//! [`evaluate`] is pure. The store calls it under the partition lock and only writes when it returns
//! [`Transition::Apply`].
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{InvoiceOrder, OrderStatus, StatusUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// The event was already applied to this record.
    DuplicateEvent,
    /// The record already has this status.
    Unchanged,
    /// A newer observation has already been applied.
    Stale,
    /// The move is not an edge of the lifecycle graph (e.g. a backward move).
    NotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    NoOp(NoOpReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{from} is terminal. The record cannot move to {to}")]
    LeavesTerminal { from: OrderStatus, to: OrderStatus },
    #[error("A record without a PayPal order id cannot become {0}")]
    MissingRemoteId(OrderStatus),
}

/// Is `from → to` an edge of the lifecycle graph? `ERROR` is handled by [`evaluate`], which consults the prior status.
pub fn is_edge(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match (from, to) {
        (Draft, Issued | Error) => true,
        (Issued, Approved | Cancelled | Expired | Error | Completed | Refunded) => true,
        (Approved, Completed | Cancelled | Error | Refunded) => true,
        (Completed, Refunded) => true,
        _ => false,
    }
}

/// Decides what to do with `update` given the current state of `order`.
pub fn evaluate(order: &InvoiceOrder, update: &StatusUpdate) -> Result<Transition, TransitionError> {
    let from = order.status;
    let to = update.status;
    if update.event_id.is_some() && update.event_id == order.last_event_id {
        return Ok(Transition::NoOp(NoOpReason::DuplicateEvent));
    }
    if from == to {
        return Ok(Transition::NoOp(NoOpReason::Unchanged));
    }
    if from.is_terminal() {
        return Err(TransitionError::LeavesTerminal { from, to });
    }
    if is_stale(order, update) {
        return Ok(Transition::NoOp(NoOpReason::Stale));
    }
    let allowed = match from {
        OrderStatus::Error => {
            let prior = order.prior_status.unwrap_or(OrderStatus::Draft);
            to == prior || is_edge(prior, to)
        },
        _ => is_edge(from, to),
    };
    if !allowed {
        return Ok(Transition::NoOp(NoOpReason::NotAllowed));
    }
    if to.requires_remote_id() && order.paypal_order_id.is_none() {
        return Err(TransitionError::MissingRemoteId(to));
    }
    Ok(Transition::Apply)
}

// An observation older than the last applied one loses. At the same instant, the more advanced state wins.
fn is_stale(order: &InvoiceOrder, update: &StatusUpdate) -> bool {
    match (update.remote_time, order.last_remote_at) {
        (Some(remote), Some(last)) if remote < last => true,
        (Some(remote), Some(last)) if remote == last => {
            let current = match order.status {
                OrderStatus::Error => order.prior_status.unwrap_or(OrderStatus::Draft),
                s => s,
            };
            update.status.rank() <= current.rank()
        },
        _ => false,
    }
}

/// Mutates `order` according to `update`. Only call this after [`evaluate`] returned [`Transition::Apply`].
pub fn apply(order: &mut InvoiceOrder, update: &StatusUpdate, now: DateTime<Utc>) {
    let from = order.status;
    match (from, update.status) {
        (OrderStatus::Error, OrderStatus::Error) => {},
        (f, OrderStatus::Error) => order.prior_status = Some(f),
        (OrderStatus::Error, _) => {
            order.prior_status = None;
            order.note = None;
        },
        _ => {},
    }
    order.status = update.status;
    order.last_status_at = now;
    if let Some(id) = &update.event_id {
        order.last_event_id = Some(id.clone());
    }
    if let Some(remote) = update.remote_time {
        order.last_remote_at = Some(order.last_remote_at.map_or(remote, |last| last.max(remote)));
    }
    if let Some(capture_id) = &update.capture_id {
        order.capture_id = Some(capture_id.clone());
    }
    if let Some(note) = &update.note {
        order.note = Some(note.clone());
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use ipg_common::MinorUnits;
    use OrderStatus::*;

    use super::*;
    use crate::db_types::{LocalId, NewInvoice};

    fn record(status: OrderStatus) -> InvoiceOrder {
        let now = Utc::now();
        let mut order =
            InvoiceOrder::new_draft(LocalId::from("20250101-00000001"), now, NewInvoice::new("山田", 100_000, "JPY"));
        order.status = status;
        if status != Draft {
            order.paypal_order_id = Some("5O190127TN364715T".into());
        }
        order
    }

    fn outcome(order: &InvoiceOrder, to: OrderStatus) -> Result<Transition, TransitionError> {
        evaluate(order, &StatusUpdate::new(to))
    }

    #[test]
    fn graph_edges() {
        assert!(is_edge(Draft, Issued));
        assert!(is_edge(Issued, Approved));
        assert!(is_edge(Issued, Completed));
        assert!(is_edge(Approved, Completed));
        assert!(is_edge(Completed, Refunded));
        assert!(!is_edge(Approved, Issued));
        assert!(!is_edge(Completed, Approved));
        assert!(!is_edge(Draft, Completed));
        assert!(!is_edge(Approved, Expired));
        for from in [Refunded, Cancelled, Expired] {
            for to in OrderStatus::ALL {
                assert!(!is_edge(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn forward_moves_apply() {
        assert_eq!(outcome(&record(Issued), Approved), Ok(Transition::Apply));
        assert_eq!(outcome(&record(Approved), Completed), Ok(Transition::Apply));
        assert_eq!(outcome(&record(Issued), Completed), Ok(Transition::Apply));
        assert_eq!(outcome(&record(Completed), Refunded), Ok(Transition::Apply));
    }

    #[test]
    fn backward_moves_are_ignored() {
        assert_eq!(outcome(&record(Completed), Approved), Ok(Transition::NoOp(NoOpReason::NotAllowed)));
        assert_eq!(outcome(&record(Approved), Issued), Ok(Transition::NoOp(NoOpReason::NotAllowed)));
        assert_eq!(outcome(&record(Completed), Cancelled), Ok(Transition::NoOp(NoOpReason::NotAllowed)));
    }

    #[test]
    fn leaving_terminal_states_is_a_violation() {
        for from in [Refunded, Cancelled, Expired] {
            let order = record(from);
            let err = outcome(&order, Approved).unwrap_err();
            assert_eq!(err, TransitionError::LeavesTerminal { from, to: Approved });
        }
        // Re-asserting a terminal status is harmless
        assert_eq!(outcome(&record(Cancelled), Cancelled), Ok(Transition::NoOp(NoOpReason::Unchanged)));
    }

    #[test]
    fn duplicate_events_are_no_ops() {
        let mut order = record(Approved);
        let update = StatusUpdate::new(Completed).with_event_id("WH-1");
        assert_eq!(evaluate(&order, &update), Ok(Transition::Apply));
        apply(&mut order, &update, Utc::now());
        assert_eq!(order.last_event_id.as_deref(), Some("WH-1"));
        assert_eq!(evaluate(&order, &update), Ok(Transition::NoOp(NoOpReason::DuplicateEvent)));
    }

    #[test]
    fn older_observations_lose() {
        let t0 = Utc::now();
        let mut order = record(Issued);
        let completed = StatusUpdate::new(Completed).with_remote_time(Some(t0));
        apply(&mut order, &completed, t0);
        let approved = StatusUpdate::new(Approved).with_remote_time(Some(t0 - Duration::seconds(5)));
        assert_eq!(evaluate(&order, &approved), Ok(Transition::NoOp(NoOpReason::Stale)));

        let mut order = record(Issued);
        order.last_remote_at = Some(t0);
        let same_instant_expiry = StatusUpdate::new(Expired).with_remote_time(Some(t0));
        assert_eq!(evaluate(&order, &same_instant_expiry), Ok(Transition::Apply));
        let same_instant_approved = StatusUpdate::new(Approved).with_remote_time(Some(t0));
        assert_eq!(evaluate(&order, &same_instant_approved), Ok(Transition::Apply));
        let mut order = record(Approved);
        order.last_remote_at = Some(t0);
        let same_instant_error = StatusUpdate::new(Error).with_remote_time(Some(t0));
        assert_eq!(evaluate(&order, &same_instant_error), Ok(Transition::NoOp(NoOpReason::Stale)));
    }

    #[test]
    fn error_keeps_and_restores_prior_status() {
        let now = Utc::now();
        let mut order = record(Approved);
        let fail = StatusUpdate::new(Error).with_note("capture denied");
        assert_eq!(evaluate(&order, &fail), Ok(Transition::Apply));
        apply(&mut order, &fail, now);
        assert_eq!(order.status, Error);
        assert_eq!(order.prior_status, Some(Approved));
        assert_eq!(order.note.as_deref(), Some("capture denied"));

        // Back to where it was, or onward from there
        assert_eq!(outcome(&order, Approved), Ok(Transition::Apply));
        assert_eq!(outcome(&order, Completed), Ok(Transition::Apply));
        assert_eq!(outcome(&order, Issued), Ok(Transition::NoOp(NoOpReason::NotAllowed)));

        apply(&mut order, &StatusUpdate::new(Completed), now);
        assert_eq!(order.status, Completed);
        assert_eq!(order.prior_status, None);
        assert_eq!(order.note, None);
    }

    #[test]
    fn remote_statuses_need_a_remote_id() {
        let mut order = record(Issued);
        order.paypal_order_id = None;
        assert_eq!(outcome(&order, Approved), Err(TransitionError::MissingRemoteId(Approved)));
        assert_eq!(outcome(&order, Expired), Ok(Transition::Apply));
    }

    #[test]
    fn capture_ids_are_recorded() {
        let mut order = record(Approved);
        let update = StatusUpdate::new(Completed).with_capture_id(Some("3C679366HH908993F".into()));
        apply(&mut order, &update, Utc::now());
        assert_eq!(order.capture_id.as_deref(), Some("3C679366HH908993F"));
        assert_eq!(order.amount_minor, MinorUnits::from(100_000));
    }
}
