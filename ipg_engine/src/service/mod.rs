//! The payment service: the single value that owns the store, the gateway and the event producers, and implements
//! the order lifecycle on top of them.
//!
//! Its operations are split by concern:
//! * `order_flow`: creating, capturing, cancelling and refunding individual orders.
//! * `reconciler`: pulling remote status for one record, a partition, or the whole history.
//! * `webhook`: applying pushed PayPal events.
//! * `history`: the bulk administrative operations.
mod cancel;
mod errors;
mod history;
mod objects;
mod order_flow;
mod reconciler;
mod webhook;

use std::{fmt::Debug, sync::Arc};

pub use cancel::CancelSignal;
pub use errors::PaymentServiceError;
use log::*;
pub use objects::{DeleteAllReport, Failure, PartitionRefreshReport, RefreshAllReport, RefreshOutcome, WebhookOutcome};
pub use webhook::target_status;

use crate::{
    db_types::{InvoiceOrder, LocalId, StatusChange, StatusUpdate},
    events::{EventProducers, OrderStatusChangedEvent},
    store::OrderStore,
};

pub const DEFAULT_RECONCILER_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Public base URL of this service, used to build the PayPal return and cancel links
    pub public_url: String,
    /// How many history partitions are refreshed at once
    pub concurrency: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self { public_url: "http://127.0.0.1:8380".to_string(), concurrency: DEFAULT_RECONCILER_CONCURRENCY }
    }
}

pub struct PaymentService<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    producers: EventProducers,
    options: ServiceOptions,
}

impl<S, G> Clone for PaymentService<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
            producers: self.producers.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S, G> Debug for PaymentService<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentService({})", self.options.public_url)
    }
}

impl<S, G> PaymentService<S, G> {
    pub fn new(store: S, gateway: G, producers: EventProducers, options: ServiceOptions) -> Self {
        Self::from_shared(Arc::new(store), Arc::new(gateway), producers, options)
    }

    pub fn from_shared(store: Arc<S>, gateway: Arc<G>, producers: EventProducers, options: ServiceOptions) -> Self {
        Self { store, gateway, producers, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn return_url(&self, local_id: &LocalId) -> String {
        format!("{}/orders/{local_id}/return", self.options.public_url.trim_end_matches('/'))
    }

    pub fn cancel_url(&self, local_id: &LocalId) -> String {
        format!("{}/orders/{local_id}/cancelled", self.options.public_url.trim_end_matches('/'))
    }
}

impl<S: OrderStore, G> PaymentService<S, G> {
    /// Fetches a record, failing if it does not exist.
    pub async fn fetch_order(&self, local_id: &LocalId) -> Result<InvoiceOrder, PaymentServiceError> {
        self.store.fetch(local_id).await?.ok_or_else(|| PaymentServiceError::OrderNotFound(local_id.clone()))
    }

    /// Every status change goes through here so that subscribers hear about it.
    async fn apply_update(&self, local_id: &LocalId, update: StatusUpdate) -> Result<StatusChange, PaymentServiceError> {
        let change = self.store.update_status(local_id, update).await?;
        if change.changed {
            self.publish_change(&change).await;
        }
        Ok(change)
    }

    async fn publish_change(&self, change: &StatusChange) {
        trace!("🔄️ Notifying status change subscribers about {}", change.order.local_id);
        let event = OrderStatusChangedEvent::new(change.previous, change.order.clone());
        self.producers.publish_status_changed(event).await;
    }
}
