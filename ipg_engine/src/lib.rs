//! Invoice Payment Gateway engine
//!
//! The engine keeps a local record for every invoice that is sent to PayPal for payment, and keeps those records in
//! step with the PayPal orders behind them. It is made of:
//! 1. The record types ([`mod@db_types`]) and the status lifecycle they follow ([`mod@state_machine`]).
//! 2. Storage ([`mod@store`]). [`OrderStore`] is the persistence seam; [`JsonFileStore`] keeps one JSON history file
//!    per day and can read the formats older versions of the tool wrote.
//! 3. The payment provider seam ([`mod@gateway`]). [`PaymentGateway`] and [`WebhookVerifier`] are implemented for
//!    the PayPal client in `paypal_tools`, and can be replaced by test doubles.
//! 4. [`PaymentService`], which composes the two and implements order creation, capture, cancellation and refunds,
//!    pull-side reconciliation, webhook ingestion and the bulk history operations.
//!
//! Every status change is published as an [`events::OrderStatusChangedEvent`] so that other components can react to
//! it without touching the engine.
pub mod db_types;
pub mod events;
pub mod gateway;
pub mod state_machine;
pub mod store;

mod service;

pub use gateway::{CreatedOrder, OrderRequest, PaymentGateway, WebhookVerifier};
pub use service::{
    target_status,
    CancelSignal,
    DeleteAllReport,
    Failure,
    PartitionRefreshReport,
    PaymentService,
    PaymentServiceError,
    RefreshAllReport,
    RefreshOutcome,
    ServiceOptions,
    WebhookOutcome,
    DEFAULT_RECONCILER_CONCURRENCY,
};
pub use store::{JsonFileStore, OrderStore, StoreError};
