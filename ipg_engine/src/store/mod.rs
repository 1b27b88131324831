//! Durable storage of invoice records, partitioned by day.
mod json_file;
mod legacy;

use ipg_common::ErrorKind;
pub use json_file::{JsonFileStore, PartitionDocument};
pub use legacy::{parse_partition, LegacyFormatError};
use thiserror::Error;

use crate::{
    db_types::{DayStamp, InvoiceOrder, LocalId, NewInvoice, OrderStatus, StatusChange, StatusUpdate},
    state_machine::TransitionError,
};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("History partition {day} could not be read: {message}")]
    Corrupt { day: DayStamp, message: String },
    #[error("Record {0} does not exist")]
    NotFound(LocalId),
    #[error("History partition {0} does not exist")]
    PartitionNotFound(DayStamp),
    #[error("Record {local_id} is {status}. {message}")]
    StateViolation { local_id: LocalId, status: OrderStatus, message: String },
    #[error("PayPal order {paypal_order_id} already belongs to record {holder}")]
    DuplicateRemote { paypal_order_id: String, holder: LocalId },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Corrupt { .. } => ErrorKind::StoreIo,
            Self::NotFound(_) | Self::PartitionNotFound(_) => ErrorKind::NotFound,
            Self::StateViolation { .. } => ErrorKind::StateViolation,
            Self::DuplicateRemote { .. } => ErrorKind::DuplicateRemote,
        }
    }

    pub(crate) fn violation(order: &InvoiceOrder, err: TransitionError) -> Self {
        Self::StateViolation { local_id: order.local_id.clone(), status: order.status, message: err.to_string() }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// The `OrderStore` trait defines the persistence behaviour the payment service needs.
///
/// Implementations must serialise writers per record and must never expose a partially written partition to readers.
#[allow(async_fn_in_trait)]
pub trait OrderStore {
    /// Appends a new `DRAFT` record to today's partition.
    async fn create(&self, invoice: NewInvoice) -> Result<InvoiceOrder, StoreError>;

    /// Links a `DRAFT` record to its PayPal order and moves it to `ISSUED`.
    ///
    /// Fails with [`StoreError::StateViolation`] if the record is not a draft, and with [`StoreError::DuplicateRemote`]
    /// if another record already holds `paypal_order_id`.
    async fn attach_remote(
        &self,
        local_id: &LocalId,
        paypal_order_id: &str,
        approval_url: &str,
    ) -> Result<InvoiceOrder, StoreError>;

    /// Applies a status transition according to the lifecycle rules in [`crate::state_machine`].
    ///
    /// Disallowed moves and repeated events leave the record untouched and return `changed: false`. Attempts to leave
    /// a terminal state fail with [`StoreError::StateViolation`].
    async fn update_status(&self, local_id: &LocalId, update: StatusUpdate) -> Result<StatusChange, StoreError>;

    async fn fetch(&self, local_id: &LocalId) -> Result<Option<InvoiceOrder>, StoreError>;

    /// Records of a partition in creation order. A missing partition is empty.
    async fn list_partition(&self, day: &DayStamp) -> Result<Vec<InvoiceOrder>, StoreError>;

    /// Every partition in the store, oldest first.
    async fn list_partitions(&self) -> Result<Vec<DayStamp>, StoreError>;

    /// Removes a partition and returns the records it held.
    async fn delete_partition(&self, day: &DayStamp) -> Result<Vec<InvoiceOrder>, StoreError>;

    async fn find_by_remote(&self, paypal_order_id: &str) -> Result<Option<InvoiceOrder>, StoreError>;
}
