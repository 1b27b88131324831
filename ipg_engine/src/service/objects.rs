use ipg_common::ErrorKind;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{DayStamp, LocalId, OrderStatus},
    service::PaymentServiceError,
};

/// The result of refreshing one record against PayPal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub local_id: LocalId,
    pub changed: bool,
    pub status: OrderStatus,
    pub message: String,
}

/// Something a bulk operation could not do. `id` is a record id or a partition day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub id: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new<S: ToString>(id: S, err: &PaymentServiceError) -> Self {
        Self { id: id.to_string(), error_kind: err.kind(), message: err.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRefreshReport {
    pub day: DayStamp,
    /// Records refreshed successfully, whether or not their status changed
    pub updated: usize,
    pub changed: usize,
    pub errors: usize,
    pub skipped_terminal: usize,
    /// Records that never got a PayPal order
    pub skipped_unissued: usize,
    pub failures: Vec<Failure>,
    pub interrupted: bool,
}

impl PartitionRefreshReport {
    pub fn new(day: DayStamp) -> Self {
        Self {
            day,
            updated: 0,
            changed: 0,
            errors: 0,
            skipped_terminal: 0,
            skipped_unissued: 0,
            failures: Vec::new(),
            interrupted: false,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0 && !self.interrupted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshAllReport {
    pub partitions: Vec<PartitionRefreshReport>,
    /// Partitions that could not be read at all
    pub failed_partitions: Vec<Failure>,
    pub updated: usize,
    pub changed: usize,
    pub errors: usize,
    pub skipped_terminal: usize,
    pub interrupted: bool,
}

impl RefreshAllReport {
    pub fn add(&mut self, report: PartitionRefreshReport) {
        self.updated += report.updated;
        self.changed += report.changed;
        self.errors += report.errors;
        self.skipped_terminal += report.skipped_terminal;
        self.interrupted |= report.interrupted;
        self.partitions.push(report);
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.failed_partitions.is_empty() && !self.interrupted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllReport {
    pub deleted_files: usize,
    pub deleted_records: usize,
    pub cancelled_orders: usize,
    pub failed_cancels: usize,
    pub failures: Vec<Failure>,
    pub interrupted: bool,
}

impl DeleteAllReport {
    pub fn is_clean(&self) -> bool {
        self.failed_cancels == 0 && self.failures.is_empty() && !self.interrupted
    }
}

/// What the webhook ingestor did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { local_id: LocalId, previous: OrderStatus, status: OrderStatus },
    Unchanged { local_id: LocalId, status: OrderStatus },
    Ignored { reason: String },
}
