use serde::{Deserialize, Serialize};

use crate::db_types::{InvoiceOrder, OrderStatus};

/// Published whenever a record's status actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub previous: OrderStatus,
    pub order: InvoiceOrder,
}

impl OrderStatusChangedEvent {
    pub fn new(previous: OrderStatus, order: InvoiceOrder) -> Self {
        Self { previous, order }
    }
}
