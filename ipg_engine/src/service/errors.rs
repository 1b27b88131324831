use ipg_common::ErrorKind;
use paypal_tools::{PayPalApiError, RefundStatus};
use thiserror::Error;

use crate::{
    db_types::{LocalId, OrderStatus},
    store::StoreError,
};

#[derive(Debug, Clone, Error)]
pub enum PaymentServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("PayPal request failed. {0}")]
    Gateway(#[from] PayPalApiError),
    #[error("Record {0} does not exist")]
    OrderNotFound(LocalId),
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Record {local_id} is {status}, so it cannot be {action}")]
    InvalidState { local_id: LocalId, status: OrderStatus, action: &'static str },
    #[error("The PayPal order for record {0} has already been captured and cannot be cancelled")]
    NotCancellable(LocalId),
    #[error("PayPal did not accept the refund for record {local_id} (refund status {status:?})")]
    RefundFailed { local_id: LocalId, status: RefundStatus },
}

impl PaymentServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            Self::Gateway(e) => e.kind(),
            Self::OrderNotFound(_) => ErrorKind::NotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::InvalidState { .. } | Self::NotCancellable(_) => ErrorKind::Conflict,
            Self::RefundFailed { .. } => ErrorKind::Remote,
        }
    }

    pub(crate) fn invalid_state(local_id: &LocalId, status: OrderStatus, action: &'static str) -> Self {
        Self::InvalidState { local_id: local_id.clone(), status, action }
    }
}
