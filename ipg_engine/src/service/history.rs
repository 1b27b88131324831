use std::collections::HashSet;

use log::*;

use super::{CancelSignal, DeleteAllReport, Failure, PartitionRefreshReport, PaymentService, PaymentServiceError};
use crate::{
    db_types::{DayStamp, InvoiceOrder, LocalId},
    gateway::PaymentGateway,
    store::{OrderStore, StoreError},
};

// Orders that could still take money and that PayPal knows about.
fn needs_cancel(order: &InvoiceOrder) -> bool {
    !order.status.is_settled() && order.paypal_order_id.is_some()
}

impl<S: OrderStore, G> PaymentService<S, G> {
    pub async fn list_history(&self) -> Result<Vec<DayStamp>, PaymentServiceError> {
        Ok(self.store.list_partitions().await?)
    }

    pub async fn history_for(&self, day: &DayStamp) -> Result<Vec<InvoiceOrder>, PaymentServiceError> {
        if !self.store.list_partitions().await?.contains(day) {
            return Err(StoreError::PartitionNotFound(day.clone()).into());
        }
        Ok(self.store.list_partition(day).await?)
    }
}

impl<S, G> PaymentService<S, G>
where
    S: OrderStore,
    G: PaymentGateway,
{
    pub async fn refresh_history(
        &self,
        day: &DayStamp,
        cancel: &CancelSignal,
    ) -> Result<PartitionRefreshReport, PaymentServiceError> {
        if !self.store.list_partitions().await?.contains(day) {
            return Err(StoreError::PartitionNotFound(day.clone()).into());
        }
        info!("🧹️ Admin refresh of partition {day}");
        self.refresh_partition(day, cancel).await
    }

    /// Cancels every unsettled PayPal order in the history, then deletes every partition.
    ///
    /// Cancellation is best-effort: failures are counted and reported but do not stop the deletion. If `cancel` fires
    /// before the deletion phase starts, nothing is deleted. Records that appear between the two phases are cancelled
    /// after their partition has been removed.
    ///
    /// A partition that cannot be read is reported as a failure and left on disk, since the orders in it were not
    /// cancelled. The other partitions are processed as usual.
    pub async fn delete_all_with_cancel(&self, cancel: &CancelSignal) -> Result<DeleteAllReport, PaymentServiceError> {
        let days = self.store.list_partitions().await?;
        warn!("🧹️ Deleting all history ({} partitions)", days.len());
        let mut report = DeleteAllReport::default();
        let mut attempted = HashSet::<LocalId>::new();
        let mut unreadable = HashSet::<DayStamp>::new();
        for day in &days {
            let records = match self.store.list_partition(day).await {
                Ok(records) => records,
                Err(e) => {
                    error!("🧹️ Partition {day} cannot be read, so its orders cannot be cancelled. It will be kept. {e}");
                    report.failures.push(Failure::new(day, &e.into()));
                    unreadable.insert(day.clone());
                    continue;
                },
            };
            for order in records.iter().filter(|o| needs_cancel(o)) {
                if cancel.is_cancelled() {
                    warn!("🧹️ Delete-all interrupted while cancelling orders. Nothing was deleted.");
                    report.interrupted = true;
                    return Ok(report);
                }
                attempted.insert(order.local_id.clone());
                self.cancel_remote(order, &mut report).await;
            }
        }
        for day in days.iter().filter(|d| !unreadable.contains(*d)) {
            if cancel.is_cancelled() {
                warn!("🧹️ Delete-all interrupted after {} partitions", report.deleted_files);
                report.interrupted = true;
                break;
            }
            match self.store.delete_partition(day).await {
                Ok(deleted) => {
                    report.deleted_files += 1;
                    report.deleted_records += deleted.len();
                    for late in deleted.iter().filter(|o| needs_cancel(o) && !attempted.contains(&o.local_id)) {
                        info!("🧹️ {} was issued while history was being deleted. Cancelling it now.", late.local_id);
                        self.cancel_remote(late, &mut report).await;
                    }
                },
                Err(StoreError::PartitionNotFound(_)) => debug!("🧹️ Partition {day} was already gone"),
                Err(e) => {
                    error!("🧹️ Could not delete partition {day}. {e}");
                    report.failures.push(Failure::new(day, &e.into()));
                },
            }
        }
        info!(
            "🧹️ Deleted {} partitions ({} records). {} orders cancelled, {} cancellations failed",
            report.deleted_files, report.deleted_records, report.cancelled_orders, report.failed_cancels
        );
        Ok(report)
    }
}

impl<S, G: PaymentGateway> PaymentService<S, G> {
    async fn cancel_remote(&self, order: &InvoiceOrder, report: &mut DeleteAllReport) {
        let Some(remote_id) = order.paypal_order_id.as_deref() else { return };
        match self.gateway.cancel_order(remote_id).await {
            Ok(true) => {
                debug!("🧹️ PayPal order {remote_id} of {} cancelled", order.local_id);
                report.cancelled_orders += 1;
            },
            Ok(false) => {
                warn!("🧹️ PayPal order {remote_id} of {} was captured and cannot be cancelled", order.local_id);
                report.failed_cancels += 1;
                let err = PaymentServiceError::NotCancellable(order.local_id.clone());
                report.failures.push(Failure::new(&order.local_id, &err));
            },
            Err(e) => {
                warn!("🧹️ Could not cancel PayPal order {remote_id} of {}. {e}", order.local_id);
                report.failed_cancels += 1;
                report.failures.push(Failure::new(&order.local_id, &e.into()));
            },
        }
    }
}
