use futures_util::{stream, StreamExt};
use log::*;
use paypal_tools::PayPalApiError;

use super::{
    order_flow::unknown_remote_status,
    CancelSignal,
    Failure,
    PartitionRefreshReport,
    PaymentService,
    PaymentServiceError,
    RefreshAllReport,
    RefreshOutcome,
};
use crate::{
    db_types::{DayStamp, InvoiceOrder, LocalId, OrderStatus, StatusUpdate},
    gateway::{latest_capture_id, local_status_for, PaymentGateway},
    store::OrderStore,
};

impl<S, G> PaymentService<S, G>
where
    S: OrderStore,
    G: PaymentGateway,
{
    /// Pulls the remote status of one record and applies it.
    pub async fn refresh(&self, local_id: &LocalId) -> Result<RefreshOutcome, PaymentServiceError> {
        let order = self.fetch_order(local_id).await?;
        self.refresh_record(&order).await
    }

    async fn refresh_record(&self, order: &InvoiceOrder) -> Result<RefreshOutcome, PaymentServiceError> {
        let local_id = &order.local_id;
        let unchanged = |message: &str| RefreshOutcome {
            local_id: local_id.clone(),
            changed: false,
            status: order.status,
            message: message.to_string(),
        };
        if order.status.is_terminal() {
            return Ok(unchanged("The record is final and was not refreshed"));
        }
        let Some(remote_id) = &order.paypal_order_id else {
            return Ok(unchanged("The record has no PayPal order yet"));
        };
        let update = match self.gateway.get_order(remote_id).await {
            Ok(remote) => {
                let status = local_status_for(&remote).ok_or_else(|| unknown_remote_status(remote_id))?;
                let update = StatusUpdate::new(status)
                    .with_remote_time(remote.last_modified())
                    .with_capture_id(latest_capture_id(&remote));
                if status == OrderStatus::Error {
                    update.with_note("PayPal declined the capture")
                } else {
                    update
                }
            },
            Err(PayPalApiError::NotFound(_)) => {
                debug!("🔁️ PayPal no longer knows order {remote_id} of {local_id}. It has expired.");
                StatusUpdate::new(OrderStatus::Expired).with_note("PayPal no longer knows this order")
            },
            Err(e) => {
                debug!("🔁️ Refreshing {local_id} failed. {e}");
                return Err(e.into());
            },
        };
        let observed = update.status;
        let change = self.apply_update(local_id, update).await?;
        let status = change.order.status;
        let message = if change.changed {
            format!("{} → {status}", change.previous)
        } else if status == observed {
            format!("PayPal still reports {status}")
        } else {
            format!("PayPal reports {observed}. Keeping {status}")
        };
        trace!("🔁️ {local_id}: {message}");
        Ok(RefreshOutcome { local_id: local_id.clone(), changed: change.changed, status, message })
    }

    /// Refreshes every non-terminal record of a partition, one at a time. Per-record failures are collected in the
    /// report; they do not stop the batch.
    pub async fn refresh_partition(
        &self,
        day: &DayStamp,
        cancel: &CancelSignal,
    ) -> Result<PartitionRefreshReport, PaymentServiceError> {
        let records = self.store.list_partition(day).await?;
        debug!("🔁️ Refreshing {} records in partition {day}", records.len());
        let mut report = PartitionRefreshReport::new(day.clone());
        for order in records {
            if cancel.is_cancelled() {
                info!("🔁️ Refresh of {day} interrupted");
                report.interrupted = true;
                break;
            }
            if order.status.is_terminal() {
                report.skipped_terminal += 1;
                continue;
            }
            if order.paypal_order_id.is_none() {
                report.skipped_unissued += 1;
                continue;
            }
            match self.refresh_record(&order).await {
                Ok(outcome) => {
                    report.updated += 1;
                    if outcome.changed {
                        report.changed += 1;
                    }
                },
                Err(e) => {
                    warn!("🔁️ Could not refresh {}. {e}", order.local_id);
                    report.errors += 1;
                    report.failures.push(Failure::new(&order.local_id, &e));
                },
            }
        }
        info!(
            "🔁️ Partition {day} refreshed: {} updated ({} changed), {} errors, {} final",
            report.updated, report.changed, report.errors, report.skipped_terminal
        );
        Ok(report)
    }

    /// Refreshes every partition, at most `concurrency` partitions at a time.
    pub async fn refresh_all(&self, cancel: &CancelSignal) -> Result<RefreshAllReport, PaymentServiceError> {
        let days = self.store.list_partitions().await?;
        let concurrency = self.options.concurrency.max(1);
        info!("🔁️ Refreshing {} partitions with {concurrency} workers", days.len());
        let mut results = stream::iter(days)
            .map(move |day| async move {
                let result = self.refresh_partition(&day, cancel).await;
                (day, result)
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<_>>()
            .await;
        results.sort_by(|(a, _), (b, _)| a.cmp(b));
        let mut report = RefreshAllReport::default();
        for (day, result) in results {
            match result {
                Ok(partition) => report.add(partition),
                Err(e) => {
                    error!("🔁️ Partition {day} could not be refreshed. {e}");
                    report.failed_partitions.push(Failure::new(&day, &e));
                },
            }
        }
        info!(
            "🔁️ Refresh complete: {} updated ({} changed), {} errors, {} unreadable partitions",
            report.updated,
            report.changed,
            report.errors,
            report.failed_partitions.len()
        );
        Ok(report)
    }
}
