use std::time::Duration;

use ipg_engine::{CancelSignal, OrderStore, PaymentGateway, PaymentService};
use log::*;

/// Starts the background reconciliation job on the current actix runtime. It refreshes every history partition once
/// per `period` until `stop` fires.
pub fn start_reconcile_worker<S, G>(service: PaymentService<S, G>, period: Duration, stop: CancelSignal)
where
    S: OrderStore + 'static,
    G: PaymentGateway + 'static,
{
    actix_web::rt::spawn(async move {
        let mut timer = tokio::time::interval(period);
        // The first tick completes immediately; skip it so startup is not slowed by a full refresh
        timer.tick().await;
        info!("🕰️ Reconciliation worker started. Running every {}s", period.as_secs());
        loop {
            timer.tick().await;
            if stop.is_cancelled() {
                info!("🕰️ Reconciliation worker stopped");
                break;
            }
            info!("🕰️ Running scheduled reconciliation");
            match service.refresh_all(&stop).await {
                Ok(report) if report.is_clean() => {
                    info!("🕰️ Reconciliation done. {} records refreshed, {} changed", report.updated, report.changed)
                },
                Ok(report) => warn!(
                    "🕰️ Reconciliation finished with problems. {} records refreshed, {} errors, {} unreadable partitions",
                    report.updated,
                    report.errors,
                    report.failed_partitions.len()
                ),
                Err(e) => error!("🕰️ Error running the reconciliation job: {e}"),
            }
        }
    });
}
