use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::SweepConfig;
use crate::ports::StatusUpdate;
use crate::services::orchestrator::{PaymentOrchestrator, PollResult};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub settled: usize,
    pub expired: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Runs the pending sweep forever. Settles transactions whose callback and
/// status poll never arrived, and expires the ones the provider still reports
/// as pending past the deadline.
pub async fn run_sweeper(orchestrator: Arc<PaymentOrchestrator>, config: SweepConfig) {
    info!(
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        "Pending payment sweeper started"
    );

    loop {
        match sweep_once(&orchestrator, &config).await {
            Ok(report) if report.examined > 0 => info!(?report, "Pending sweep finished"),
            Ok(_) => debug!("No stale pending payments"),
            Err(e) => error!("Pending sweep error: {}", e),
        }

        sleep(config.interval).await;
    }
}

pub async fn sweep_once(
    orchestrator: &PaymentOrchestrator,
    config: &SweepConfig,
) -> anyhow::Result<SweepReport> {
    let now = Utc::now();
    let reconcile_before = now - chrono::Duration::from_std(config.reconcile_after)?;
    let expire_before = now - chrono::Duration::from_std(config.pending_expiry)?;

    let stale = orchestrator
        .store()
        .list_pending(reconcile_before, config.batch_size)
        .await?;

    let mut report = SweepReport {
        examined: stale.len(),
        ..SweepReport::default()
    };

    for tx in stale {
        let id = tx.transaction_id.as_str();
        match orchestrator.poll(id).await {
            Ok(PollResult::Settled(StatusUpdate::Applied(_))) => {
                report.settled += 1;
                continue;
            }
            Ok(PollResult::Settled(StatusUpdate::TerminalStateConflict(_))) => continue,
            Ok(PollResult::StillPending) => {}
            Ok(PollResult::Unavailable(e)) => {
                // No answer from the provider is not an outcome; never expire on it.
                warn!(transaction_id = %id, error = %e, "Provider unavailable; payment left pending");
                report.still_pending += 1;
                continue;
            }
            Ok(PollResult::AmountMismatch { .. }) => {
                // Held for manual review.
                report.errors += 1;
                continue;
            }
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "Failed to reconcile pending payment");
                report.errors += 1;
                continue;
            }
        }

        if tx.created_at > expire_before {
            report.still_pending += 1;
            continue;
        }

        match orchestrator.expire(id).await {
            Ok(StatusUpdate::Applied(_)) => {
                info!(transaction_id = %id, "Expired pending payment");
                report.expired += 1;
            }
            Ok(StatusUpdate::TerminalStateConflict(_)) => {}
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "Failed to expire pending payment");
                report.errors += 1;
            }
        }
    }

    Ok(report)
}
