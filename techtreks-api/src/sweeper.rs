/// Expiry sweeper
///
/// Periodically deletes pending verifications whose code window has closed
/// and sessions past their absolute expiry. Every read path checks expiry on
/// its own, so the sweeper only keeps tables small.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use techtreks_shared::store::{Store, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Rows removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pending_verifications: u64,
    pub sessions: u64,
}

/// Runs one sweep at `now`
pub async fn sweep_once(store: &dyn Store, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
    let pending_verifications = store.purge_expired_pending(now).await?;
    let sessions = store.purge_expired_sessions(now).await?;

    Ok(SweepReport {
        pending_verifications,
        sessions,
    })
}

/// Spawns the sweep loop; it exits when `shutdown` is cancelled
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_sweeper(
    store: Arc<dyn Store>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Expiry sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match sweep_once(store.as_ref(), Utc::now()).await {
                Ok(report) if report != SweepReport::default() => {
                    tracing::info!(
                        pending_verifications = report.pending_verifications,
                        sessions = report.sessions,
                        "Purged expired records"
                    );
                }
                Ok(_) => tracing::debug!("Nothing to purge"),
                Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
            }
        }

        tracing::info!("Expiry sweeper stopped");
    })
}
