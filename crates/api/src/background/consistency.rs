//! Periodic audit for submissions stuck in `RUNNING`.
//!
//! A record stays `RUNNING` without a live process when its finalization
//! write failed or when the service restarted while the job ran. Such
//! records are reported for operator attention; they are never repaired
//! automatically.

use std::time::Duration;

use cam2_jobs::Supervisor;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Run the audit loop until `cancel` is triggered.
pub async fn run(supervisor: Supervisor, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = every.as_secs(),
        "Consistency audit started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Consistency audit stopping");
                break;
            }
            _ = interval.tick() => {
                audit_once(&supervisor).await;
            }
        }
    }
}

/// Log every stuck submission once. Returns how many were found.
pub async fn audit_once(supervisor: &Supervisor) -> usize {
    match supervisor.find_stuck_submissions().await {
        Ok(stuck) if stuck.is_empty() => {
            tracing::debug!("Consistency audit: no stuck submissions");
            0
        }
        Ok(stuck) => {
            for key in &stuck {
                tracing::warn!(
                    %key,
                    "Submission is RUNNING in the store but has no live process"
                );
            }
            stuck.len()
        }
        Err(e) => {
            tracing::error!(error = %e, "Consistency audit failed");
            0
        }
    }
}
