//! Per-job monitor task.
//!
//! The monitor is the single owner of a job's backend process. It waits for
//! the process to exit while serving stop requests, then finalizes the job:
//! store write, scratch release, registry removal, in that order.

use std::process::ExitStatus;
use std::sync::Arc;

use cam2_core::submission::SubmissionKey;
use cam2_db::repositories::SubmissionRepo;
use cam2_db::DbPool;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use crate::error::SupervisorError;
use crate::process;
use crate::registry::JobRegistry;
use crate::scratch::ScratchArea;

/// Capacity of a job's control channel.
pub(crate) const CONTROL_CHANNEL_CAPACITY: usize = 4;

/// A termination request sent to a monitor.
#[derive(Debug)]
pub struct StopRequest {
    pub(crate) reply: oneshot::Sender<Result<(), SupervisorError>>,
}

pub(crate) struct Monitor {
    pub key: SubmissionKey,
    pub pool: DbPool,
    pub registry: Arc<JobRegistry>,
    pub scratch: ScratchArea,
    pub child: Child,
    pub control: mpsc::Receiver<StopRequest>,
}

impl Monitor {
    pub async fn run(self) {
        let Monitor {
            key,
            pool,
            registry,
            scratch,
            mut child,
            mut control,
        } = self;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(process::read_capped(key.clone(), "stdout", stdout));
        let stderr_task = tokio::spawn(process::read_capped(key.clone(), "stderr", stderr));

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                Some(request) = control.recv() => {
                    match child.try_wait() {
                        Ok(Some(status)) => {
                            let _ = request
                                .reply
                                .send(Err(SupervisorError::AlreadyFinished(key.clone())));
                            break Ok(status);
                        }
                        Ok(None) => {
                            let outcome = stop(&pool, &key, &mut child).await;
                            let _ = request.reply.send(outcome);
                        }
                        Err(e) => {
                            tracing::error!(%key, error = %e, "Failed to poll backend process");
                            let _ = request.reply.send(Err(SupervisorError::Signal {
                                pid: pid.unwrap_or_default(),
                                source: e,
                            }));
                        }
                    }
                }
            }
        };

        // Queued and future requests now observe a closed channel.
        drop(control);

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        log_exit(&key, pid, &status);

        match SubmissionRepo::finalize(&pool, &key, &stdout, &stderr).await {
            Ok(Some(final_status)) => {
                tracing::info!(%key, status = %final_status, "Submission finalized");
            }
            Ok(None) => {
                tracing::warn!(%key, "Submission record vanished before finalization");
            }
            Err(e) => {
                tracing::error!(
                    %key,
                    error = %e,
                    "Failed to record submission output, record remains RUNNING",
                );
            }
        }

        scratch.release().await;
        registry.remove(&key);
    }
}

/// Mark the record `TERMINATED`, then signal the process.
///
/// The store write comes first so that a concurrent exit observes a
/// non-`RUNNING` record and keeps the `TERMINATED` status.
async fn stop(
    pool: &DbPool,
    key: &SubmissionKey,
    child: &mut Child,
) -> Result<(), SupervisorError> {
    if !SubmissionRepo::mark_terminated(pool, key).await? {
        return Err(SupervisorError::AlreadyFinished(key.clone()));
    }

    let pid = child.id().unwrap_or_default();
    process::request_stop(child).map_err(|source| {
        tracing::error!(%key, pid, error = %source, "Failed to signal backend process");
        SupervisorError::Signal { pid, source }
    })?;

    tracing::info!(%key, pid, "Termination signal sent");
    Ok(())
}

fn log_exit(key: &SubmissionKey, pid: Option<u32>, status: &std::io::Result<ExitStatus>) {
    match status {
        Ok(status) if status.success() => {
            tracing::info!(%key, pid, "Backend process exited");
        }
        Ok(status) => {
            tracing::info!(%key, pid, exit_code = status.code(), "Backend process exited with failure");
        }
        Err(e) => {
            tracing::error!(%key, pid, error = %e, "Failed to wait for backend process");
        }
    }
}
