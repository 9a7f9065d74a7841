//! The job supervisor: submit, terminate, query and delete submissions.

use std::io;
use std::sync::Arc;

use cam2_core::submission::{SubmissionKey, SubmissionStatus, OUTPUT_PLACEHOLDER};
use cam2_db::models::submission::{Submission, SubmissionDeleteOutcome, SubmissionSummary};
use cam2_db::repositories::SubmissionRepo;
use cam2_db::DbPool;
use cam2_storage::ResultStore;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::monitor::{Monitor, StopRequest, CONTROL_CHANNEL_CAPACITY};
use crate::process;
use crate::registry::{JobRegistry, LiveJob};
use crate::scratch::ScratchArea;

/// Owns the lifecycle of every submission launched by this process.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Supervisor {
    pool: DbPool,
    result_store: Arc<dyn ResultStore>,
    config: Arc<SupervisorConfig>,
    registry: Arc<JobRegistry>,
}

impl Supervisor {
    pub fn new(
        pool: DbPool,
        result_store: Arc<dyn ResultStore>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            pool,
            result_store,
            config: Arc::new(config),
            registry: Arc::new(JobRegistry::new()),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launch a submission.
    ///
    /// Returns once the backend process is running, its record is stored
    /// as `RUNNING` and the job is registered. The process outcome is
    /// handled by the job's monitor task. Must be called within a Tokio
    /// runtime.
    ///
    /// The launch runs on its own task: if the caller stops waiting, the
    /// launch still completes (or unwinds) and the job is never left
    /// without a monitor.
    pub async fn submit(
        &self,
        owner: &str,
        submission_id: &str,
        config: &Value,
        analyzer: &[u8],
    ) -> Result<(), SupervisorError> {
        let key = SubmissionKey::new(owner, submission_id);
        key.validate()
            .map_err(|e| SupervisorError::InvalidSubmission(e.to_string()))?;

        let this = self.clone();
        let config = config.clone();
        let analyzer = analyzer.to_vec();
        tokio::spawn(async move { this.launch(key, &config, &analyzer).await })
            .await
            .map_err(|e| {
                SupervisorError::resource("Submission launch task failed", io::Error::other(e))
            })?
    }

    async fn launch(
        &self,
        key: SubmissionKey,
        config: &Value,
        analyzer: &[u8],
    ) -> Result<(), SupervisorError> {
        let reservation = self.registry.add(key)?;
        let key = reservation.key().clone();

        let scratch = ScratchArea::create(&self.config.scratch_root, config, analyzer)
            .await
            .map_err(|e| SupervisorError::resource("Failed to prepare scratch area", e))?;

        let mut child = match process::spawn_backend(&self.config, &key, &scratch) {
            Ok(child) => child,
            Err(e) => {
                scratch.release().await;
                return Err(SupervisorError::resource(
                    format!("Failed to launch '{}'", self.config.backend_program),
                    e,
                ));
            }
        };
        let pid = child.id();

        let recorded = SubmissionRepo::upsert(
            &self.pool,
            &key,
            SubmissionStatus::Running,
            OUTPUT_PLACEHOLDER,
            OUTPUT_PLACEHOLDER,
        )
        .await;
        let failure = match recorded {
            Ok(true) => None,
            Ok(false) => {
                tracing::warn!(%key, "Owner is not registered, stopping backend");
                Some(SupervisorError::UnknownOwner(key.owner.clone()))
            }
            Err(e) => {
                tracing::error!(%key, error = %e, "Failed to record submission, stopping backend");
                Some(e.into())
            }
        };
        if let Some(err) = failure {
            if let Err(kill_err) = child.kill().await {
                tracing::warn!(%key, error = %kill_err, "Failed to kill backend process");
            }
            scratch.release().await;
            return Err(err);
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        // Registered before the monitor starts, so the monitor's removal
        // is always the last registry operation for this job.
        reservation.commit(LiveJob::new(key.clone(), pid, control_tx));

        let monitor = Monitor {
            key: key.clone(),
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
            scratch,
            child,
            control: control_rx,
        };
        tokio::spawn(monitor.run());

        tracing::info!(%key, pid, "Submission started");
        Ok(())
    }

    /// Request cooperative termination of a live submission.
    ///
    /// Succeeds only if the record was switched to `TERMINATED` and the
    /// stop signal was delivered. Does not wait for the process to exit.
    pub async fn terminate(&self, owner: &str, submission_id: &str) -> Result<(), SupervisorError> {
        let key = SubmissionKey::new(owner, submission_id);
        let job = self
            .registry
            .find(&key)
            .ok_or_else(|| SupervisorError::NotRunning(key.clone()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if job.control.send(StopRequest { reply: reply_tx }).await.is_err() {
            return Err(SupervisorError::AlreadyFinished(key));
        }
        match reply_rx.await {
            Ok(outcome) => outcome,
            // Monitor finished and dropped the request.
            Err(_) => Err(SupervisorError::AlreadyFinished(key)),
        }
    }

    /// Stored record of a submission.
    pub async fn get_status(
        &self,
        owner: &str,
        submission_id: &str,
    ) -> Result<Submission, SupervisorError> {
        let key = SubmissionKey::new(owner, submission_id);
        let record = SubmissionRepo::find(&self.pool, &key).await?;
        record.ok_or(SupervisorError::NotFound(key))
    }

    /// `(submission_id, status)` of every submission of `owner`.
    pub async fn list(&self, owner: &str) -> Result<Vec<SubmissionSummary>, SupervisorError> {
        Ok(SubmissionRepo::list_by_owner(&self.pool, owner).await?)
    }

    /// Delete a finished submission and request deletion of its results.
    ///
    /// Result store failures are logged; the record deletion stands.
    pub async fn delete(&self, owner: &str, submission_id: &str) -> Result<(), SupervisorError> {
        let key = SubmissionKey::new(owner, submission_id);
        if self.registry.contains(&key) {
            return Err(SupervisorError::StillRunning(key));
        }

        match SubmissionRepo::delete_if_finished(&self.pool, &key).await? {
            SubmissionDeleteOutcome::NotFound => return Err(SupervisorError::NotFound(key)),
            SubmissionDeleteOutcome::StillRunning => {
                return Err(SupervisorError::StillRunning(key))
            }
            SubmissionDeleteOutcome::Deleted => {}
        }

        match self.result_store.delete(owner, submission_id).await {
            Ok(removed) => tracing::info!(%key, results_removed = removed, "Submission deleted"),
            Err(e) => tracing::warn!(%key, error = %e, "Submission deleted, result removal failed"),
        }
        Ok(())
    }

    /// `RUNNING` records without a live job in this process.
    ///
    /// These are jobs whose finalization write failed, or whose process
    /// was lost when the service restarted.
    pub async fn find_stuck_submissions(&self) -> Result<Vec<SubmissionKey>, SupervisorError> {
        let running = SubmissionRepo::list_running(&self.pool).await?;
        Ok(running
            .into_iter()
            .filter(|key| !self.registry.contains(key))
            .collect())
    }
}
