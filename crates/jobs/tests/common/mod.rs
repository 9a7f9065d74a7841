//! Shared helpers for supervisor integration tests.
//!
//! The backend is `sh`, which runs the submitted analyzer as a shell script
//! with the six positional backend arguments, so each test controls the
//! process behaviour through the analyzer it submits.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cam2_core::submission::SubmissionKey;
use cam2_db::repositories::UserRepo;
use cam2_db::DbPool;
use cam2_jobs::{Supervisor, SupervisorConfig};
use cam2_storage::archive::{ArchiveBuilder, ResultArchive};
use cam2_storage::{ResultStore, StorageError};
use tempfile::TempDir;

pub const OWNER: &str = "alice";

/// Accounts registered in every harness database.
pub const REGISTERED: [&str; 2] = [OWNER, "bob"];

/// Result store that records delete calls.
#[derive(Default)]
pub struct RecordingResultStore {
    pub deleted: Mutex<Vec<(String, String)>>,
    pub deleted_users: Mutex<Vec<String>>,
}

impl RecordingResultStore {
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultStore for RecordingResultStore {
    async fn fetch_as_archive(
        &self,
        _owner: &str,
        submission_id: &str,
    ) -> Result<ResultArchive, StorageError> {
        Ok(ArchiveBuilder::new(submission_id).finish()?)
    }

    async fn delete(&self, owner: &str, submission_id: &str) -> Result<bool, StorageError> {
        self.deleted
            .lock()
            .unwrap()
            .push((owner.to_string(), submission_id.to_string()));
        Ok(true)
    }

    async fn delete_all_for(&self, owner: &str) -> Result<bool, StorageError> {
        self.deleted_users.lock().unwrap().push(owner.to_string());
        Ok(true)
    }
}

pub struct Harness {
    pub supervisor: Supervisor,
    pub pool: DbPool,
    pub results: Arc<RecordingResultStore>,
    pub scratch: TempDir,
    db_dir: TempDir,
}

impl Harness {
    pub fn db_path(&self) -> PathBuf {
        self.db_dir.path().join("jobs.db")
    }

    pub fn key(&self, submission_id: &str) -> SubmissionKey {
        SubmissionKey::new(OWNER, submission_id)
    }

    /// Submit `script` as the analyzer of `submission_id` for [`OWNER`].
    pub async fn submit(
        &self,
        submission_id: &str,
        script: &str,
    ) -> Result<(), cam2_jobs::SupervisorError> {
        self.supervisor
            .submit(
                OWNER,
                submission_id,
                &serde_json::json!({"frames": 10, "camera": "cam-1"}),
                script.as_bytes(),
            )
            .await
    }

    /// Wait until the job has left the registry (finalization done).
    pub async fn wait_finalized(&self, submission_id: &str) {
        wait_finalized(&self.supervisor, &self.key(submission_id)).await;
    }

    pub fn scratch_entries(&self) -> usize {
        count_entries(self.scratch.path())
    }
}

/// Backend configuration running the analyzer through `sh`.
pub fn shell_backend(scratch_root: &Path) -> SupervisorConfig {
    SupervisorConfig {
        backend_program: "sh".into(),
        backend_args: vec![
            "-c".into(),
            "exec sh \"$6\" \"$@\"".into(),
            "cam2-backend".into(),
        ],
        master_url: "spark://master:7077".into(),
        namenode_url: "http://namenode:50070".into(),
        scratch_root: scratch_root.to_path_buf(),
    }
}

pub async fn harness() -> Harness {
    harness_with(shell_backend).await
}

/// Build a harness whose backend config is produced by `make_config`.
pub async fn harness_with(make_config: impl FnOnce(&Path) -> SupervisorConfig) -> Harness {
    let db_dir = tempfile::tempdir().expect("create db dir");
    let scratch = tempfile::tempdir().expect("create scratch dir");

    let pool = cam2_db::create_pool_at(db_dir.path().join("jobs.db"))
        .await
        .expect("open database");
    cam2_db::run_migrations(&pool).await.expect("migrate");
    for user in REGISTERED {
        UserRepo::create(&pool, user, "hash")
            .await
            .expect("register user");
    }

    let results = Arc::new(RecordingResultStore::default());
    let supervisor = Supervisor::new(
        pool.clone(),
        results.clone() as Arc<dyn ResultStore>,
        make_config(scratch.path()),
    );

    Harness {
        supervisor,
        pool,
        results,
        scratch,
        db_dir,
    }
}

pub async fn wait_finalized(supervisor: &Supervisor, key: &SubmissionKey) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while supervisor.registry().contains(key) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{key} was not finalized in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
