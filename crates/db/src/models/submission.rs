//! Submission entity model.

use cam2_core::submission::SubmissionStatus;
use cam2_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// Full row from the `submissions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Submission {
    pub username: String,
    pub submission_id: String,
    #[sqlx(try_from = "String")]
    pub status: SubmissionStatus,
    pub stdout: String,
    pub stderr: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Abbreviated row used by submission listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SubmissionSummary {
    pub submission_id: String,
    #[sqlx(try_from = "String")]
    pub status: SubmissionStatus,
}

/// Result of [`SubmissionRepo::delete_if_finished`](crate::repositories::SubmissionRepo::delete_if_finished).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionDeleteOutcome {
    Deleted,
    NotFound,
    /// The record is still `RUNNING` and was left untouched.
    StillRunning,
}
