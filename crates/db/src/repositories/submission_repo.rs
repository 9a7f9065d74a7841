//! Repository for the `submissions` table.
//!
//! Status changes out of `RUNNING` are compare-and-set updates: they only
//! apply while the stored status is still `RUNNING`, so whichever of
//! natural completion and explicit termination commits first decides the
//! terminal status and the other becomes a no-op.

use cam2_core::submission::{SubmissionKey, SubmissionStatus};
use chrono::Utc;

use crate::models::submission::{Submission, SubmissionDeleteOutcome, SubmissionSummary};
use crate::DbPool;

/// Column list for full-row SELECT queries.
const COLUMNS: &str = "username, submission_id, status, stdout, stderr, created_at, updated_at";

/// Provides query and state-transition operations for submission records.
pub struct SubmissionRepo;

impl SubmissionRepo {
    /// Insert a submission record, or replace every mutable column of the
    /// existing record with the same `(username, submission_id)`.
    ///
    /// The write only happens while `key.owner` is a registered user, so a
    /// record can never be created for an account that was just removed.
    /// Returns `false` (and changes nothing) if the owner does not exist.
    pub async fn upsert(
        pool: &DbPool,
        key: &SubmissionKey,
        status: SubmissionStatus,
        stdout: &str,
        stderr: &str,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO submissions \
                (username, submission_id, status, stdout, stderr, created_at, updated_at) \
             SELECT ?, ?, ?, ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM users WHERE username = ?) \
             ON CONFLICT (username, submission_id) DO UPDATE SET \
                status = excluded.status, \
                stdout = excluded.stdout, \
                stderr = excluded.stderr, \
                created_at = excluded.created_at, \
                updated_at = excluded.updated_at",
        )
        .bind(&key.owner)
        .bind(&key.submission_id)
        .bind(status.as_str())
        .bind(stdout)
        .bind(stderr)
        .bind(now)
        .bind(now)
        .bind(&key.owner)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Find a single submission by its composite key.
    pub async fn find(
        pool: &DbPool,
        key: &SubmissionKey,
    ) -> Result<Option<Submission>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM submissions WHERE username = ? AND submission_id = ?"
        );
        sqlx::query_as::<_, Submission>(&query)
            .bind(&key.owner)
            .bind(&key.submission_id)
            .fetch_optional(pool)
            .await
    }

    /// List `(submission_id, status)` for every submission of `owner`,
    /// oldest first.
    pub async fn list_by_owner(
        pool: &DbPool,
        owner: &str,
    ) -> Result<Vec<SubmissionSummary>, sqlx::Error> {
        sqlx::query_as::<_, SubmissionSummary>(
            "SELECT submission_id, status FROM submissions \
             WHERE username = ? \
             ORDER BY created_at ASC, submission_id ASC",
        )
        .bind(owner)
        .fetch_all(pool)
        .await
    }

    /// Keys of every record currently marked `RUNNING`.
    pub async fn list_running(pool: &DbPool) -> Result<Vec<SubmissionKey>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT username, submission_id FROM submissions \
             WHERE status = ? \
             ORDER BY username, submission_id",
        )
        .bind(SubmissionStatus::Running.as_str())
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(owner, submission_id)| SubmissionKey::new(owner, submission_id))
            .collect())
    }

    /// Delete a record unless it is still `RUNNING`.
    pub async fn delete_if_finished(
        pool: &DbPool,
        key: &SubmissionKey,
    ) -> Result<SubmissionDeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let status = Self::status_in(&mut tx, key).await?;
        let outcome = match status {
            None => SubmissionDeleteOutcome::NotFound,
            Some(status) if !status.is_terminal() => SubmissionDeleteOutcome::StillRunning,
            Some(_) => {
                sqlx::query("DELETE FROM submissions WHERE username = ? AND submission_id = ?")
                    .bind(&key.owner)
                    .bind(&key.submission_id)
                    .execute(&mut *tx)
                    .await?;
                SubmissionDeleteOutcome::Deleted
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Compare-and-set `RUNNING -> TERMINATED`.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// record is missing or already terminal.
    pub async fn mark_terminated(pool: &DbPool, key: &SubmissionKey) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE submissions SET status = ?, updated_at = ? \
             WHERE username = ? AND submission_id = ? AND status = ?",
        )
        .bind(SubmissionStatus::Terminated.as_str())
        .bind(Utc::now())
        .bind(&key.owner)
        .bind(&key.submission_id)
        .bind(SubmissionStatus::Running.as_str())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the captured output of a process that has exited.
    ///
    /// - `RUNNING`: output is written and the status becomes `COMPLETED`.
    /// - `TERMINATED`: output is written, the status is kept.
    /// - `COMPLETED`: nothing is written (output is write-once).
    ///
    /// Returns the resulting status, or `None` if the record no longer
    /// exists.
    pub async fn finalize(
        pool: &DbPool,
        key: &SubmissionKey,
        stdout: &str,
        stderr: &str,
    ) -> Result<Option<SubmissionStatus>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let final_status = match Self::status_in(&mut tx, key).await? {
            None => None,
            Some(SubmissionStatus::Completed) => Some(SubmissionStatus::Completed),
            Some(current) => {
                let next = if current.can_transition_to(SubmissionStatus::Completed) {
                    SubmissionStatus::Completed
                } else {
                    current
                };
                sqlx::query(
                    "UPDATE submissions SET status = ?, stdout = ?, stderr = ?, updated_at = ? \
                     WHERE username = ? AND submission_id = ?",
                )
                .bind(next.as_str())
                .bind(stdout)
                .bind(stderr)
                .bind(Utc::now())
                .bind(&key.owner)
                .bind(&key.submission_id)
                .execute(&mut *tx)
                .await?;
                Some(next)
            }
        };

        tx.commit().await?;
        Ok(final_status)
    }

    async fn status_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        key: &SubmissionKey,
    ) -> Result<Option<SubmissionStatus>, sqlx::Error> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM submissions WHERE username = ? AND submission_id = ?",
        )
        .bind(&key.owner)
        .bind(&key.submission_id)
        .fetch_optional(&mut **tx)
        .await?;

        status
            .map(|s| s.parse().map_err(|e| sqlx::Error::Decode(Box::new(e))))
            .transpose()
    }
}
