//! Repository for the `users` table.

use cam2_core::submission::SubmissionStatus;
use chrono::Utc;

use crate::models::user::{User, UserDeleteOutcome};
use crate::DbPool;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "username, password_hash, created_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user.
    ///
    /// Returns `false` (and changes nothing) if the username is taken.
    pub async fn create(
        pool: &DbPool,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Insert a user or replace the password hash of an existing one.
    pub async fn upsert(
        pool: &DbPool,
        username: &str,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) \
             VALUES (?, ?, ?) \
             ON CONFLICT (username) DO UPDATE SET password_hash = excluded.password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Find a user by username (case-sensitive).
    pub async fn find_by_username(
        pool: &DbPool,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = ?");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Delete a user row unconditionally. Returns `true` if a row was removed.
    ///
    /// Submission records are not touched; prefer [`Self::delete_if_idle`].
    pub async fn delete(pool: &DbPool, username: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a user together with all of their submission records, unless
    /// they still own a `RUNNING` submission.
    ///
    /// The check and both deletes run in one transaction.
    pub async fn delete_if_idle(
        pool: &DbPool,
        username: &str,
    ) -> Result<UserDeleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT username FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(UserDeleteOutcome::NotFound);
        }

        let running: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM submissions WHERE username = ? AND status = ?",
        )
        .bind(username)
        .bind(SubmissionStatus::Running.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if running > 0 {
            return Ok(UserDeleteOutcome::HasRunning);
        }

        sqlx::query("DELETE FROM submissions WHERE username = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UserDeleteOutcome::Deleted)
    }
}
