//! User entity model.

use cam2_core::types::Timestamp;
use sqlx::FromRow;

/// Full user row from the `users` table.
///
/// Contains the password hash -- never serialize this to API responses.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub created_at: Timestamp,
}

/// Result of [`UserRepo::delete_if_idle`](crate::repositories::UserRepo::delete_if_idle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDeleteOutcome {
    /// The user and all of their submission records were removed.
    Deleted,
    /// No user with that name exists.
    NotFound,
    /// The user still owns at least one `RUNNING` submission.
    HasRunning,
}
