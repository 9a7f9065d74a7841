//! Handlers for the `/users` resource (registration and unregistration).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cam2_core::error::CoreError;
use cam2_core::submission::validate_identifier;
use cam2_db::models::user::UserDeleteOutcome;
use cam2_db::repositories::UserRepo;
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, validate_password_strength, MIN_PASSWORD_LENGTH};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const RUNNING_CONFLICT: &str = "Submissions are still running; terminate them before unregistering";

/// Request body for `POST /users`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Public user info.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub username: String,
}

/// POST /api/v1/users
///
/// Register a new user. Returns 201 Created, or 409 if the name is taken.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<UserInfo>>)> {
    validate_identifier("username", &input.username)?;
    validate_password_strength(&input.password, MIN_PASSWORD_LENGTH)
        .map_err(AppError::BadRequest)?;

    let password_hash = hash_password(&input.password)
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))?;

    if !UserRepo::create(&state.pool, &input.username, &password_hash).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Username '{}' is already taken",
            input.username
        ))));
    }

    tracing::info!(username = %input.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: UserInfo {
                username: input.username,
            },
        }),
    ))
}

/// DELETE /api/v1/users/me
///
/// Unregister the caller: removes their submissions, their account and all
/// of their results. Refused with 409 while a submission is running.
pub async fn unregister(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<StatusCode> {
    // Covers jobs still launching and terminated jobs that are still
    // exiting; neither may outlive the account's records.
    if state.supervisor.registry().has_owner(&auth.username) {
        return Err(AppError::Core(CoreError::Conflict(
            RUNNING_CONFLICT.into(),
        )));
    }

    match UserRepo::delete_if_idle(&state.pool, &auth.username).await? {
        UserDeleteOutcome::NotFound => {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "User",
                id: auth.username,
            }))
        }
        UserDeleteOutcome::HasRunning => {
            return Err(AppError::Core(CoreError::Conflict(
                RUNNING_CONFLICT.into(),
            )))
        }
        UserDeleteOutcome::Deleted => {}
    }

    match state.result_store.delete_all_for(&auth.username).await {
        Ok(removed) => {
            tracing::info!(username = %auth.username, results_removed = removed, "User unregistered")
        }
        Err(e) => tracing::warn!(
            username = %auth.username,
            error = %e,
            "User unregistered, result removal failed",
        ),
    }

    Ok(StatusCode::NO_CONTENT)
}
