//! Handlers for the `/submissions` resource.
//!
//! Every route acts on the caller's own submissions: the owner is always the
//! authenticated username.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use cam2_core::submission::{SubmissionKey, SubmissionStatus};
use cam2_db::models::submission::{Submission, SubmissionSummary};
use cam2_jobs::SupervisorError;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the submission id.
const FIELD_SUBMISSION_ID: &str = "submission_id";
/// Multipart file field carrying the JSON configuration.
const FIELD_CONF: &str = "conf";
/// Multipart file field carrying the analyzer script.
const FIELD_ANALYZER: &str = "analyzer";

/// Status change acknowledgement returned by submit and terminate.
#[derive(Debug, Serialize)]
pub struct SubmissionState {
    pub submission_id: String,
    pub status: SubmissionStatus,
}

/// Build and validate the key of one of the caller's submissions.
fn owned_key(auth: &AuthUser, submission_id: String) -> AppResult<SubmissionKey> {
    let key = SubmissionKey::new(auth.username.clone(), submission_id);
    key.validate()?;
    Ok(key)
}

/// Reject an uploaded file whose name lacks the expected extension.
fn check_extension(field: &str, file_name: Option<&str>, extension: &str) -> AppResult<()> {
    match file_name {
        Some(name) if name.to_ascii_lowercase().ends_with(extension) => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "'{field}' must be a {extension} file"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/submissions
///
/// Multipart upload with a `submission_id` text field, a `conf` JSON file and
/// an `analyzer` Python file. Launches the backend and returns 201.
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<SubmissionState>>)> {
    let mut submission_id: Option<String> = None;
    let mut conf: Option<serde_json::Value> = None;
    let mut analyzer: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_SUBMISSION_ID => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                submission_id = Some(text.trim().to_string());
            }
            FIELD_CONF => {
                check_extension(FIELD_CONF, field.file_name(), ".json")?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                let value = serde_json::from_slice(&data).map_err(|e| {
                    AppError::BadRequest(format!("'{FIELD_CONF}' is not valid JSON: {e}"))
                })?;
                conf = Some(value);
            }
            FIELD_ANALYZER => {
                check_extension(FIELD_ANALYZER, field.file_name(), ".py")?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                analyzer = Some(data.to_vec());
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let missing = |field: &str| AppError::BadRequest(format!("Missing '{field}' field"));
    let submission_id = submission_id.ok_or_else(|| missing(FIELD_SUBMISSION_ID))?;
    let conf = conf.ok_or_else(|| missing(FIELD_CONF))?;
    let analyzer = analyzer.ok_or_else(|| missing(FIELD_ANALYZER))?;

    state
        .supervisor
        .submit(&auth.username, &submission_id, &conf, &analyzer)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: SubmissionState {
                submission_id,
                status: SubmissionStatus::Running,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/submissions
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<SubmissionSummary>>>> {
    let submissions = state.supervisor.list(&auth.username).await?;
    Ok(Json(DataResponse { data: submissions }))
}

/// GET /api/v1/submissions/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(submission_id): Path<String>,
) -> AppResult<Json<DataResponse<Submission>>> {
    let key = owned_key(&auth, submission_id)?;
    let submission = state
        .supervisor
        .get_status(&key.owner, &key.submission_id)
        .await?;
    Ok(Json(DataResponse { data: submission }))
}

// ---------------------------------------------------------------------------
// Terminate
// ---------------------------------------------------------------------------

/// POST /api/v1/submissions/{id}/terminate
///
/// 404 if the submission does not exist, 409 if it is not running.
pub async fn terminate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(submission_id): Path<String>,
) -> AppResult<Json<DataResponse<SubmissionState>>> {
    let key = owned_key(&auth, submission_id)?;

    match state
        .supervisor
        .terminate(&key.owner, &key.submission_id)
        .await
    {
        Ok(()) => {}
        Err(SupervisorError::NotRunning(key)) => {
            // Distinguish "never existed" from "already finished".
            state
                .supervisor
                .get_status(&key.owner, &key.submission_id)
                .await?;
            return Err(SupervisorError::NotRunning(key).into());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(DataResponse {
        data: SubmissionState {
            submission_id: key.submission_id,
            status: SubmissionStatus::Terminated,
        },
    }))
}

// ---------------------------------------------------------------------------
// Download / delete
// ---------------------------------------------------------------------------

/// GET /api/v1/submissions/{id}/download
///
/// Zip archive of the submission's results. 409 while still running.
pub async fn download(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(submission_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let key = owned_key(&auth, submission_id)?;
    let submission = state
        .supervisor
        .get_status(&key.owner, &key.submission_id)
        .await?;
    if !submission.status.is_terminal() {
        return Err(SupervisorError::StillRunning(key).into());
    }

    let archive = state
        .result_store
        .fetch_as_archive(&key.owner, &key.submission_id)
        .await?;
    tracing::info!(%key, bytes = archive.len(), "Serving result archive");

    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    ))
}

/// DELETE /api/v1/submissions/{id}
///
/// Removes a finished submission and its results. Returns 204.
pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(submission_id): Path<String>,
) -> AppResult<StatusCode> {
    let key = owned_key(&auth, submission_id)?;
    state
        .supervisor
        .delete(&key.owner, &key.submission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
