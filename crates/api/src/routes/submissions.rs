//! Route definitions for the `/submissions` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::submissions;
use crate::state::AppState;

/// Upper bound on a multipart submission (configuration plus analyzer).
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Routes mounted at `/submissions`. All require auth.
///
/// ```text
/// GET    /                  -> list
/// POST   /                  -> create (multipart)
/// GET    /{id}              -> get_by_id
/// DELETE /{id}              -> delete
/// POST   /{id}/terminate    -> terminate
/// GET    /{id}/download     -> download
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(submissions::list)
                .post(submissions::create)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/{id}",
            get(submissions::get_by_id).delete(submissions::delete),
        )
        .route("/{id}/terminate", post(submissions::terminate))
        .route("/{id}/download", get(submissions::download))
}
