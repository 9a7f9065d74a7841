//! Route definitions for the `/users` resource.

use axum::routing::{delete, post};
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// POST   /      -> register (public)
/// DELETE /me    -> unregister (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(users::register))
        .route("/me", delete(users::unregister))
}
