pub mod auth;
pub mod health;
pub mod submissions;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                          login (public)
///
/// /users                               register (public)
/// /users/me                            unregister (requires auth)
///
/// /submissions                         list, submit
/// /submissions/{id}                    get, delete
/// /submissions/{id}/terminate          terminate (POST)
/// /submissions/{id}/download           zip of results (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/submissions", submissions::router())
}
