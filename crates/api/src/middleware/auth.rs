//! Bearer-token extractor that resolves the calling account.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use cam2_core::error::CoreError;
use cam2_db::repositories::UserRepo;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// The caller of a protected route.
///
/// Built from `Authorization: Bearer <jwt>`. A token is only honoured while
/// its subject is still a registered user, so tokens issued before an
/// unregister stop working immediately rather than at expiry.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Account name from `claims.sub`. Owns every submission the caller touches.
    pub username: String,
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Authorization header must use the Bearer scheme"))?;

        let claims = validate_token(token, &state.config.jwt)
            .map_err(|_| unauthorized("Invalid or expired token"))?;

        if UserRepo::find_by_username(&state.pool, &claims.sub)
            .await?
            .is_none()
        {
            return Err(unauthorized("Account no longer exists"));
        }

        Ok(AuthUser {
            username: claims.sub,
        })
    }
}
