use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppError;

use super::jwt;

pub const COOKIE_NAME: &str = "token";

/// The caller, as identified by the session cookie. Handlers that issue or
/// accept invites take this and check it against the training owner or the
/// accepting `userId`.
///
/// The claims are trusted as-is; routes that need the current pairing state
/// load the user from the store.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let cookie = jar.get(COOKIE_NAME).ok_or(AppError::Unauthorized)?;
        let claims = jwt::validate_token(cookie.value(), &state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}
