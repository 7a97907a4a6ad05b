use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Session claims for an athlete account. `sub` is the user id that invite
/// acceptance compares against the `userId` in the request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// Lower-cased account name, shown as the owner on invite pages.
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

/// Matches the cookie max-age set at login.
pub const TOKEN_EXPIRY_HOURS: i64 = 24;

pub fn create_token(user_id: Uuid, username: &str, secret: &str) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (now + Duration::hours(TOKEN_EXPIRY_HOURS)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token creation failed: {e}")))
}

/// Any decode failure, expiry included, is reported as `Unauthorized`.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}
