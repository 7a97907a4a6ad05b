use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::AppState;
use crate::auth::middleware::{AuthUser, COOKIE_NAME};
use crate::auth::{jwt, password};
use crate::error::AppError;
use crate::extract::AppJson;
use crate::models::user::{LoginRequest, RegisterRequest, UserResponse};

const MAX_USERNAME_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

fn normalize_username(raw: &str) -> Result<String, AppError> {
    let username = raw.trim().to_lowercase();
    let valid = !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.');
    if !valid {
        return Err(AppError::BadRequest(format!(
            "Username must be 1-{MAX_USERNAME_LEN} letters, digits, '.', '_' or '-'"
        )));
    }
    Ok(username)
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<(CookieJar, Json<UserResponse>), AppError> {
    let username = normalize_username(&body.username)?;

    if body.password.len() < password::MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }

    if state.store.find_user_by_username(&username).await?.is_some() {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let password_hash = password::hash_password(&body.password)?;

    let user = match state.store.create_user(&username, &password_hash).await {
        Ok(user) => user,
        Err(e) if e.is_unique_violation() => {
            return Err(AppError::Conflict("Username already taken".into()));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = %user.id, "user registered");

    let token = jwt::create_token(user.id, &user.username, &state.config.jwt_secret)?;
    let cookie = build_auth_cookie(token);

    Ok((jar.add(cookie), Json(UserResponse::from(user))))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<UserResponse>), AppError> {
    let username = body.username.trim().to_lowercase();

    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !password::verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt::create_token(user.id, &user.username, &state.config.jwt_secret)?;
    let cookie = build_auth_cookie(token);

    Ok((jar.add(cookie), Json(UserResponse::from(user))))
}

async fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(COOKIE_NAME).path("/"))
}

async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserResponse>, AppError> {
    // Re-read so pairing changes show up without logging in again.
    let user = state
        .store
        .find_user(auth.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(UserResponse::from(user)))
}

fn build_auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(jwt::TOKEN_EXPIRY_HOURS))
        .build()
}
