use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::AppState;
use crate::auth::middleware::AuthUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::models::invite::{
    AcceptInviteRequest, AcceptInviteResponse, CreateInviteRequest, CreateInviteResponse,
    InviteDetailsResponse,
};
use crate::services::invites;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/invites", post(create_invite))
        .route("/api/invites/{token}", get(get_invite))
        .route("/api/invites/{token}/accept", post(accept_invite))
}

async fn create_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(body): AppJson<CreateInviteRequest>,
) -> Result<Json<CreateInviteResponse>, AppError> {
    let issued = invites::issue(
        state.store.as_ref(),
        &state.config.public_base_url,
        body.training_id,
        auth.user_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(issued))
}

async fn get_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InviteDetailsResponse>, AppError> {
    let details = invites::resolve(state.store.as_ref(), &token, Utc::now()).await?;
    Ok(Json(details))
}

async fn accept_invite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(token): Path<String>,
    AppJson(body): AppJson<AcceptInviteRequest>,
) -> Result<Json<AcceptInviteResponse>, AppError> {
    if body.user_id != auth.user_id {
        return Err(AppError::Forbidden);
    }

    let accepted = invites::accept(
        state.store.as_ref(),
        &token,
        body.user_id,
        &body.athlete,
        Utc::now(),
    )
    .await?;

    Ok(Json(accepted))
}
