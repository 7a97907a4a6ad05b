pub mod auth;
pub mod invites;
pub mod trainings;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::router())
        .merge(trainings::router())
        .merge(invites::router())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
