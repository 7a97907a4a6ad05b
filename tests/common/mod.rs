//! Shared helpers for driving the router in-process against the memory store.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use duo_backend::config::Config;
use duo_backend::store::MemoryStore;
use duo_backend::{AppState, app};
use serde_json::{Value, json};
use tower::ServiceExt;

static INIT_LOGGER: Once = Once::new();

pub const BASE_URL: &str = "https://duo.test";

/// Quiet logging for tests; set `TEST_LOG=debug` to see more.
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let filter = std::env::var("TEST_LOG").unwrap_or_else(|_| "warn".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    });
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub struct Session {
    pub user_id: String,
    pub cookie: String,
}

pub fn test_config() -> Config {
    Config {
        database_url: "memory".into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        public_base_url: BASE_URL.into(),
    }
}

impl TestApp {
    pub fn new() -> Self {
        init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let router = app(AppState::new(store.clone(), test_config()));
        Self { router, store }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.request_raw(method, uri, cookie, body).await;
        (status, body)
    }

    async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("failed to build request"))
            .await
            .expect("request failed");

        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, set_cookie, json)
    }

    pub async fn register(&self, username: &str) -> Session {
        let (status, cookie, body) = self
            .request_raw(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": username, "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        Session {
            user_id: body["id"].as_str().expect("user id").to_string(),
            cookie: cookie.expect("auth cookie"),
        }
    }

    /// Create a doubles/invite-partner training owned by `owner`.
    pub async fn invite_training(&self, owner: &Session, doubles_type: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/trainings",
                Some(&owner.cookie),
                Some(json!({
                    "division": "doubles",
                    "mode": "invite_partner",
                    "doublesType": doubles_type,
                    "athletes": [athlete_json("Owner", "female")],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create training failed: {body}");
        body["id"].as_str().expect("training id").to_string()
    }

    pub async fn issue_invite(&self, owner: &Session, training_id: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/api/invites",
            Some(&owner.cookie),
            Some(json!({ "trainingId": training_id })),
        )
        .await
    }

    pub async fn accept_invite(&self, partner: &Session, token: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/api/invites/{token}/accept"),
            Some(&partner.cookie),
            Some(json!({
                "userId": partner.user_id,
                "athlete": athlete_json("Partner", "male"),
            })),
        )
        .await
    }
}

pub fn athlete_json(name: &str, gender: &str) -> Value {
    json!({
        "name": name,
        "age": 34,
        "weight": 70.5,
        "height": 175,
        "experience": "intermediate",
        "goal": "Finish the race together",
        "targetTime": "1:25:00",
        "strengths": ["running"],
        "weaknesses": ["lunges"],
        "gender": gender,
    })
}
