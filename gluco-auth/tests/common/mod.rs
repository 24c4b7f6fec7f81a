#![allow(dead_code)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gluco_auth::{Session, SessionManager, Settings, TokenStore, User};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fake backend. Issues `access-N`/`refresh-N` tokens; only the most recently
/// issued access token is accepted by protected routes.
#[derive(Clone, Default)]
pub struct Backend {
    pub refresh_calls: Arc<AtomicUsize>,
    pub logout_calls: Arc<AtomicUsize>,
    pub valid_token: Arc<Mutex<String>>,
    pub seen_tokens: Arc<Mutex<Vec<String>>>,
    /// When set, each refresh call waits for a permit before answering.
    pub refresh_gate: Option<Arc<Semaphore>>,
    /// When set, protected routes record the token, then wait for a permit.
    pub request_gate: Option<Arc<Semaphore>>,
    pub refresh_failure: Option<StatusCode>,
    pub always_unauthorized: bool,
}

impl Backend {
    pub fn new() -> Self {
        let backend = Self::default();
        // The stored access-1 is already expired from the server's view
        *backend.valid_token.lock().unwrap() = "access-2".to_string();
        backend
    }

    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.refresh_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn gated_requests(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.request_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn hits_with(&self, token: &str) -> usize {
        self.seen_tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.as_str() == token)
            .count()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> bool {
    let token = bearer(headers);
    backend
        .seen_tokens
        .lock()
        .unwrap()
        .push(token.clone().unwrap_or_default());

    let valid = backend.valid_token.lock().unwrap().clone();
    !backend.always_unauthorized && token.as_deref() == Some(valid.as_str())
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    if body["password"] != "correct-horse" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"}))).into_response();
    }
    Json(json!({
        "access": "access-2",
        "refresh": "refresh-2",
        "user": {"id": "u-1", "email": body["email"], "name": "Pat"}
    }))
    .into_response()
}

async fn refresh(State(backend): State<Backend>, Json(body): Json<serde_json::Value>) -> Response {
    let call = backend.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    if let Some(gate) = &backend.refresh_gate {
        gate.acquire().await.unwrap().forget();
    }
    if let Some(status) = backend.refresh_failure {
        return status.into_response();
    }
    // Refresh tokens are single use
    if call > 1 || body["refresh"] != "refresh-1" {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let access = format!("access-{}", call + 1);
    *backend.valid_token.lock().unwrap() = access.clone();
    Json(json!({
        "access": access,
        "refresh": format!("refresh-{}", call + 1),
        "expiresAt": "2099-01-01T00:00:00Z"
    }))
    .into_response()
}

async fn logout(State(backend): State<Backend>) -> Response {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({})).into_response()
}

async fn protected(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    let authorized = authorized(&backend, &headers);
    if let Some(gate) = &backend.request_gate {
        gate.acquire().await.unwrap().forget();
    }
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({"ok": true, "token": bearer(&headers)})).into_response()
}

async fn dashboard(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "glucose": {"value": 6.4, "unit": "mmol/L", "trend": "flat", "measuredAt": "2026-03-01T08:00:00Z"},
        "alerts": [],
        "healthScore": 77
    }))
    .into_response()
}

async fn teapot() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

pub async fn spawn(backend: Backend) -> String {
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/protected", get(protected))
        .route("/dashboard", get(dashboard))
        .route("/teapot", get(teapot))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Manager whose store already holds the expired `access-1` / `refresh-1` pair.
pub async fn seeded_manager(url: &str) -> SessionManager {
    seeded_manager_with(Settings::with_server_url(url)).await
}

pub async fn seeded_manager_with(settings: Settings) -> SessionManager {
    let store = Arc::new(TokenStore::in_memory());
    store
        .save_session(&Session::new("access-1", "refresh-1"), Some(&user()))
        .await
        .unwrap();
    SessionManager::with_store(&settings, store).unwrap()
}

pub fn user() -> User {
    User {
        id: "u-1".to_string(),
        email: "pat@example.com".to_string(),
        name: Some("Pat".to_string()),
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}
