#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gluco::stream::StreamConfig;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as WsResponse};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Local WebSocket server that records the token each client connected with.
pub struct WsServer {
    pub url: String,
    tokens: Arc<Mutex<Vec<String>>>,
    connections: mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>,
}

impl WsServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let (conn_tx, connections) = mpsc::unbounded_channel();

        let seen = tokens.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let seen = seen.clone();
                let record_token = move |req: &Request, resp: WsResponse| {
                    let token = req
                        .uri()
                        .query()
                        .and_then(|q| q.split('&').find_map(|p| p.strip_prefix("token=")))
                        .unwrap_or_default()
                        .to_string();
                    seen.lock().unwrap().push(token);
                    Ok::<_, ErrorResponse>(resp)
                };
                if let Ok(ws) = accept_hdr_async(tcp, record_token).await {
                    let _ = conn_tx.send(ws);
                }
            }
        });

        Self {
            url: format!("ws://{addr}/ws/glucose"),
            tokens,
            connections,
        }
    }

    pub async fn next_connection(&mut self) -> WebSocketStream<TcpStream> {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("no client connected")
            .unwrap()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }
}

/// Fake REST backend. Login always issues `access-1` / `refresh-1`; once
/// `revoked` is set every token and refresh is rejected.
#[derive(Clone, Default)]
pub struct Backend {
    pub revoked: Arc<AtomicBool>,
    pub dashboard_calls: Arc<AtomicUsize>,
    pub logout_calls: Arc<AtomicUsize>,
}

impl Backend {
    pub fn revoked() -> Self {
        let backend = Self::default();
        backend.revoked.store(true, Ordering::SeqCst);
        backend
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

fn authorized(backend: &Backend, headers: &HeaderMap) -> bool {
    let token = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    !backend.revoked.load(Ordering::SeqCst) && token == Some("access-1")
}

async fn login(Json(body): Json<serde_json::Value>) -> Response {
    Json(json!({
        "access": "access-1",
        "refresh": "refresh-1",
        "user": {"id": "u-1", "email": body["email"], "name": "Pat"}
    }))
    .into_response()
}

async fn refresh() -> Response {
    StatusCode::UNAUTHORIZED.into_response()
}

async fn logout(State(backend): State<Backend>) -> Response {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT.into_response()
}

async fn dashboard(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    backend.dashboard_calls.fetch_add(1, Ordering::SeqCst);
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "glucose": {"value": 6.4, "unit": "mmol/L", "trend": "flat", "measuredAt": "2026-03-01T09:00:00Z"},
        "medication": {"name": "Metformin", "adherencePct": 92.0},
        "alerts": [],
        "healthScore": 77
    }))
    .into_response()
}

async fn acknowledge(
    State(backend): State<Backend>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&backend, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != "a-1" {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "no such alert"}))).into_response();
    }
    Json(json!({"acknowledgedAt": "2026-03-01T09:05:00Z"})).into_response()
}

pub async fn spawn(backend: Backend) -> String {
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/dashboard", get(dashboard))
        .route("/alerts/{id}/ack", post(acknowledge))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}
