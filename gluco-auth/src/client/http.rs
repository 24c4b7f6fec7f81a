use crate::client::refresh::RefreshCoordinator;
use crate::client::token_storage::TokenStore;
use crate::error::{AuthError, RefreshError};
use gluco_api::endpoints::{Endpoint, RequestData};
use gluco_api::ApiError;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Replayable description of an outbound call.
///
/// Kept as plain data so the same request can be dispatched a second time
/// after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<serde_json::Value>,
    pub body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_query<T: Serialize>(mut self, query: &T) -> Result<Self, AuthError> {
        self.query = Some(serde_json::to_value(query)?).filter(|q| !q.is_null());
        Ok(self)
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, AuthError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn from_endpoint<E: Endpoint>(endpoint: &E) -> Result<Self, AuthError> {
        let req = Self::new(endpoint.method(), endpoint.endpoint());
        match endpoint.data() {
            RequestData::Empty => Ok(req),
            RequestData::Query(query) => req.with_query(query),
            RequestData::Json(body) => req.with_json(body),
        }
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// HTTP client for resource endpoints that attaches the bearer token and
/// recovers from an expired one.
///
/// A 401 is handed to the [`RefreshCoordinator`] and the request replayed
/// once with the new token. A second 401 is terminal. Every other status and
/// every transport error is returned untouched.
#[derive(Clone)]
pub struct AuthenticatedHttpClient {
    http_client: Client,
    base_url: String,
    store: Arc<TokenStore>,
    coordinator: RefreshCoordinator,
}

impl AuthenticatedHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        store: Arc<TokenStore>,
        coordinator: RefreshCoordinator,
    ) -> Result<Self, AuthError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            coordinator,
        })
    }

    pub async fn request(&self, mut req: ApiRequest) -> Result<Response, AuthError> {
        // The only thing the request phase waits on
        let mut token = self.store.access_token().await?;

        loop {
            let resp = self.dispatch(&req, token.as_deref()).await?;
            let status = resp.status();

            if status != StatusCode::UNAUTHORIZED {
                return Ok(resp);
            }

            if req.retried {
                tracing::warn!(path = %req.path, "Request still unauthorized after token refresh");
                return Err(AuthError::Unauthorized);
            }

            req.retried = true;
            token = Some(self.token_after_unauthorized(token.as_deref(), status).await?);
            tracing::debug!(path = %req.path, "Replaying request with refreshed token");
        }
    }

    /// Send a typed endpoint and decode its response body.
    pub async fn send<E: Endpoint>(&self, endpoint: &E) -> Result<E::Response, AuthError> {
        let resp = self.request(ApiRequest::from_endpoint(endpoint)?).await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(ApiError::from_body(status, &body).into());
        }

        // No-content responses decode as JSON null
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    async fn token_after_unauthorized(
        &self,
        sent: Option<&str>,
        status: StatusCode,
    ) -> Result<String, AuthError> {
        // Another caller may already have finished a refresh while this
        // request was in flight with the old token.
        if let Some(current) = self.store.access_token().await? {
            if sent != Some(current.as_str()) {
                tracing::debug!("Token already refreshed by another caller");
                return Ok(current);
            }
        }

        match self.coordinator.coordinate_refresh().await {
            Ok(token) => Ok(token),
            // The session this request belonged to is gone; storage may
            // already hold the next one.
            Err(source @ RefreshError::SessionEnded) => {
                Err(AuthError::SessionInvalidated { status, source })
            }
            Err(source) => {
                if let Err(e) = self.store.clear_session().await {
                    tracing::error!(error = %e, "Failed to clear session after refresh failure");
                }
                Err(AuthError::SessionInvalidated { status, source })
            }
        }
    }

    async fn dispatch(&self, req: &ApiRequest, token: Option<&str>) -> Result<Response, AuthError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = self.http_client.request(req.method.clone(), &url);

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(query) = &req.query {
            builder = builder.query(query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}
