mod models;

use crate::error::{AuthError, RefreshError};
pub use models::{LoginResponse, RefreshResponse};
use models::*;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Bare transport for the `/auth/*` endpoints.
///
/// Deliberately has no bearer handling and no 401 interception, so the
/// refresh call can never recurse into another refresh.
pub struct ServerAuthClient {
    http_client: Client,
    server_url: String,
}

impl ServerAuthClient {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            server_url: server_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, AuthError> {
        let url = format!("{}/auth/login", self.server_url);
        let req = LoginRequest {
            email,
            password: password.expose_secret(),
        };

        let resp = self.http_client.post(&url).json(&req).send().await?;

        let status = resp.status();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(AuthError::LoginRejected(status));
        }

        Ok(resp.error_for_status()?.json::<LoginResponse>().await?)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let url = format!("{}/auth/refresh", self.server_url);
        let req = RefreshRequest {
            refresh: refresh_token,
        };

        let resp = self
            .http_client
            .post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<RefreshResponse>()
            .await?;

        Ok(resp)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/logout", self.server_url);
        let req = LogoutRequest {
            refresh: refresh_token,
        };

        self.http_client
            .post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
