use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token storage error: {0}")]
    TokenStorage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Login rejected ({0})")]
    LoginRejected(StatusCode),

    #[error("API error: {0}")]
    Api(#[from] gluco_api::ApiError),

    #[error("Not authenticated")]
    NotAuthenticated,

    /// A request was still rejected after its single post-refresh retry.
    #[error("Authorization failed after token refresh")]
    Unauthorized,

    /// The 401 could not be recovered because the refresh failed; the stored
    /// session has been cleared and the user must log in again.
    #[error("Request unauthorized ({status}) and session invalidated: {source}")]
    SessionInvalidated {
        status: StatusCode,
        #[source]
        source: RefreshError,
    },
}

impl AuthError {
    /// Whether presentation should route the user back to the login flow.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::Unauthorized
                | AuthError::SessionInvalidated { .. }
                | AuthError::NotAuthenticated
        )
    }
}

impl From<config::ConfigError> for AuthError {
    fn from(err: config::ConfigError) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

/// Outcome of a failed refresh cycle. Cloned to every caller waiting on the
/// cycle, so it holds shared or owned data only.
#[derive(Error, Debug, Clone)]
pub enum RefreshError {
    #[error("No refresh token stored")]
    MissingRefreshToken,

    #[error("Refresh rejected by server ({status})")]
    Rejected { status: StatusCode },

    #[error("Refresh transport error: {0}")]
    Transport(Arc<reqwest::Error>),

    #[error("Token storage error during refresh: {0}")]
    Storage(String),

    #[error("Refresh timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Session ended while refresh was in flight")]
    SessionEnded,

    #[error("Refresh abandoned before completion")]
    Abandoned,
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RefreshError::Rejected { status },
            None => RefreshError::Transport(Arc::new(err)),
        }
    }
}
