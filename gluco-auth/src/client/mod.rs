pub mod auth_client;
mod config;
mod http;
mod refresh;
mod session;
mod token_storage;

pub use auth_client::ServerAuthClient;
pub use config::Settings;
pub use http::{ApiRequest, AuthenticatedHttpClient};
pub use refresh::RefreshCoordinator;
pub use session::SessionManager;
pub use token_storage::{SessionKey, TokenStore};

use crate::common::User;
use crate::error::AuthError;
use secrecy::SecretString;

/// Login credentials supplied by the user or the environment.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Read `GLUCO_EMAIL` / `GLUCO_PASSWORD`, if both are set.
    pub fn from_env() -> Option<Self> {
        let email = std::env::var("GLUCO_EMAIL").ok()?;
        let password = std::env::var("GLUCO_PASSWORD").ok()?;
        Some(Self::new(email, password))
    }
}

/// Resume the stored session, or log in with `credentials` when there is none.
pub async fn authenticate(
    manager: &SessionManager,
    credentials: Option<&Credentials>,
) -> Result<User, AuthError> {
    if let Some(user) = manager.restore().await? {
        tracing::info!(user_id = %user.id, "Resumed stored session");
        return Ok(user);
    }

    let credentials = credentials.ok_or(AuthError::NotAuthenticated)?;
    manager
        .login(&credentials.email, &credentials.password)
        .await
}
