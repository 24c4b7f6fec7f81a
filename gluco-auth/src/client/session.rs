use crate::client::auth_client::ServerAuthClient;
use crate::client::config::Settings;
use crate::client::http::AuthenticatedHttpClient;
use crate::client::refresh::RefreshCoordinator;
use crate::client::token_storage::TokenStore;
use crate::common::{Session, User};
use crate::error::AuthError;
use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;

/// Tokens this close to their expiry hint are refreshed on restore.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// Owns the session plumbing for one client process: storage, the bare auth
/// transport, the refresh coordinator and the authenticated client built on
/// top of them.
pub struct SessionManager {
    store: Arc<TokenStore>,
    auth_client: Arc<ServerAuthClient>,
    coordinator: RefreshCoordinator,
    http_client: AuthenticatedHttpClient,
}

impl SessionManager {
    pub fn new(settings: &Settings) -> Result<Self, AuthError> {
        let store = match &settings.token_dir {
            Some(dir) => TokenStore::at(dir)?,
            None => TokenStore::new()?,
        };
        Self::with_store(settings, Arc::new(store))
    }

    pub fn with_store(settings: &Settings, store: Arc<TokenStore>) -> Result<Self, AuthError> {
        settings.validate().map_err(AuthError::Configuration)?;

        let auth_client = Arc::new(ServerAuthClient::new(
            settings.server_url.clone(),
            settings.request_timeout(),
        )?);
        let coordinator = RefreshCoordinator::new(
            auth_client.clone(),
            store.clone(),
            settings.refresh_timeout(),
        );
        let http_client = AuthenticatedHttpClient::new(
            settings.server_url.clone(),
            settings.request_timeout(),
            store.clone(),
            coordinator.clone(),
        )?;

        Ok(Self {
            store,
            auth_client,
            coordinator,
            http_client,
        })
    }

    pub fn store(&self) -> Arc<TokenStore> {
        self.store.clone()
    }

    pub fn http_client(&self) -> AuthenticatedHttpClient {
        self.http_client.clone()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User, AuthError> {
        let resp = self.auth_client.login(email, password).await?;

        // Any refresh still running belongs to the previous session, and so
        // does one that starts before the new tokens are written
        self.coordinator.invalidate();

        let mut session = Session::new(resp.access, resp.refresh);
        session.expires_hint = resp.expires_at;
        self.store.save_session(&session, Some(&resp.user)).await?;

        self.coordinator.invalidate();

        tracing::info!(user_id = %resp.user.id, "Logged in");
        Ok(resp.user)
    }

    /// Cached identity, if a complete session is stored.
    ///
    /// An access token the server said is about to expire is refreshed up
    /// front. If that refresh fails the session is gone and `None` is returned.
    pub async fn restore(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.store.load_session().await? else {
            return Ok(None);
        };

        if session.expires_within(Duration::seconds(EXPIRY_BUFFER_SECS)) {
            tracing::info!(expires_at = ?session.expires_hint, "Stored access token about to expire, refreshing");
            if let Err(e) = self.coordinator.coordinate_refresh().await {
                tracing::warn!(error = %e, "Could not refresh stored session");
                return Ok(None);
            }
        }

        self.store.load_user().await
    }

    /// End the session. Safe to call repeatedly and while a refresh is in
    /// flight; only a storage failure is reported.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.coordinator.invalidate();

        match self.store.refresh_token().await {
            Ok(Some(refresh_token)) => {
                if let Err(e) = self.auth_client.logout(&refresh_token).await {
                    tracing::warn!(error = %e, "Remote logout failed, clearing local session anyway");
                }
            }
            Ok(None) => tracing::debug!("No refresh token stored, skipping remote logout"),
            Err(e) => tracing::warn!(error = %e, "Could not read refresh token for remote logout"),
        }

        self.store.clear_session().await?;
        tracing::info!("Logged out");
        Ok(())
    }
}
