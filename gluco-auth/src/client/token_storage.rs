use crate::common::{Session, User};
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// The persisted session keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    AccessToken,
    RefreshToken,
    /// RFC 3339 expiry of the access token, when the server sent one.
    ExpiresAt,
    User,
}

impl SessionKey {
    pub const ALL: [SessionKey; 4] = [
        SessionKey::AccessToken,
        SessionKey::RefreshToken,
        SessionKey::ExpiresAt,
        SessionKey::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::AccessToken => "access_token",
            SessionKey::RefreshToken => "refresh_token",
            SessionKey::ExpiresAt => "expires_at",
            SessionKey::User => "user",
        }
    }
}

enum Backend {
    File { dir: PathBuf },
    Memory(Mutex<HashMap<SessionKey, String>>),
}

/// Durable key/value storage for the session. No validation and no retries;
/// storage failures are returned to the caller as `AuthError::TokenStorage`.
pub struct TokenStore {
    backend: Backend,
}

impl TokenStore {
    /// Store under the platform data directory.
    pub fn new() -> Result<Self, AuthError> {
        let dir = dirs::data_dir()
            .ok_or_else(|| AuthError::Configuration("Could not find data directory".to_string()))?
            .join("gluco");
        Self::at(dir)
    }

    /// Store each key as its own file under `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let dir = dir.into();

        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AuthError::TokenStorage(format!("Failed to create token directory: {}", e))
            })?;
        }

        Ok(Self {
            backend: Backend::File { dir },
        })
    }

    /// Process-local store, used by tests and ephemeral sessions.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: SessionKey) -> Result<Option<String>, AuthError> {
        match &self.backend {
            Backend::Memory(map) => {
                let value = map.lock().get(&key).cloned();
                Ok(value)
            }
            Backend::File { dir } => match fs::read_to_string(key_path(dir, key)).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(AuthError::TokenStorage(format!(
                    "Failed to read {}: {}",
                    key.as_str(),
                    e
                ))),
            },
        }
    }

    pub async fn set(&self, key: SessionKey, value: &str) -> Result<(), AuthError> {
        match &self.backend {
            Backend::Memory(map) => {
                let _ = map.lock().insert(key, value.to_string());
                Ok(())
            }
            Backend::File { dir } => {
                let path = key_path(dir, key);
                fs::write(&path, value).await.map_err(|e| {
                    AuthError::TokenStorage(format!("Failed to save {}: {}", key.as_str(), e))
                })?;

                // Owner read/write only
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                        .await
                        .map_err(|e| {
                            AuthError::TokenStorage(format!(
                                "Failed to set file permissions: {}",
                                e
                            ))
                        })?;
                }

                Ok(())
            }
        }
    }

    /// Remove the given keys. Missing keys are not an error.
    pub async fn clear(&self, keys: &[SessionKey]) -> Result<(), AuthError> {
        match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.lock();
                for key in keys {
                    map.remove(key);
                }
                Ok(())
            }
            Backend::File { dir } => {
                for key in keys {
                    match fs::remove_file(key_path(dir, *key)).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(AuthError::TokenStorage(format!(
                                "Failed to delete {}: {}",
                                key.as_str(),
                                e
                            )))
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Current access token; an empty value counts as absent.
    pub async fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .get(SessionKey::AccessToken)
            .await?
            .filter(|token| !token.is_empty()))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .get(SessionKey::RefreshToken)
            .await?
            .filter(|token| !token.is_empty()))
    }

    /// Expiry hint of the stored access token. An unreadable value is
    /// treated as no hint.
    pub async fn expires_hint(&self) -> Result<Option<DateTime<Utc>>, AuthError> {
        let Some(raw) = self.get(SessionKey::ExpiresAt).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(at) => Ok(Some(at.with_timezone(&Utc))),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed token expiry");
                Ok(None)
            }
        }
    }

    /// Store the expiry hint, or drop a stale one when there is none.
    pub async fn set_expires_hint(&self, hint: Option<DateTime<Utc>>) -> Result<(), AuthError> {
        match hint {
            Some(at) => self.set(SessionKey::ExpiresAt, &at.to_rfc3339()).await,
            None => self.clear(&[SessionKey::ExpiresAt]).await,
        }
    }

    /// Both tokens, if a complete session is stored.
    pub async fn load_session(&self) -> Result<Option<Session>, AuthError> {
        let access = self.access_token().await?;
        let refresh = self.refresh_token().await?;

        let (Some(access), Some(refresh)) = (access, refresh) else {
            return Ok(None);
        };
        let mut session = Session::new(access, refresh);
        session.expires_hint = self.expires_hint().await?;
        Ok(Some(session))
    }

    pub async fn save_session(&self, session: &Session, user: Option<&User>) -> Result<(), AuthError> {
        self.set(SessionKey::AccessToken, &session.access_token)
            .await?;
        self.set(SessionKey::RefreshToken, &session.refresh_token)
            .await?;
        self.set_expires_hint(session.expires_hint).await?;
        if let Some(user) = user {
            self.set(SessionKey::User, &serde_json::to_string(user)?)
                .await?;
        }
        Ok(())
    }

    pub async fn load_user(&self) -> Result<Option<User>, AuthError> {
        match self.get(SessionKey::User).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn clear_session(&self) -> Result<(), AuthError> {
        self.clear(&SessionKey::ALL).await
    }
}

fn key_path(dir: &Path, key: SessionKey) -> PathBuf {
    dir.join(key.as_str())
}
