use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Credentials for the current login. Owned by the token store; created by
/// login, mutated by refresh, cleared by logout or a failed refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Server-provided expiry of the access token, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_hint: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_hint: None,
        }
    }

    /// True when the hint says the access token expires within `buffer`.
    /// Without a hint the token is assumed valid until the server says otherwise.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        self.expires_hint
            .map(|expires_at| expires_at <= Utc::now() + buffer)
            .unwrap_or(false)
    }
}

/// Cached identity of the logged-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}
