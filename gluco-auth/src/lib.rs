// Types shared across the client
pub mod common;

mod client;
mod error;

pub use client::{
    authenticate, auth_client, ApiRequest, AuthenticatedHttpClient, Credentials,
    RefreshCoordinator, ServerAuthClient, SessionKey, SessionManager, Settings, TokenStore,
};
pub use common::{Session, User};
pub use error::{AuthError, RefreshError};
