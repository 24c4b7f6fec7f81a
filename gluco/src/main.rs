use anyhow::Result;

use gluco::{App, Exit};
use gluco_auth::{Credentials, SessionManager, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let (log_path, _log_guard) = gluco::logging::init_logging()?;

    let settings = Settings::new()?;
    settings.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(server = %settings.server_url, log = %log_path.display(), "gluco starting");

    let sessions = SessionManager::new(&settings)?;
    let user = gluco_auth::authenticate(&sessions, Credentials::from_env().as_ref())
        .await
        .map_err(|e| match e {
            gluco_auth::AuthError::NotAuthenticated => {
                anyhow::anyhow!("No stored session; set GLUCO_EMAIL and GLUCO_PASSWORD to log in")
            }
            other => other.into(),
        })?;
    tracing::info!(user_id = %user.id, "Signed in");

    let mut app = App::new(settings, sessions);
    match app.run().await? {
        Exit::Shutdown => Ok(()),
        Exit::SessionEnded => anyhow::bail!("Session expired; log in again"),
    }
}
