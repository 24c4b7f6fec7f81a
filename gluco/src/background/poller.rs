use crate::events::{DataEvent, PollId};
use gluco_api::Request;
use gluco_auth::AuthenticatedHttpClient;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Periodically fetches the dashboard snapshot and reports it as data events
/// tagged with its [`PollId`].
#[derive(Clone)]
pub struct DashboardPoller {
    pub id: PollId,
    pub client: AuthenticatedHttpClient,
    pub data_tx: mpsc::UnboundedSender<DataEvent>,
    pub interval: Duration,
}

impl DashboardPoller {
    pub fn new(
        id: PollId,
        client: AuthenticatedHttpClient,
        data_tx: mpsc::UnboundedSender<DataEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            id,
            client,
            data_tx,
            interval,
        }
    }

    /// Poll until the session ends. The first poll happens immediately.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.load_dashboard().await {
                tracing::info!("Session ended, dashboard polling stopped");
                break;
            }
        }
    }

    /// Fetch one snapshot. Returns `false` once the session can no longer be used.
    pub async fn load_dashboard(&self) -> bool {
        tracing::debug!(poll = self.id.0, "Fetching dashboard snapshot");

        match self.client.send(&Request::dashboard().get()).await {
            Ok(snapshot) => {
                tracing::info!(
                    has_glucose = snapshot.glucose.is_some(),
                    alerts = snapshot.alerts.len(),
                    "Loaded dashboard snapshot"
                );
                let _ = self.data_tx.send(DataEvent::SnapshotLoaded {
                    poll: self.id,
                    snapshot,
                });
                true
            }
            Err(e) if e.requires_login() => {
                tracing::error!(error = %e, "Dashboard poll needs a new login");
                let _ = self.data_tx.send(DataEvent::SessionExpired {
                    poll: self.id,
                    reason: e.to_string(),
                });
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load dashboard");
                let _ = self.data_tx.send(DataEvent::LoadError {
                    poll: self.id,
                    error: e.to_string(),
                });
                true
            }
        }
    }
}
