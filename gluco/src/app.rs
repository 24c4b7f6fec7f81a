use std::future::Future;
use tokio::sync::mpsc;

use crate::app_core::{AlertSink, AppCore, DashboardHandle, LogAlertSink};
use crate::background::{poller::DashboardPoller, BackgroundTaskManager, TaskKind};
use crate::events::{DataEvent, PollId, SessionStatus};
use crate::state::reducer::Effect;
use crate::state::DashboardState;
use crate::stream::{RealtimeGlucoseStream, StreamConfig, StreamError};
use gluco_api::endpoints::alerts::AlertAck;
use gluco_api::Request;
use gluco_auth::{AuthError, AuthenticatedHttpClient, Credentials, SessionManager, Settings, User};

/// Why [`App::run_until`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    SessionEnded,
}

/// Wires the session, the dashboard poller and the live stream to the core.
///
/// The stream and the poller run only while the dashboard is mounted and a
/// session exists. Logging out, unmounting or losing the session stops both.
pub struct App<S: AlertSink = LogAlertSink> {
    settings: Settings,
    sessions: SessionManager,
    core: AppCore<S>,
    tasks: BackgroundTaskManager,
    stream: Option<RealtimeGlucoseStream>,
    poll: Option<PollId>,
    next_poll: u64,
    mounted: bool,
    data_tx: mpsc::UnboundedSender<DataEvent>,
    data_rx: mpsc::UnboundedReceiver<DataEvent>,
}

impl App<LogAlertSink> {
    pub fn new(settings: Settings, sessions: SessionManager) -> Self {
        Self::with_alert_sink(settings, sessions, LogAlertSink)
    }
}

impl<S: AlertSink> App<S> {
    pub fn with_alert_sink(settings: Settings, sessions: SessionManager, alerts: S) -> Self {
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            sessions,
            core: AppCore::new(alerts),
            tasks: BackgroundTaskManager::new(),
            stream: None,
            poll: None,
            next_poll: 0,
            mounted: false,
            data_tx,
            data_rx,
        }
    }

    pub fn subscribe(&self) -> DashboardHandle {
        self.core.subscribe()
    }

    pub fn state(&self) -> &DashboardState {
        self.core.state()
    }

    pub fn alert_sink(&self) -> &S {
        self.core.alert_sink()
    }

    pub fn http_client(&self) -> AuthenticatedHttpClient {
        self.sessions.http_client()
    }

    pub fn is_polling(&self) -> bool {
        self.tasks.is_running(TaskKind::DashboardPoll)
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Pick up a stored session, if any.
    pub async fn resume(&mut self) -> Result<Option<User>, AuthError> {
        let user = self.sessions.restore().await?;
        if user.is_some() {
            self.session_started().await;
        }
        Ok(user)
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<User, AuthError> {
        // Nothing from a previous session may outlive the new login
        self.stop_live();

        let user = self
            .sessions
            .login(&credentials.email, &credentials.password)
            .await?;
        self.session_started().await;
        Ok(user)
    }

    pub async fn logout(&mut self) -> Result<(), AuthError> {
        self.stop_live();
        let result = self.sessions.logout().await;
        self.apply(DataEvent::SessionChanged {
            status: SessionStatus::LoggedOut,
            reason: None,
        });
        result
    }

    /// The dashboard became visible
    pub async fn mount(&mut self) {
        self.mounted = true;
        if self.state().session == SessionStatus::LoggedIn {
            self.start_live().await;
        }
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
        self.stop_live();
    }

    pub async fn acknowledge_alert(&self, id: &str) -> Result<Option<AlertAck>, AuthError> {
        self.http_client()
            .send(&Request::alerts().acknowledge(id))
            .await
    }

    /// Process data events until `shutdown` resolves or the session ends.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> Exit {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    return Exit::Shutdown;
                }
                Some(event) = self.data_rx.recv() => {
                    let effects = self.apply(event);
                    if effects.contains(&Effect::SessionChanged(SessionStatus::LoggedOut)) {
                        return Exit::SessionEnded;
                    }
                }
            }
        }
    }

    /// Headless main loop: mount, run until Ctrl-C, clean up.
    pub async fn run(&mut self) -> Result<Exit, AuthError> {
        if self.state().session != SessionStatus::LoggedIn && self.resume().await?.is_none() {
            return Err(AuthError::NotAuthenticated);
        }

        self.mount().await;
        tracing::info!("Entering main event loop");

        let exit = self
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await;

        tracing::info!(?exit, "Cleaning up application");
        self.unmount();
        Ok(exit)
    }

    async fn session_started(&mut self) {
        self.apply(DataEvent::SessionChanged {
            status: SessionStatus::LoggedIn,
            reason: None,
        });
        if self.mounted {
            self.start_live().await;
        }
    }

    async fn start_live(&mut self) {
        self.stop_live();

        self.next_poll += 1;
        let poll = PollId(self.next_poll);
        self.apply(DataEvent::PollStarted { poll });
        self.poll = Some(poll);

        let poller = DashboardPoller::new(
            poll,
            self.sessions.http_client(),
            self.data_tx.clone(),
            self.settings.poll_interval(),
        );
        self.tasks.spawn_task(TaskKind::DashboardPoll, poller.run());

        match RealtimeGlucoseStream::open(
            StreamConfig::from_settings(&self.settings),
            self.sessions.store(),
            self.data_tx.clone(),
        )
        .await
        {
            Ok(stream) => {
                self.apply(DataEvent::StreamStarted { stream: stream.id() });
                self.stream = Some(stream);
            }
            Err(StreamError::MissingToken) => {
                tracing::warn!("No access token, live stream not opened");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to open live stream");
            }
        }
    }

    fn stop_live(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.close();
            self.apply(DataEvent::StreamStopped { stream: stream.id() });
        }
        self.tasks.cancel_all();
        // Results the poller queued before it was aborted are dropped by id
        if let Some(poll) = self.poll.take() {
            self.apply(DataEvent::PollStopped { poll });
        }
    }

    fn apply(&mut self, event: DataEvent) -> Vec<Effect> {
        let effects = self.core.handle_data_event(event);

        for effect in &effects {
            match effect {
                Effect::ReadingChanged(Some(reading)) => {
                    tracing::info!(
                        value = reading.value,
                        unit = %reading.unit,
                        trend = ?reading.trend,
                        measured_at = %reading.measured_at,
                        "Glucose reading"
                    );
                }
                Effect::StreamStatusChanged(status) => {
                    tracing::debug!(?status, "Live stream status changed");
                }
                Effect::SessionChanged(SessionStatus::LoggedOut) => {
                    tracing::warn!("Session ended, stopping live updates");
                    self.stop_live();
                }
                _ => {}
            }
        }

        effects
    }
}
