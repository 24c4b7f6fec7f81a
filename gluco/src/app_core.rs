use crate::events::{DataEvent, SessionStatus, StreamStatus};
use crate::state::reducer::{self, Effect};
use crate::state::DashboardState;
use gluco_api::endpoints::{
    alerts::AlertEvent, dashboard::DashboardSnapshot, glucose::GlucoseReading,
};
use tokio::sync::watch;

/// Receives alerts pushed by the live stream.
///
/// Each alert is delivered exactly once and is not kept anywhere else by the
/// core. Production logs them; tests record them.
pub trait AlertSink: Send {
    fn on_alert(&mut self, alert: &AlertEvent);
}

/// Default sink that writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn on_alert(&mut self, alert: &AlertEvent) {
        tracing::warn!(
            alert_type = %alert.alert_type,
            severity = ?alert.severity,
            payload = %alert.payload,
            "Glucose alert"
        );
    }
}

/// Subscribable view of the dashboard for presentation code.
#[derive(Clone)]
pub struct DashboardHandle {
    reading: watch::Receiver<Option<GlucoseReading>>,
    snapshot: watch::Receiver<Option<DashboardSnapshot>>,
    latest_alert: watch::Receiver<Option<AlertEvent>>,
    stream_status: watch::Receiver<StreamStatus>,
    session: watch::Receiver<SessionStatus>,
}

impl DashboardHandle {
    pub fn current_reading(&self) -> Option<GlucoseReading> {
        self.reading.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn latest_alert(&self) -> Option<AlertEvent> {
        self.latest_alert.borrow().clone()
    }

    pub fn stream_status(&self) -> StreamStatus {
        *self.stream_status.borrow()
    }

    pub fn session(&self) -> SessionStatus {
        *self.session.borrow()
    }

    /// Wait for the next reading change. Returns `false` once the app is gone.
    pub async fn reading_changed(&mut self) -> bool {
        self.reading.changed().await.is_ok()
    }

    /// Wait for the next alert. Returns `false` once the app is gone.
    pub async fn alert_received(&mut self) -> bool {
        self.latest_alert.changed().await.is_ok()
    }

    pub async fn session_changed(&mut self) -> bool {
        self.session.changed().await.is_ok()
    }

    pub async fn stream_status_changed(&mut self) -> bool {
        self.stream_status.changed().await.is_ok()
    }
}

/// Testable application core without any I/O
///
/// Owns the dashboard state, runs every data event through the reducer, and
/// publishes the resulting effects. Generic over the alert sink so tests can
/// capture forwarded alerts.
pub struct AppCore<S: AlertSink> {
    state: DashboardState,
    alerts: S,
    reading: watch::Sender<Option<GlucoseReading>>,
    snapshot: watch::Sender<Option<DashboardSnapshot>>,
    latest_alert: watch::Sender<Option<AlertEvent>>,
    stream_status: watch::Sender<StreamStatus>,
    session: watch::Sender<SessionStatus>,
}

impl<S: AlertSink> AppCore<S> {
    pub fn new(alerts: S) -> Self {
        Self {
            state: DashboardState::new(),
            alerts,
            reading: watch::Sender::new(None),
            snapshot: watch::Sender::new(None),
            latest_alert: watch::Sender::new(None),
            stream_status: watch::Sender::new(StreamStatus::default()),
            session: watch::Sender::new(SessionStatus::default()),
        }
    }

    pub fn subscribe(&self) -> DashboardHandle {
        DashboardHandle {
            reading: self.reading.subscribe(),
            snapshot: self.snapshot.subscribe(),
            latest_alert: self.latest_alert.subscribe(),
            stream_status: self.stream_status.subscribe(),
            session: self.session.subscribe(),
        }
    }

    /// Apply a data event and publish what changed.
    pub fn handle_data_event(&mut self, event: DataEvent) -> Vec<Effect> {
        let effects = reducer::reduce_data_event(&mut self.state, event);
        for effect in &effects {
            self.publish(effect);
        }
        effects
    }

    /// Get read-only access to the current state
    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn alert_sink(&self) -> &S {
        &self.alerts
    }

    fn publish(&mut self, effect: &Effect) {
        match effect {
            Effect::ReadingChanged(reading) => {
                self.reading.send_replace(reading.clone());
            }
            Effect::SnapshotChanged => {
                self.snapshot.send_replace(self.state.snapshot.clone());
            }
            Effect::ForwardAlert(alert) => {
                self.alerts.on_alert(alert);
                self.latest_alert.send_replace(Some(alert.clone()));
            }
            Effect::StreamStatusChanged(status) => {
                self.stream_status.send_replace(*status);
            }
            Effect::SessionChanged(status) => {
                self.session.send_replace(*status);
            }
        }
    }
}
