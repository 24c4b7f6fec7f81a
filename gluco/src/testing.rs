use crate::app_core::{AlertSink, AppCore, DashboardHandle};
use crate::events::{DataEvent, PollId, SessionStatus, StreamId};
use crate::state::reducer::Effect;
use crate::state::DashboardState;
use chrono::{DateTime, Utc};
use gluco_api::endpoints::{
    alerts::AlertEvent, dashboard::DashboardSnapshot, glucose::GlucoseReading,
};
use std::sync::{Arc, Mutex};

/// Alert sink that keeps every alert it receives
#[derive(Debug, Default, Clone)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<AlertEvent>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn on_alert(&mut self, alert: &AlertEvent) {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(alert.clone());
    }
}

/// Poller id used by [`TestApp::poll`]
pub const TEST_POLL: PollId = PollId(1);

/// Drives an [`AppCore`] with hand-made data events, no tasks or network.
pub struct TestApp {
    core: AppCore<RecordingAlertSink>,
    handle: DashboardHandle,
}

impl TestApp {
    pub fn new() -> Self {
        let core = AppCore::new(RecordingAlertSink::new());
        let handle = core.subscribe();
        Self { core, handle }
    }

    /// A logged-in app polling as [`TEST_POLL`] with `stream` as the active
    /// live stream
    pub fn streaming(stream: StreamId) -> Self {
        let mut app = Self::new();
        app.send_data_event(DataEvent::SessionChanged {
            status: SessionStatus::LoggedIn,
            reason: None,
        });
        app.send_data_event(DataEvent::PollStarted { poll: TEST_POLL });
        app.send_data_event(DataEvent::StreamStarted { stream });
        app
    }

    /// Inject a data event (simulate a poll result or a stream message)
    pub fn send_data_event(&mut self, event: DataEvent) -> Vec<Effect> {
        self.core.handle_data_event(event)
    }

    pub fn poll(&mut self, snapshot: DashboardSnapshot) -> Vec<Effect> {
        self.send_data_event(DataEvent::SnapshotLoaded {
            poll: TEST_POLL,
            snapshot,
        })
    }

    pub fn push_reading(&mut self, stream: StreamId, reading: GlucoseReading) -> Vec<Effect> {
        self.send_data_event(DataEvent::ReadingReceived { stream, reading })
    }

    pub fn push_alert(&mut self, stream: StreamId, alert: AlertEvent) -> Vec<Effect> {
        self.send_data_event(DataEvent::AlertReceived { stream, alert })
    }

    pub fn state(&self) -> &DashboardState {
        self.core.state()
    }

    pub fn handle(&self) -> &DashboardHandle {
        &self.handle
    }

    pub fn forwarded_alerts(&self) -> Vec<AlertEvent> {
        self.core.alert_sink().alerts()
    }

    /// Assert the value and timestamp of the reading on display, both in
    /// state and as published to subscribers.
    pub fn assert_reading(&self, value: f64, measured_at: DateTime<Utc>) {
        let shown = self
            .state()
            .current_reading()
            .unwrap_or_else(|| panic!("Expected a reading of {value}, none on display"));
        assert_eq!(shown.value, value, "Unexpected reading on display");
        assert_eq!(shown.measured_at, measured_at, "Unexpected reading timestamp");

        let published = self.handle.current_reading();
        assert_eq!(
            published.as_ref(),
            Some(shown),
            "Published reading differs from state"
        );
    }

    pub fn assert_no_reading(&self) {
        assert!(
            self.state().current_reading().is_none(),
            "Expected no reading, found {:?}",
            self.state().current_reading()
        );
        assert!(self.handle.current_reading().is_none());
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
