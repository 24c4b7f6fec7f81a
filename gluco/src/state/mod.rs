pub mod reducer;

use crate::events::{PollId, SessionStatus, StreamId, StreamStatus};
use gluco_api::endpoints::{dashboard::DashboardSnapshot, glucose::GlucoseReading};

/// Represents loading state separate from data state
#[derive(Default, Debug, Clone, PartialEq)]
pub enum LoadingState {
    #[default]
    NotStarted,
    Loaded,
    Error(String),
}

/// Where the reading currently in the glucose slot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseSource {
    Polled,
    Live,
}

/// Read-model of the dashboard, built from polled snapshots and the live stream.
#[derive(Default, Debug, Clone)]
pub struct DashboardState {
    pub snapshot: Option<DashboardSnapshot>,
    pub glucose_source: Option<GlucoseSource>,
    pub loading: LoadingState,
    /// Only poll results tagged with this run are applied.
    pub active_poll: Option<PollId>,

    /// Only events tagged with this stream are applied.
    pub active_stream: Option<StreamId>,
    pub stream_status: StreamStatus,

    pub session: SessionStatus,
    pub last_error: Option<String>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_reading(&self) -> Option<&GlucoseReading> {
        self.snapshot.as_ref().and_then(|s| s.glucose.as_ref())
    }

    pub fn is_stream_active(&self, stream: StreamId) -> bool {
        self.active_stream == Some(stream)
    }

    pub fn is_poll_active(&self, poll: PollId) -> bool {
        self.active_poll == Some(poll)
    }
}
