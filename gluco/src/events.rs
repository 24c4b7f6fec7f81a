use gluco_api::endpoints::{
    alerts::AlertEvent, dashboard::DashboardSnapshot, glucose::GlucoseReading,
};

/// Identifies one opened live stream. A new id is issued on every open, so
/// events still in flight from a closed stream can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

/// Identifies one run of the dashboard poller, for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    LoggedIn,
    #[default]
    LoggedOut,
}

/// Data events (background tasks → state updates)
#[derive(Debug, Clone)]
pub enum DataEvent {
    // Polling
    PollStarted {
        poll: PollId,
    },
    PollStopped {
        poll: PollId,
    },
    SnapshotLoaded {
        poll: PollId,
        snapshot: DashboardSnapshot,
    },
    LoadError {
        poll: PollId,
        error: String,
    },
    /// The poller found the session unusable. Ends the session only if the
    /// poller is still the active one.
    SessionExpired {
        poll: PollId,
        reason: String,
    },

    // Live stream
    StreamStarted {
        stream: StreamId,
    },
    StreamStopped {
        stream: StreamId,
    },
    StreamStatusChanged {
        stream: StreamId,
        status: StreamStatus,
    },
    ReadingReceived {
        stream: StreamId,
        reading: GlucoseReading,
    },
    AlertReceived {
        stream: StreamId,
        alert: AlertEvent,
    },

    // Session
    SessionChanged {
        status: SessionStatus,
        reason: Option<String>,
    },
}
