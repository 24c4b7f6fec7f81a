//! Merges polled dashboard snapshots with live stream events.
//!
//! Polling owns every slot of the snapshot. The live stream may only patch
//! the glucose slot, and only forward in time: a reading whose `measured_at`
//! is not newer than the one on display is dropped, whichever source it came
//! from. Alerts pushed by the stream are handed out as effects and never
//! stored, so the snapshot's alert list stays poll-only.
//!
//! Poll and stream events carry the id of the run that produced them. Once a
//! run is stopped, or the session ends, whatever it still had queued is
//! dropped.

use super::{DashboardState, GlucoseSource, LoadingState};
use crate::events::{DataEvent, SessionStatus, StreamStatus};
use gluco_api::endpoints::{alerts::AlertEvent, glucose::GlucoseReading};

/// Side effects the caller publishes after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ReadingChanged(Option<GlucoseReading>),
    SnapshotChanged,
    ForwardAlert(AlertEvent),
    StreamStatusChanged(StreamStatus),
    SessionChanged(SessionStatus),
}

/// Pure state transition function for data events
pub fn reduce_data_event(state: &mut DashboardState, event: DataEvent) -> Vec<Effect> {
    match event {
        DataEvent::PollStarted { poll } => {
            state.active_poll = Some(poll);
            Vec::new()
        }

        DataEvent::PollStopped { poll } => {
            if state.is_poll_active(poll) {
                state.active_poll = None;
            }
            Vec::new()
        }

        DataEvent::SnapshotLoaded { poll, mut snapshot } => {
            if !state.is_poll_active(poll) {
                tracing::debug!(?poll, "Ignoring snapshot from inactive poller");
                return Vec::new();
            }

            let displayed = state.current_reading().cloned();

            let keep_displayed = match (&displayed, &snapshot.glucose) {
                (Some(shown), Some(polled)) => shown.is_newer_than(polled),
                // A poll without glucose does not blank a reading on display
                (Some(_), None) => true,
                _ => false,
            };

            if keep_displayed {
                tracing::debug!("Keeping newer reading on display over polled one");
                snapshot.glucose = displayed.clone();
            } else {
                state.glucose_source = snapshot.glucose.as_ref().map(|_| GlucoseSource::Polled);
            }

            let reading_changed = snapshot.glucose != displayed;
            let reading = snapshot.glucose.clone();
            state.snapshot = Some(snapshot);
            state.loading = LoadingState::Loaded;
            state.last_error = None;

            let mut effects = vec![Effect::SnapshotChanged];
            if reading_changed {
                effects.push(Effect::ReadingChanged(reading));
            }
            effects
        }

        DataEvent::LoadError { poll, error } => {
            if !state.is_poll_active(poll) {
                return Vec::new();
            }
            // Keep showing the last good snapshot
            if state.snapshot.is_none() {
                state.loading = LoadingState::Error(error.clone());
            }
            state.last_error = Some(error);
            Vec::new()
        }

        DataEvent::StreamStarted { stream } => {
            state.active_stream = Some(stream);
            state.stream_status = StreamStatus::Connecting;
            vec![Effect::StreamStatusChanged(StreamStatus::Connecting)]
        }

        DataEvent::StreamStopped { stream } => {
            if !state.is_stream_active(stream) {
                return Vec::new();
            }
            state.active_stream = None;
            state.stream_status = StreamStatus::Disconnected;
            vec![Effect::StreamStatusChanged(StreamStatus::Disconnected)]
        }

        DataEvent::StreamStatusChanged { stream, status } => {
            if !state.is_stream_active(stream) || state.stream_status == status {
                return Vec::new();
            }
            state.stream_status = status;
            vec![Effect::StreamStatusChanged(status)]
        }

        DataEvent::ReadingReceived { stream, reading } => {
            if !state.is_stream_active(stream) {
                tracing::debug!(?stream, "Ignoring reading from inactive stream");
                return Vec::new();
            }

            if let Some(current) = state.current_reading() {
                if !reading.is_newer_than(current) {
                    tracing::debug!(
                        measured_at = %reading.measured_at,
                        displayed = %current.measured_at,
                        "Ignoring live reading that is not newer than the one on display"
                    );
                    return Vec::new();
                }
            }

            // Other slots stay as the last poll left them
            let snapshot = state.snapshot.get_or_insert_with(Default::default);
            snapshot.glucose = Some(reading.clone());
            state.glucose_source = Some(GlucoseSource::Live);

            vec![
                Effect::ReadingChanged(Some(reading)),
                Effect::SnapshotChanged,
            ]
        }

        DataEvent::AlertReceived { stream, alert } => {
            if !state.is_stream_active(stream) {
                tracing::debug!(?stream, "Ignoring alert from inactive stream");
                return Vec::new();
            }
            vec![Effect::ForwardAlert(alert)]
        }

        DataEvent::SessionChanged {
            status: SessionStatus::LoggedIn,
            ..
        } => {
            if state.session == SessionStatus::LoggedIn {
                return Vec::new();
            }
            state.session = SessionStatus::LoggedIn;
            state.last_error = None;
            vec![Effect::SessionChanged(SessionStatus::LoggedIn)]
        }

        DataEvent::SessionChanged {
            status: SessionStatus::LoggedOut,
            reason,
        } => end_session(state, reason),

        DataEvent::SessionExpired { poll, reason } => {
            if !state.is_poll_active(poll) {
                tracing::debug!(?poll, "Ignoring session expiry from inactive poller");
                return Vec::new();
            }
            end_session(state, Some(reason))
        }
    }
}

/// Back to the logged-out default. Every run id is forgotten with it.
fn end_session(state: &mut DashboardState, reason: Option<String>) -> Vec<Effect> {
    let was_logged_in = state.session == SessionStatus::LoggedIn;
    let had_reading = state.current_reading().is_some();
    let had_snapshot = state.snapshot.is_some();
    let was_streaming = state.stream_status != StreamStatus::Disconnected;

    *state = DashboardState {
        last_error: reason,
        ..DashboardState::default()
    };

    let mut effects = Vec::new();
    if had_reading {
        effects.push(Effect::ReadingChanged(None));
    }
    if had_snapshot {
        effects.push(Effect::SnapshotChanged);
    }
    if was_streaming {
        effects.push(Effect::StreamStatusChanged(StreamStatus::Disconnected));
    }
    if was_logged_in {
        effects.push(Effect::SessionChanged(SessionStatus::LoggedOut));
    }
    effects
}
