//! Live glucose feed over a WebSocket.
//!
//! The access token travels as the `token` query parameter. It is read from
//! the [`TokenStore`] on every connect attempt, so a reconnect after a token
//! refresh presents the new token. Unexpected disconnects reconnect with
//! exponential backoff until the stream is closed.

use crate::events::{DataEvent, StreamId, StreamStatus};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use gluco_api::stream::StreamMessage;
use gluco_auth::{AuthError, Settings, TokenStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("No access token available; the live stream needs a session")]
    MissingToken,

    #[error("Failed to read access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    Tungstenite(#[from] tungstenite::Error),
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl StreamConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.stream_url(),
            base_delay: Duration::from_millis(settings.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(settings.reconnect_max_delay_ms),
        }
    }
}

/// Handle to a running live stream. Dropping it closes the stream.
pub struct RealtimeGlucoseStream {
    id: StreamId,
    cancel: CancellationToken,
}

impl RealtimeGlucoseStream {
    /// Start the stream. Fails without connecting when no access token is stored.
    pub async fn open(
        config: StreamConfig,
        store: Arc<TokenStore>,
        data_tx: mpsc::UnboundedSender<DataEvent>,
    ) -> Result<Self, StreamError> {
        if store.access_token().await?.is_none() {
            return Err(StreamError::MissingToken);
        }
        // Reject a bad URL up front instead of retrying it forever
        url::Url::parse(&config.url)?;

        let id = StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();

        let task = StreamTask {
            id,
            config,
            store,
            data_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        tracing::info!(stream = id.0, "Live stream opened");
        Ok(Self { id, cancel })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Stop the stream. Safe to call any number of times; nothing is
    /// delivered for this stream once it returns.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(stream = self.id.0, "Closing live stream");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RealtimeGlucoseStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Cancelled,
    Disconnected,
}

struct StreamTask {
    id: StreamId,
    config: StreamConfig,
    store: Arc<TokenStore>,
    data_tx: mpsc::UnboundedSender<DataEvent>,
    cancel: CancellationToken,
}

impl StreamTask {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let token = match self.store.access_token().await {
                Ok(Some(token)) => token,
                Ok(None) => {
                    tracing::warn!(stream = self.id.0, "Access token gone, stopping live stream");
                    break;
                }
                Err(e) => {
                    tracing::error!(stream = self.id.0, error = %e, "Failed to read access token");
                    String::new()
                }
            };

            if !token.is_empty() {
                self.emit(DataEvent::StreamStatusChanged {
                    stream: self.id,
                    status: StreamStatus::Connecting,
                });

                match self.connect_and_read(&token, &mut attempt).await {
                    Ok(SessionEnd::Cancelled) => break,
                    Ok(SessionEnd::Disconnected) => {
                        tracing::warn!(stream = self.id.0, "Live stream disconnected");
                    }
                    Err(e) => {
                        tracing::warn!(stream = self.id.0, error = %e, "Live stream connection failed");
                    }
                }

                self.emit(DataEvent::StreamStatusChanged {
                    stream: self.id,
                    status: StreamStatus::Disconnected,
                });
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff_delay(attempt, self.config.base_delay, self.config.max_delay);
            tracing::warn!(
                stream = self.id.0,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting live stream"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(stream = self.id.0, "Live stream task finished");
    }

    /// One connection from handshake to close. `attempt` is reset as soon as
    /// the handshake succeeds, however the connection ends afterwards.
    async fn connect_and_read(
        &self,
        token: &str,
        attempt: &mut u32,
    ) -> Result<SessionEnd, StreamError> {
        let url = url_with_token(&self.config.url, token)?;

        let (ws_stream, _) = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            connected = tokio_tungstenite::connect_async(url.as_str()) => connected?,
        };

        tracing::info!(stream = self.id.0, "Live stream connected");
        *attempt = 0;
        self.emit(DataEvent::StreamStatusChanged {
            stream: self.id,
            status: StreamStatus::Connected,
        });

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(stream = self.id.0, ?frame, "Server closed live stream");
                        return Ok(SessionEnd::Disconnected);
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Disconnected),
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match StreamMessage::parse(text) {
            Ok(StreamMessage::Reading(reading)) => self.emit(DataEvent::ReadingReceived {
                stream: self.id,
                reading,
            }),
            Ok(StreamMessage::Alert(alert)) => self.emit(DataEvent::AlertReceived {
                stream: self.id,
                alert: alert.into_event(Utc::now()),
            }),
            Ok(StreamMessage::Unknown) => {
                tracing::debug!(stream = self.id.0, "Ignoring stream message of unknown kind");
            }
            Err(e) => {
                tracing::warn!(stream = self.id.0, error = %e, "Dropping malformed stream message");
            }
        }
    }

    fn emit(&self, event: DataEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.data_tx.send(event).is_err() {
            tracing::debug!(stream = self.id.0, "Event receiver dropped");
        }
    }
}

/// `base * 2^(attempt - 1)`, capped at `max`.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exponent).min(max)
}

fn url_with_token(base: &str, token: &str) -> Result<url::Url, StreamError> {
    let mut url = url::Url::parse(base)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}
