//! Single-flight access token refresh.
//!
//! The first caller that needs a new token moves the coordinator from
//! `Idle` to `Refreshing` and starts exactly one refresh cycle. Everyone who
//! arrives while the cycle runs is queued and resolved, in arrival order, with
//! the cycle's outcome. The cycle runs on its own task so that a cancelled
//! caller cannot strand the queue, and a drop guard rejects every waiter if
//! the task dies without reporting.

use crate::client::auth_client::ServerAuthClient;
use crate::client::token_storage::{SessionKey, TokenStore};
use crate::error::RefreshError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type Outcome = Result<String, RefreshError>;
type Waiter = oneshot::Sender<Outcome>;

enum RefreshState {
    Idle,
    Refreshing {
        /// The caller that started the cycle. Answered directly, never queued.
        leader: Option<Waiter>,
        queue: VecDeque<Waiter>,
    },
}

struct Inner {
    state: Mutex<RefreshState>,
    epoch: AtomicU64,
    cycles: AtomicU64,
    auth_client: Arc<ServerAuthClient>,
    store: Arc<TokenStore>,
    timeout: Option<Duration>,
}

/// Process-wide owner of the refresh state and its queue of pending callers.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        auth_client: Arc<ServerAuthClient>,
        store: Arc<TokenStore>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                epoch: AtomicU64::new(0),
                cycles: AtomicU64::new(0),
                auth_client,
                store,
                timeout,
            }),
        }
    }

    /// Obtain a fresh access token, joining the in-flight cycle if there is one.
    pub async fn coordinate_refresh(&self) -> Outcome {
        let (tx, rx) = oneshot::channel();

        let starts_cycle = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                RefreshState::Refreshing { queue, .. } => {
                    queue.push_back(tx);
                    tracing::debug!(position = queue.len(), "Refresh in flight, queued");
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        leader: Some(tx),
                        queue: VecDeque::new(),
                    };
                    true
                }
            }
        };

        if starts_cycle {
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let guard = CycleGuard {
                    inner: inner.clone(),
                    finished: false,
                };
                let outcome = inner.run_cycle(epoch).await;
                guard.finish(outcome);
            });
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Mark the current session as ended. A cycle that is still running will
    /// complete, but it will not persist its token, it leaves storage to the
    /// next session and its waiters are rejected with `SessionEnded`.
    pub fn invalidate(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.inner.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Callers queued behind the in-flight cycle, excluding the one that started it.
    pub fn pending_len(&self) -> usize {
        match &*self.inner.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { queue, .. } => queue.len(),
        }
    }

    /// Number of refresh cycles started since construction.
    pub fn refresh_cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }
}

impl Inner {
    async fn run_cycle(&self, epoch: u64) -> Outcome {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(cycle, "Refreshing access token");

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.refresh_once(epoch))
                .await
                .unwrap_or(Err(RefreshError::TimedOut(limit))),
            None => self.refresh_once(epoch).await,
        };

        match result {
            Ok(token) => {
                tracing::info!(cycle, "Access token refreshed");
                Ok(token)
            }
            // Storage now belongs to whoever moved the epoch: logout already
            // cleared it and a new login has just written its own session.
            Err(e) if matches!(e, RefreshError::SessionEnded) || self.epoch_moved(epoch) => {
                tracing::info!(cycle, error = %e, "Refresh outlived its session, leaving storage alone");
                Err(RefreshError::SessionEnded)
            }
            Err(e) => {
                tracing::warn!(cycle, error = %e, "Token refresh failed, clearing session");
                if let Err(clear_err) = self.store.clear_session().await {
                    tracing::error!(error = %clear_err, "Failed to clear session after refresh failure");
                }
                Err(e)
            }
        }
    }

    async fn refresh_once(&self, epoch: u64) -> Outcome {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?
            .ok_or(RefreshError::MissingRefreshToken)?;

        let resp = self.auth_client.refresh(&refresh_token).await?;

        if self.epoch_moved(epoch) {
            return Err(RefreshError::SessionEnded);
        }

        self.store
            .set(SessionKey::AccessToken, &resp.access)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        if let Some(rotated) = &resp.refresh {
            self.store
                .set(SessionKey::RefreshToken, rotated)
                .await
                .map_err(|e| RefreshError::Storage(e.to_string()))?;
        }
        self.store
            .set_expires_hint(resp.expires_at)
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;

        // Logout and login bump the epoch before touching storage, so a bump
        // observed here means our write may have landed after theirs.
        if self.epoch_moved(epoch) {
            return Err(RefreshError::SessionEnded);
        }

        Ok(resp.access)
    }

    fn epoch_moved(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    /// Return to `Idle` and answer the leader, then the queue in FIFO order.
    fn complete(&self, outcome: Outcome) {
        let (leader, queue) = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { leader, queue } => (leader, queue),
                RefreshState::Idle => (None, VecDeque::new()),
            }
        };

        tracing::debug!(waiters = queue.len(), ok = outcome.is_ok(), "Draining refresh queue");

        if let Some(leader) = leader {
            let _ = leader.send(outcome.clone());
        }
        for waiter in queue {
            // Receiver may have been dropped by a cancelled caller
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Guarantees the queue is drained even if the cycle task is cancelled or panics.
struct CycleGuard {
    inner: Arc<Inner>,
    finished: bool,
}

impl CycleGuard {
    fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        self.inner.complete(outcome);
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("Refresh cycle ended without an outcome, rejecting waiters");
            self.inner.complete(Err(RefreshError::Abandoned));
        }
    }
}
