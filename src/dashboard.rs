use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api_client::ApiClient;
use crate::auth::AuthStore;
use crate::deployments::{fetch_deployment_history, fetch_deployment_logs, fetch_deployment_stats};
use crate::error::ApiError;
use crate::models::DashboardState;
use crate::pipelines::fetch_pipelines;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const SESSION_EXPIRED: &str = "Session expired. Please sign in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated,
    Failed,
    /// A newer cycle already published; this one's results were dropped.
    Stale,
    SessionExpired,
}

/// Handle to the repeating refresh task. `arm` and `cancel` are the only
/// mutators, so at most one timer is ever live. Cancelling only interrupts
/// the wait between ticks; a cycle already running finishes and publishes.
#[derive(Default)]
struct RefreshTimer {
    slot: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl RefreshTimer {
    fn arm<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(h, _)| !h.is_finished()) {
            return false;
        }
        let token = CancellationToken::new();
        *slot = Some((tokio::spawn(task(token.clone())), token));
        true
    }

    fn cancel(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.take() {
            Some((handle, token)) => {
                token.cancel();
                !handle.is_finished()
            }
            None => false,
        }
    }

    fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(h, _)| !h.is_finished())
    }
}

struct Inner {
    client: ApiClient,
    auth: AuthStore,
    state: watch::Sender<DashboardState>,
    interval: Duration,
    timer: RefreshTimer,
    started_cycles: AtomicU64,
    committed_cycle: AtomicU64,
}

/// Owns the dashboard snapshot and the polling timer that keeps it fresh.
#[derive(Clone)]
pub struct DashboardStore {
    inner: Arc<Inner>,
}

impl DashboardStore {
    pub fn new(client: ApiClient, auth: AuthStore, interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(DashboardState::default());
        Self {
            inner: Arc::new(Inner {
                client,
                auth,
                state: tx,
                interval: interval.max(Duration::from_millis(1)),
                timer: RefreshTimer::default(),
                started_cycles: AtomicU64::new(0),
                committed_cycle: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.inner.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.timer.is_armed()
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Refreshes now, then every `interval`. No-op while already running.
    pub fn start(&self) -> bool {
        let store = self.clone();
        let period = self.inner.interval;
        let armed = self.inner.timer.arm(|cancelled| async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // first tick completes immediately
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if store.refresh().await == RefreshOutcome::SessionExpired {
                    break;
                }
            }
        });
        if armed {
            info!("Dashboard polling started (every {:?})", period);
        }
        armed
    }

    /// Cancels future ticks. A refresh already under way runs to completion.
    pub fn stop(&self) -> bool {
        let stopped = self.inner.timer.cancel();
        if stopped {
            info!("Dashboard polling stopped");
        }
        stopped
    }

    /// Keeps polling in step with the session: a new login re-arms the
    /// timer and a logout stops it. Abort the returned handle to detach.
    pub fn follow_auth(&self) -> JoinHandle<()> {
        let store = self.clone();
        let mut rx = self.inner.auth.subscribe();
        tokio::spawn(async move {
            let mut was_authenticated = rx.borrow_and_update().is_authenticated();
            while rx.changed().await.is_ok() {
                let authenticated = rx.borrow_and_update().is_authenticated();
                if authenticated && !was_authenticated {
                    info!("Session established, resuming dashboard polling");
                    store.start();
                } else if !authenticated && was_authenticated {
                    store.stop();
                }
                was_authenticated = authenticated;
            }
        })
    }

    /// One full refresh cycle. Stats, history and logs degrade to local
    /// fallbacks; only a pipelines failure aborts the cycle.
    pub async fn refresh(&self) -> RefreshOutcome {
        let cycle = self.inner.started_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting refresh cycle {}", cycle);
        self.inner.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });

        let client = &self.inner.client;
        let feed = match fetch_pipelines(client).await {
            Ok(feed) => feed,
            Err(e) => return self.fail(cycle, e).await,
        };

        let (metrics, history, logs) = tokio::join!(
            fetch_deployment_stats(client, Some(&feed.pipelines)),
            fetch_deployment_history(client, Some(&feed.pipelines)),
            fetch_deployment_logs(client),
        );

        if !self.claim(cycle) {
            debug!("Dropping results of superseded refresh cycle {}", cycle);
            return RefreshOutcome::Stale;
        }

        info!(
            "Refresh cycle {} complete: {} pipelines, {} log entries",
            cycle,
            feed.pipelines.len(),
            logs.len()
        );
        self.inner.state.send_replace(DashboardState {
            pipelines: feed.pipelines,
            metrics,
            history,
            logs,
            last_updated: Some(Utc::now()),
            loading: false,
            error: None,
        });
        RefreshOutcome::Updated
    }

    async fn fail(&self, cycle: u64, err: ApiError) -> RefreshOutcome {
        let expired = err.is_auth_failure();
        let message = if expired {
            warn!("Session rejected by API ({}), signing out", err);
            if let Err(e) = self.inner.auth.logout().await {
                error!("Failed to clear persisted session: {}", e);
            }
            self.stop();
            SESSION_EXPIRED.to_string()
        } else {
            error!("Refresh cycle {} failed: {}", cycle, err);
            err.to_string()
        };

        if !self.claim(cycle) {
            debug!("Dropping error of superseded refresh cycle {}", cycle);
        } else {
            self.inner.state.send_modify(|s| {
                s.loading = false;
                s.error = Some(message);
            });
        }

        if expired {
            RefreshOutcome::SessionExpired
        } else if self.inner.committed_cycle.load(Ordering::SeqCst) > cycle {
            RefreshOutcome::Stale
        } else {
            RefreshOutcome::Failed
        }
    }

    /// True when no newer cycle has published yet; records this one as the latest.
    fn claim(&self, cycle: u64) -> bool {
        self.inner.committed_cycle.fetch_max(cycle, Ordering::SeqCst) < cycle
    }
}
