use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::catalog::{Channel, ChannelSnapshot, DynChannelFeed};

// how long a stale snapshot is served as is after the feed failed, before get() tries again
pub const FAILED_REFRESH_BACKOFF: Duration = Duration::from_secs(30);

type PendingRefresh = Shared<BoxFuture<'static, Arc<ChannelSnapshot>>>;

struct RegistryState {
    feed: DynChannelFeed,
    freshness: Duration,
    snapshot: RwLock<Arc<ChannelSnapshot>>,
    // the refresh everyone joins while it's running, at most one exists
    pending: Mutex<Option<PendingRefresh>>,
    last_failure: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone)]
pub struct RegistryStatus {
    pub channels: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub refreshing: bool,
}

/// cached channel lineup
///
/// the snapshot is swapped as a whole, readers always get either the old or the new lineup.
/// a failed refresh keeps whatever was cached before, however old
#[derive(Clone)]
pub struct ChannelRegistry {
    state: Arc<RegistryState>,
}

impl ChannelRegistry {
    pub fn new(feed: DynChannelFeed, freshness: Duration) -> Self {
        Self {
            state: Arc::new(RegistryState {
                feed,
                freshness,
                snapshot: RwLock::new(Arc::new(ChannelSnapshot::empty())),
                pending: Mutex::new(None),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// whatever is cached right now, never waits
    pub fn current(&self) -> Arc<ChannelSnapshot> {
        self.state.current()
    }

    /// cached lineup, refreshed first (or joined onto a running refresh) when empty or stale
    ///
    /// a stale lineup is handed out without a new fetch while the last one failed recently, so
    /// a feed outage doesn't turn every read into a feed request
    pub async fn get(&self) -> Arc<ChannelSnapshot> {
        let snapshot = self.current();
        if snapshot.is_empty() || snapshot.is_stale(self.state.freshness) {
            if !snapshot.is_empty() && self.state.failed_recently() {
                debug!("channel snapshot is stale but the feed just failed, serving it as is");
                return snapshot;
            }
            debug!(
                "channel snapshot is {}, refreshing",
                if snapshot.is_empty() { "empty" } else { "stale" }
            );
            return self.refresh().await;
        }
        snapshot
    }

    pub async fn get_channel(&self, id: &str) -> Option<Channel> {
        self.get().await.find(id).cloned()
    }

    /// starts a refresh, or joins the one already running
    pub async fn refresh(&self) -> Arc<ChannelSnapshot> {
        let pending = {
            let mut guard = self
                .state
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match guard.as_ref() {
                Some(pending) => {
                    debug!("joining in-flight channel refresh");
                    pending.clone()
                }
                None => {
                    let pending = Self::start_refresh(self.state.clone());
                    *guard = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    pub fn status(&self) -> RegistryStatus {
        let snapshot = self.current();
        let refreshing = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();

        RegistryStatus {
            channels: snapshot.channels.len(),
            last_refresh: snapshot.updated_at,
            refreshing,
        }
    }

    /// refreshes once right away and then every freshness window
    pub fn spawn_refresh_loop(&self) -> JoinHandle<()> {
        let registry = self.clone();
        let period = self.state.freshness.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let snapshot = registry.refresh().await;
                debug!(
                    "scheduled channel refresh done, {} channels cached",
                    snapshot.channels.len()
                );
            }
        })
    }

    // the fetch runs in its own task so callers going away (client disconnects) can't cancel a
    // refresh other callers are waiting on
    fn start_refresh(state: Arc<RegistryState>) -> PendingRefresh {
        let task = tokio::spawn(state.clone().run_refresh());

        async move {
            let snapshot = match task.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("channel refresh task died: {}", e);
                    state.current()
                }
            };

            *state.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;
            snapshot
        }
        .boxed()
        .shared()
    }
}

impl RegistryState {
    fn current(&self) -> Arc<ChannelSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn failed_recently(&self) -> bool {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < FAILED_REFRESH_BACKOFF)
    }

    fn record_failure(&self, failed: bool) {
        *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) =
            failed.then(Instant::now);
    }

    async fn run_refresh(self: Arc<Self>) -> Arc<ChannelSnapshot> {
        info!("refreshing channel registry");

        match self.feed.fetch_channels().await {
            Ok(channels) => {
                let fresh = Arc::new(ChannelSnapshot::from_channels(channels));
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
                self.record_failure(false);
                info!("channel registry now holds {} channels", fresh.channels.len());
                fresh
            }
            Err(e) => {
                self.record_failure(true);
                let stale = self.current();
                error!(
                    "channel refresh failed, keeping {} cached channels: {:#}",
                    stale.channels.len(),
                    e
                );
                stale
            }
        }
    }
}
