/// Background refresh of the IP range snapshot
///
/// The refresher is the only writer of the current snapshot. Scheduled and
/// manual refreshes take turns on one lock, so a slow fetch can never land
/// after a newer one. Readers clone an `Arc<RangeSet>` out of a `watch`
/// channel and never wait on a fetch; a failed refresh keeps the previous
/// snapshot in place.
use super::set::RangeSet;
use super::source::{RangeSource, RegionFilter, DEFAULT_FETCH_TIMEOUT, DEFAULT_IP_RANGES_URL};
use crate::error::RangeError;
use crate::metrics::RefreshMetrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_UPDATE_FREQUENCY: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub document_url: String,
    pub regions: RegionFilter,
    pub interval: Duration,
    pub fetch_timeout: Duration,
}

impl RefreshPolicy {
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
            regions: RegionFilter::all(),
            interval: DEFAULT_UPDATE_FREQUENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_regions(mut self, regions: RegionFilter) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_IP_RANGES_URL)
    }
}

/// Current ranges plus the time they were fetched.
///
/// `fetched_at` is `None` until the first successful fetch.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub ranges: Arc<RangeSet>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_populated(&self) -> bool {
        self.fetched_at.is_some()
    }
}

struct Inner {
    source: Arc<dyn RangeSource>,
    policy: RefreshPolicy,
    snapshot_tx: watch::Sender<Snapshot>,
    // Held across fetch and swap
    refresh_lock: AsyncMutex<()>,
}

impl Inner {
    async fn refresh(&self) -> Result<usize, RangeError> {
        let _guard = self.refresh_lock.lock().await;
        let ranges = self
            .source
            .fetch(&self.policy.document_url, &self.policy.regions)
            .await?;
        let count = ranges.len();

        self.snapshot_tx.send_replace(Snapshot {
            ranges: Arc::new(ranges),
            fetched_at: Some(Utc::now()),
        });
        RefreshMetrics::record_success(count);

        Ok(count)
    }

    async fn refresh_logged(&self) {
        match self.refresh().await {
            Ok(count) => {
                debug!(
                    ranges = count,
                    url = %self.policy.document_url,
                    "IP ranges refreshed"
                );
            }
            Err(e) => {
                RefreshMetrics::record_failure();
                warn!(
                    error = %e,
                    url = %self.policy.document_url,
                    "IP ranges refresh failed, keeping previous snapshot"
                );
            }
        }
    }
}

/// Owner of the current [`RangeSet`] snapshot.
pub struct RangeRefresher {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RangeRefresher {
    /// Fetch once, then keep refreshing on `policy.interval`.
    ///
    /// A failed initial fetch does not fail startup: the refresher begins with
    /// an empty, unpopulated snapshot and retries on the normal schedule.
    pub async fn start(source: Arc<dyn RangeSource>, policy: RefreshPolicy) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        let inner = Arc::new(Inner {
            source,
            policy,
            snapshot_tx,
            refresh_lock: AsyncMutex::new(()),
        });

        match inner.refresh().await {
            Ok(count) => {
                info!(
                    ranges = count,
                    regions = ?inner.policy.regions,
                    "Loaded IP ranges"
                );
            }
            Err(e) => {
                RefreshMetrics::record_failure();
                warn!(
                    error = %e,
                    url = %inner.policy.document_url,
                    "Initial IP ranges fetch failed, starting with an empty set"
                );
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(refresh_loop(inner.clone(), shutdown_rx));

        Self {
            inner,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Latest successfully fetched ranges, or the empty set.
    pub fn current(&self) -> Arc<RangeSet> {
        self.inner.snapshot_tx.borrow().ranges.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn is_populated(&self) -> bool {
        self.inner.snapshot_tx.borrow().is_populated()
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.inner.snapshot_tx.borrow().fetched_at
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.inner.policy
    }

    /// Refresh immediately, outside the schedule.
    ///
    /// Waits for a scheduled refresh that is already in flight, then fetches.
    pub async fn refresh_now(&self) -> Result<usize, RangeError> {
        self.inner.refresh().await.map_err(|e| {
            RefreshMetrics::record_failure();
            e
        })
    }

    /// Stop the background loop. The last snapshot stays readable.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!("IP ranges refresher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RangeRefresher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

async fn refresh_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    // interval_at panics on a zero period
    let period = inner.policy.interval.max(Duration::from_millis(1));
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(interval = ?period, "IP ranges refresh interval is out of range, not scheduling refreshes");
        return;
    };
    let mut timer = interval_at(start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("IP ranges refresher received shutdown signal");
                break;
            }
            _ = timer.tick() => {
                inner.refresh_logged().await;
            }
        }
    }
}
