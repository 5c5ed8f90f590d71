//! Periodic statistics collection
//!
//! Runs on its own task so a slow provider stats call never holds up event
//! dispatch. The task is aborted when the monitor is stopped or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::capability::ProviderAdapter;
use crate::store::{StateStore, StoreAction};

pub struct StatsMonitor {
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl StatsMonitor {
    /// Spawn the polling task
    pub fn start(adapter: Arc<dyn ProviderAdapter>, store: Arc<dyn StateStore>, interval: Duration) -> Self {
        debug!(provider = %adapter.kind(), interval_ms = interval.as_millis() as u64, "Starting stats monitor");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if let Err(e) = adapter.refresh_stats().await {
                    debug!(provider = %adapter.kind(), error = %e, "Stats refresh failed");
                    continue;
                }

                let local = adapter.local_video_stats();
                let remote = adapter.remote_video_stats();
                trace!(
                    has_local = local.is_some(),
                    remote_streams = remote.as_ref().map_or(0, |r| r.len()),
                    "Stats tick"
                );
                store.dispatch(StoreAction::LocalVideoStats(local));
                store.dispatch(StoreAction::RemoteVideoStats(remote));
            }
        });

        Self {
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Abort the polling task; idempotent
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Stats monitor stopped");
        }
    }
}

impl Drop for StatsMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
