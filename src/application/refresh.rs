// Background job keeping cached query results warm.
use crate::domain::traits::StatementExecutor;
use crate::infrastructure::storage::cache::QueryCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Periodically re-executes every cached query and updates the cache in
/// place.
///
/// The scheduler owns a single tokio task that sleeps for the configured
/// interval, then runs one refresh cycle inline, so two cycles can never
/// overlap: a cycle that outlasts the interval simply delays the next one.
/// The interval can be changed at runtime; a change restarts the timer but
/// never interrupts a cycle that is already running. `stop` is terminal.
pub struct RefreshScheduler {
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshScheduler {
    pub(crate) fn start(
        executor: Arc<dyn StatementExecutor>,
        cache: Arc<QueryCache>,
        interval: Duration,
    ) -> Self {
        let (interval_tx, mut interval_rx) = watch::channel(interval);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let period = *interval_rx.borrow();
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        run_refresh_cycle(executor.as_ref(), &cache).await;
                    }
                    changed = interval_rx.changed() => {
                        // Restart the timer with the new interval; a closed
                        // channel means the scheduler itself is gone.
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => {}
                }
            }
            debug!("refresh scheduler stopped");
        });

        Self {
            interval_tx,
            shutdown_tx,
            task,
        }
    }

    /// Replaces the refresh interval. Takes effect immediately for the wait
    /// currently in progress; an in-flight cycle is left alone.
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.interval_tx.send(interval);
    }

    /// Prevents any further cycles. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether the background task has fully wound down.
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// One pass over the cache: snapshot the keys, open one connection,
/// re-execute each stored statement and swap the fresh value in. A failing
/// key is logged and skipped; it never aborts the rest of the cycle.
async fn run_refresh_cycle(executor: &dyn StatementExecutor, cache: &QueryCache) {
    let keys = cache.keys();
    if keys.is_empty() {
        return;
    }

    let mut handle = match executor.open().await {
        Ok(handle) => handle,
        Err(e) => {
            warn!("refresh cycle skipped, could not open a connection: {}", e);
            return;
        }
    };

    debug!("refresh cycle over {} cached entries", keys.len());
    for key in keys {
        // The entry may have been invalidated since the snapshot.
        let query = match cache.query_for(&key) {
            Some(query) => query,
            None => continue,
        };

        match handle.execute(&query).await {
            Ok(value) => {
                if !cache.refresh(&key, value) {
                    debug!("refresh result dropped, key was invalidated: {}", key);
                }
            }
            Err(e) => warn!("refresh failed for cached key {}: {}", key, e),
        }
    }
}
