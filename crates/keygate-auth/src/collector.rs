//! Background collector for expiring stores.
//!
//! A [`Collector`] owns one spawned task that calls a sweep function on a
//! fixed interval. Stopping it signals the task over a `watch` channel and
//! waits for the task to exit, so a sweep that is already running completes
//! and no further sweep starts afterwards.
//!
//! Sweep failures are logged and retried on the next tick. They never stop
//! the loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::AuthResult;

/// Default interval between collection passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

/// Handle to a running collector task.
#[derive(Debug)]
pub struct Collector {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Collector {
    /// Spawns a collector that runs `sweep` every `period`.
    ///
    /// The first pass happens one full period after spawning.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, sweep: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = AuthResult<u64>> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(collector = name, interval_ms = period.as_millis() as u64, "Collector started");

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match sweep().await {
                            Ok(0) => {}
                            Ok(removed) => debug!(collector = name, removed, "Removed expired entries"),
                            Err(e) => warn!(collector = name, error = %e, "Collection pass failed"),
                        }
                    }
                }
            }

            info!(collector = name, "Collector stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(collector = self.name, error = %e, "Collector task ended abnormally");
        }
    }

    /// Returns `true` once the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::AuthError;

    #[tokio::test(start_paused = true)]
    async fn test_collector_runs_each_period() {
        let passes = Arc::new(AtomicU64::new(0));
        let counter = passes.clone();
        let collector = Collector::spawn("test", Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        collector.stop().await;

        assert_eq!(passes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pass_after_stop() {
        let passes = Arc::new(AtomicU64::new(0));
        let counter = passes.clone();
        let collector = Collector::spawn("test", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        collector.stop().await;
        let after_stop = passes.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(passes.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let passes = Arc::new(AtomicU64::new(0));
        let counter = passes.clone();
        let collector = Collector::spawn("test", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::transient("database unavailable"))
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!collector.is_finished());
        collector.stop().await;

        assert_eq!(passes.load(Ordering::SeqCst), 3);
    }
}
