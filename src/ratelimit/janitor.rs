//! Background sweep of closed rate-limit windows
//!
//! [`RateLimiter::check`] already treats a closed window as absent, so the
//! janitor only bounds memory. Skipping a sweep delays reclamation and
//! changes no admission decision.

use super::limiter::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Periodically purges expired counters from a set of limiters
pub struct Janitor {
    limiters: Vec<Arc<RateLimiter>>,
    interval: Duration,
    running: Option<(mpsc::Sender<()>, JoinHandle<()>)>,
}

impl Janitor {
    pub fn new(limiters: Vec<Arc<RateLimiter>>, interval: Duration) -> Self {
        Self {
            limiters,
            interval,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Run one sweep now, returning the number of counters removed
    pub fn sweep(&self) -> usize {
        sweep_all(&self.limiters)
    }

    /// Start the recurring sweep on the current tokio runtime.
    ///
    /// Calling `start` on a running janitor does nothing.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let limiters = self.limiters.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing can have expired yet
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        sweep_all(&limiters);
                    }
                }
            }

            tracing::info!("Rate limit janitor stopped");
        });

        let interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(interval_ms, "Rate limit janitor started");
        self.running = Some((shutdown_tx, handle));
    }

    /// Stop the recurring sweep and wait for the task to finish
    pub async fn stop(&mut self) {
        if let Some((shutdown_tx, handle)) = self.running.take() {
            let _ = shutdown_tx.send(()).await;
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Rate limit janitor task ended abnormally");
            }
        }
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.running.take() {
            handle.abort();
        }
    }
}

fn sweep_all(limiters: &[Arc<RateLimiter>]) -> usize {
    let removed: usize = limiters.iter().map(|limiter| limiter.purge_expired()).sum();
    if removed > 0 {
        tracing::debug!(removed, "Rate limit janitor swept expired windows");
    }
    removed
}
