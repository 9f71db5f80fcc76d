//! Periodic compound-RTCP scheduling.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Repeating one-shot timer driving compound-RTCP emission.
///
/// The interval is constant for now; `next_interval` is the hook where an
/// adaptive computation per RFC 3550 Section 6.3 (bandwidth budget, sender
/// count, average packet size) would slot in.
pub struct RtcpScheduler {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RtcpScheduler {
    /// Create a scheduler ticking every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    /// Delay until the next tick
    pub fn next_interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking. `on_tick` runs after each interval and returns whether
    /// the schedule should continue; a tick observing a stopped session
    /// returns false and ends the task.
    pub fn start<F, Fut>(&self, on_tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send,
    {
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            loop {
                time::sleep(interval).await;
                if !on_tick().await {
                    debug!("RTCP schedule ended");
                    break;
                }
            }
        });

        if let Some(previous) = self.task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the schedule; no tick runs after this returns
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap().take() {
            handle.abort();
            debug!("Stopped RTCP scheduler");
        }
    }
}

impl Drop for RtcpScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
