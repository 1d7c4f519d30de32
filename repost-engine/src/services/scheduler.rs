//! Periodic tasks
//!
//! A `PeriodicTask` is a named ticker that runs a task function until its
//! cancellation token fires. Ticks missed while the task function is still
//! running are skipped, not queued.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    immediate: bool,
}

impl PeriodicTask {
    /// Task whose first run happens right away
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            immediate: true,
        }
    }

    /// Wait one full period before the first run
    pub fn delayed(mut self) -> Self {
        self.immediate = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run `task` on every tick until `cancel` fires
    pub async fn run<F, Fut>(self, cancel: CancellationToken, mut task: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut timer = if self.immediate {
            interval(self.period)
        } else {
            interval_at(Instant::now() + self.period, self.period)
        };
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(task = %self.name, period_secs = self.period.as_secs_f64(), "Periodic task started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    debug!(task = %self.name, "Periodic task tick");
                    task().await;
                }
            }
        }

        info!(task = %self.name, "Periodic task stopped");
    }

    /// Spawn `run` on the tokio runtime
    pub fn spawn<F, Fut>(self, cancel: CancellationToken, task: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(cancel, task))
    }
}
