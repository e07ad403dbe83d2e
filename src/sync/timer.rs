// src/sync/timer.rs

//! Cancellable periodic timer with an explicit schedule/unschedule lifecycle.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct RunningTimer {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs an async tick every `period` while scheduled.
///
/// Ticks never overlap: the next tick is only considered once the previous
/// body has completed. Unscheduling waits for an in-progress tick to finish
/// instead of interrupting it.
#[derive(Debug)]
pub struct PeriodicTimer {
    name: &'static str,
    period: Duration,
    running: Mutex<Option<RunningTimer>>,
}

impl PeriodicTimer {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            running: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_scheduled(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start ticking. Returns `false` (and does nothing) when the timer is
    /// already scheduled.
    pub fn schedule<F, Fut>(&self, mut tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!(timer = self.name, "omitting duplicated scheduling");
            return false;
        }

        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let period = self.period;
        let name = self.name;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!(timer = name, "timer loop finished");
        });

        debug!(timer = self.name, ?period, "timer scheduled");
        *running = Some(RunningTimer { stop, handle });
        true
    }

    /// Stop ticking and wait for the timer task to exit.
    pub async fn unschedule(&self) {
        let running = self.running.lock().take();
        if let Some(timer) = running {
            timer.stop.cancel();
            if let Err(e) = timer.handle.await {
                debug!(timer = self.name, error = %e, "timer task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.running.get_mut().take() {
            timer.stop.cancel();
        }
    }
}
