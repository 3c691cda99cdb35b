//! Cancelable repeating task.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a task that runs a callback once per period.
///
/// Dropping the handle cancels the task. The first tick fires one full period
/// after spawning.
#[derive(Debug)]
pub struct Ticker {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a ticker; it stops when `on_tick` returns `ControlFlow::Break`.
    pub fn spawn<F, Fut>(generation: u64, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let first = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if on_tick().await.is_break() {
                    break;
                }
            }
        });

        Self {
            generation,
            handle: Some(handle),
        }
    }

    /// Identifies which arming of the timer this handle belongs to.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the task.
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting. Used by the task when it is
    /// already on its way out.
    pub fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
