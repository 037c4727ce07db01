//! Runs a callback after a delay, on the ambient task executor.
//!
//! Maps the spec's `Scheduler.schedule(delay, task)` (§2, §6) onto the
//! tokio runtime: `TokioScheduler::schedule` spawns a task that sleeps then
//! invokes the callback, matching the "submit is infallible" assumption
//! called out in §9 — a spawn onto a live runtime never fails the way a
//! bounded threadpool submission could.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs a unit of work after a delay.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run after `delay`. Fire-and-forget: the caller
    /// does not get a handle back, matching the source's `submit`.
    fn schedule(&self, delay: Duration, task: BoxFuture);
}

/// A [`Scheduler`] backed by `tokio::spawn` + `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture) {
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn schedule_runs_task_after_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);

        TokioScheduler.schedule(
            Duration::from_millis(5),
            Box::pin(async move {
                ran2.store(true, Ordering::SeqCst);
            }),
        );

        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
