//! The retry state machine that re-establishes a connection to a downed
//! host (§4.2).
//!
//! State machine: `{Initial, Scheduled, Running, Succeeded, GaveUp,
//! Cancelled}`. Resolves the Open Question flagged in §9: the source's
//! `run()` invokes the completion callback when already cancelled but then
//! falls through and attempts a reconnection anyway — flagged there as
//! "likely a bug". This implementation treats cancellation as terminal: the
//! callback fires and `tick` returns without calling `try_reconnect`.

use crate::error::DatabaseError;
use crate::schedule::Schedule;
use crate::scheduler::Scheduler;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The operations a reconnection attempt needs from its caller. The host
/// case (`HostReconnectionTarget`, in this module) opens a fresh connection
/// and resets the host's health monitor on success; tests substitute
/// simpler targets.
pub trait ReconnectionTarget: Send + Sync {
    /// The connection type a successful attempt produces.
    type Conn: Send;

    /// Attempts to open a new connection. Failure carries the triggering
    /// error.
    fn try_reconnect(&self) -> impl std::future::Future<Output = Result<Self::Conn, DatabaseError>> + Send;

    /// Called once, synchronously, right after a successful `try_reconnect`.
    fn on_reconnection(&self, conn: &Self::Conn);

    /// Decides whether to keep retrying after a failed attempt.
    /// Default: retry unless the error is an authentication failure
    /// (§4.2 "Default on_exception policy").
    fn on_exception(&self, exc: &DatabaseError, next_delay: Duration) -> bool {
        let _ = next_delay;
        exc.is_retryable()
    }
}

/// The handler's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Initial,
    Scheduled,
    Running,
    Succeeded,
    GaveUp,
    Cancelled,
}

/// A lightweight, cloneable capability to cancel a running
/// [`ReconnectionHandler`], independent of its generic parameters. This is
/// what [`crate::host::Host`] stores in its single reconnection-handler
/// slot (§3, §9: "model this as an atomic swap of an optional handle").
#[derive(Clone)]
pub struct ReconnectionHandle {
    cancelled: Arc<AtomicBool>,
}

impl ReconnectionHandle {
    /// Cooperatively cancels the handler sharing this flag. A tick already
    /// running completes; no further ticks are scheduled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl fmt::Debug for ReconnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReconnectionHandle(cancelled={})", self.is_cancelled())
    }
}

/// Drives retry attempts via a [`Scheduler`] and [`Schedule`], invoking a
/// completion callback exactly once when the loop reaches a terminal state
/// with a connection to hand over (§4.2).
type CompletionCallback<Conn> = Box<dyn FnOnce(Option<Conn>) + Send>;

pub struct ReconnectionHandler<Sch, Sc, T>
where
    Sch: Schedule + 'static,
    Sc: Scheduler + 'static,
    T: ReconnectionTarget + 'static,
{
    scheduler: Arc<Sc>,
    schedule: Mutex<Sch>,
    target: Arc<T>,
    callback: Mutex<Option<CompletionCallback<T::Conn>>>,
    cancelled: Arc<AtomicBool>,
    state: Mutex<HandlerState>,
}

impl<Sch, Sc, T> ReconnectionHandler<Sch, Sc, T>
where
    Sch: Schedule + 'static,
    Sc: Scheduler + 'static,
    T: ReconnectionTarget + 'static,
{
    /// Creates a handler in the `Initial` state. `callback` runs exactly
    /// once: with `Some(conn)` on success, or `None` on cancellation. It is
    /// not called on give-up (§4.2 step 4).
    pub fn new(
        scheduler: Arc<Sc>,
        schedule: Sch,
        target: Arc<T>,
        callback: impl FnOnce(Option<T::Conn>) + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            schedule: Mutex::new(schedule),
            target,
            callback: Mutex::new(Some(Box::new(callback))),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(HandlerState::Initial),
        })
    }

    /// A cancellation handle sharing this handler's cancelled flag.
    pub fn handle(self: &Arc<Self>) -> ReconnectionHandle {
        ReconnectionHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// The current state, for tests and diagnostics.
    pub fn state(&self) -> HandlerState {
        *self.state.lock().unwrap()
    }

    /// Cancels the handler. Cooperative: an in-flight `tick` still
    /// completes, but its next scheduling step is suppressed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Starts the retry loop: schedules the first tick after
    /// `schedule.next()`. A no-op if already cancelled.
    pub fn start(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }

        let delay = self.schedule.lock().unwrap().next();
        *self.state.lock().unwrap() = HandlerState::Scheduled;
        self.schedule_tick(delay);
    }

    fn schedule_tick(self: &Arc<Self>, delay: Duration) {
        let this = Arc::clone(self);
        self.scheduler.schedule(delay, Box::pin(async move { this.tick().await }));
    }

    async fn tick(self: &Arc<Self>) {
        if self.cancelled.load(Ordering::SeqCst) {
            *self.state.lock().unwrap() = HandlerState::Cancelled;
            self.finish(None);
            return;
        }

        *self.state.lock().unwrap() = HandlerState::Running;

        match self.target.try_reconnect().await {
            Ok(conn) => {
                self.target.on_reconnection(&conn);
                *self.state.lock().unwrap() = HandlerState::Succeeded;
                self.finish(Some(conn));
            }
            Err(exc) => {
                let next_delay = self.schedule.lock().unwrap().next();
                if self.target.on_exception(&exc, next_delay) {
                    *self.state.lock().unwrap() = HandlerState::Scheduled;
                    self.schedule_tick(next_delay);
                } else {
                    *self.state.lock().unwrap() = HandlerState::GaveUp;
                }
            }
        }
    }

    fn finish(self: &Arc<Self>, conn: Option<T::Conn>) {
        if let Some(cb) = self.callback.lock().unwrap().take() {
            cb(conn);
        }
    }
}

/// The host-specific reconnection target (§4.2's `_HostReconnectionHandler`):
/// opens a connection via an injected [`crate::connection::ConnectionFactory`]
/// and resets the host's monitor on success. It does not install the
/// connection into a pool itself — that is left to the completion callback.
pub struct HostReconnectionTarget<F: crate::connection::ConnectionFactory> {
    host: std::sync::Weak<crate::host::Host>,
    factory: Arc<F>,
}

impl<F: crate::connection::ConnectionFactory> HostReconnectionTarget<F> {
    pub fn new(host: std::sync::Weak<crate::host::Host>, factory: Arc<F>) -> Self {
        Self { host, factory }
    }
}

impl<F: crate::connection::ConnectionFactory> ReconnectionTarget for HostReconnectionTarget<F> {
    type Conn = F::Conn;

    async fn try_reconnect(&self) -> Result<Self::Conn, DatabaseError> {
        let host = self.host.upgrade().ok_or_else(|| DatabaseError::ConnectionError {
            host: "<dropped>".to_string(),
            details: "host no longer exists".to_string(),
        })?;
        self.factory.connect(&host.address).await
    }

    fn on_reconnection(&self, _conn: &Self::Conn) {
        if let Some(host) = self.host.upgrade() {
            host.monitor.reset();
        }
    }

    fn on_exception(&self, exc: &DatabaseError, next_delay: Duration) -> bool {
        let retry = exc.is_retryable();
        if retry {
            tracing::warn!(
                error = %exc,
                next_delay_ms = next_delay.as_millis() as u64,
                "error attempting to reconnect"
            );
        }
        retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ConstantSchedule;
    use crate::scheduler::TokioScheduler;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::oneshot;

    struct CountingTarget {
        attempts: AtomicU32,
        fail_count: u32,
        reconnected: AtomicBool,
    }

    impl ReconnectionTarget for CountingTarget {
        type Conn = u32;

        async fn try_reconnect(&self) -> Result<u32, DatabaseError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_count {
                Err(DatabaseError::ConnectionError {
                    host: "h".to_string(),
                    details: format!("fail {attempt}"),
                })
            } else {
                Ok(attempt)
            }
        }

        fn on_reconnection(&self, _conn: &u32) {
            self.reconnected.store(true, Ordering::SeqCst);
        }
    }

    struct AuthFailTarget;

    impl ReconnectionTarget for AuthFailTarget {
        type Conn = u32;

        async fn try_reconnect(&self) -> Result<u32, DatabaseError> {
            Err(DatabaseError::AuthenticationError {
                host: "h".to_string(),
                reason: "bad creds".to_string(),
            })
        }

        fn on_reconnection(&self, _conn: &u32) {}
    }

    #[tokio::test]
    async fn happy_path_calls_callback_exactly_once_after_n_failures() {
        let target = Arc::new(CountingTarget {
            attempts: AtomicU32::new(0),
            fail_count: 2,
            reconnected: AtomicBool::new(false),
        });
        let (tx, rx) = oneshot::channel();

        let handler = ReconnectionHandler::new(
            Arc::new(TokioScheduler),
            ConstantSchedule(Duration::from_millis(2)),
            Arc::clone(&target),
            move |conn| {
                tx.send(conn).unwrap();
            },
        );

        handler.start();
        let result = tokio::time::timeout(Duration::from_secs(2), rx).await;
        let conn = result.expect("callback should fire").unwrap();

        assert_eq!(conn, Some(2));
        assert_eq!(target.attempts.load(Ordering::SeqCst), 3);
        assert!(target.reconnected.load(Ordering::SeqCst));
        assert_eq!(handler.state(), HandlerState::Succeeded);
    }

    #[tokio::test]
    async fn cancel_before_start_suppresses_everything() {
        let target = Arc::new(CountingTarget {
            attempts: AtomicU32::new(0),
            fail_count: 0,
            reconnected: AtomicBool::new(false),
        });
        let called = Arc::new(AtomicBool::new(false));
        let called2 = Arc::clone(&called);

        let handler = ReconnectionHandler::new(
            Arc::new(TokioScheduler),
            ConstantSchedule(Duration::from_millis(1)),
            target,
            move |_conn| {
                called2.store(true, Ordering::SeqCst);
            },
        );

        handler.cancel();
        handler.start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(handler.state(), HandlerState::Initial);
    }

    #[tokio::test]
    async fn authentication_error_stops_permanently_without_callback() {
        let target = Arc::new(AuthFailTarget);
        let called = Arc::new(AtomicBool::new(false));
        let called2 = Arc::clone(&called);

        let handler = ReconnectionHandler::new(
            Arc::new(TokioScheduler),
            ConstantSchedule(Duration::from_millis(1)),
            target,
            move |_conn| {
                called2.store(true, Ordering::SeqCst);
            },
        );

        handler.start();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(handler.state(), HandlerState::GaveUp);
    }

    #[tokio::test]
    async fn host_reconnection_target_resets_monitor_on_success() {
        use crate::connection::test_support::FlakyFactory;
        use crate::health::NeverConvicts;
        use crate::host::Host;

        let host = Host::new("h:1", |_| Box::new(NeverConvicts));
        host.monitor.set_down();
        assert!(!host.monitor.is_up());

        let factory = Arc::new(FlakyFactory::new(2));
        let target = Arc::new(HostReconnectionTarget::new(Arc::downgrade(&host), Arc::clone(&factory)));
        let (tx, rx) = oneshot::channel();

        let handler = ReconnectionHandler::new(
            Arc::new(TokioScheduler),
            ConstantSchedule(Duration::from_millis(2)),
            target,
            move |conn| {
                tx.send(conn).unwrap();
            },
        );

        handler.start();
        let result = tokio::time::timeout(Duration::from_secs(2), rx).await;
        let conn = result.expect("callback should fire").unwrap();

        assert!(conn.is_some());
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 3);
        assert!(host.monitor.is_up());
        assert_eq!(handler.state(), HandlerState::Succeeded);
    }

    #[tokio::test]
    async fn cancel_mid_flight_is_cooperative() {
        let target = Arc::new(CountingTarget {
            attempts: AtomicU32::new(0),
            fail_count: 100,
            reconnected: AtomicBool::new(false),
        });
        let handler = ReconnectionHandler::new(
            Arc::new(TokioScheduler),
            ConstantSchedule(Duration::from_millis(5)),
            target,
            move |_conn| {},
        );

        handler.start();
        tokio::time::sleep(Duration::from_millis(12)).await;
        handler.handle().cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(handler.state(), HandlerState::Cancelled);
    }
}
