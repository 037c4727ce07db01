//! Host up/down lifecycle tracking and listener fan-out (§4.1).
//!
//! `set_down` flips `is_up` *before* notifying listeners; `reset` flips it
//! *after*. This asymmetry is preserved verbatim from the source per the
//! spec's explicit instruction (§9: "this asymmetry matches the source and
//! is preserved") rather than "fixed" into a consistent ordering.

use crate::host::Host;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Decides, from a stream of connection failures, whether a host should be
/// marked down. Pluggable per §2 ("conviction policy: pluggable").
pub trait ConvictionPolicy: Send + Sync {
    /// Records a failure; returns true if the host should now be convicted
    /// (marked down).
    fn add_failure(&mut self, exc: &crate::error::DatabaseError) -> bool;

    /// Clears accumulated failure state, e.g. after a successful
    /// reconnection.
    fn reset(&mut self);
}

/// Convicts after `threshold` consecutive failures (default 1, matching the
/// boundary scenario in §8.4 where a single failure convicts).
pub struct SimpleConvictionPolicy {
    threshold: u32,
    consecutive_failures: u32,
}

impl SimpleConvictionPolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }
}

impl Default for SimpleConvictionPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ConvictionPolicy for SimpleConvictionPolicy {
    fn add_failure(&mut self, _exc: &crate::error::DatabaseError) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= self.threshold
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}

/// A policy that never convicts a host, regardless of failures. Useful for
/// tests that want to exercise the pool's defunct-connection path without
/// also tearing the pool down.
pub struct NeverConvicts;

impl ConvictionPolicy for NeverConvicts {
    fn add_failure(&mut self, _exc: &crate::error::DatabaseError) -> bool {
        false
    }

    fn reset(&mut self) {}
}

/// Receives up/down edge notifications from a [`HealthMonitor`]. Held
/// weakly (§3, §9): typically the owning Cluster/Session, which must remain
/// collectable even while a monitor is alive.
pub trait HealthListener: Send + Sync {
    fn on_up(&self, host: Arc<Host>);
    fn on_down(&self, host: Arc<Host>);
}

/// Tracks one host's up/down state and fans out transitions to listeners
/// (§4.1).
pub struct HealthMonitor {
    host: Weak<Host>,
    conviction_policy: Mutex<Box<dyn ConvictionPolicy>>,
    is_up: AtomicBool,
    listeners: Mutex<Vec<Weak<dyn HealthListener>>>,
}

impl HealthMonitor {
    pub fn new(host: Weak<Host>, conviction_policy: Box<dyn ConvictionPolicy>) -> Self {
        Self {
            host,
            conviction_policy: Mutex::new(conviction_policy),
            is_up: AtomicBool::new(true),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// True iff the host's last observed transition was "up".
    pub fn is_up(&self) -> bool {
        self.is_up.load(Ordering::SeqCst)
    }

    /// Registers a listener, pruning any weak references that have already
    /// expired.
    pub fn register(&self, listener: Weak<dyn HealthListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    /// Removes a listener by pointer identity.
    pub fn unregister(&self, listener: &Weak<dyn HealthListener>) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|l| !l.ptr_eq(listener) && l.strong_count() > 0);
    }

    fn snapshot_listeners(&self) -> Vec<Arc<dyn HealthListener>> {
        let listeners = self.listeners.lock().unwrap();
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    /// Marks the host down: flips `is_up` to false, then (lock released)
    /// notifies every live listener's `on_down`.
    pub fn set_down(&self) {
        self.is_up.store(false, Ordering::SeqCst);

        let listeners = self.snapshot_listeners();
        let Some(host) = self.host.upgrade() else {
            return;
        };
        for listener in listeners {
            listener.on_down(Arc::clone(&host));
        }
    }

    /// Resets the conviction policy, notifies every live listener's
    /// `on_up` (while `is_up` may still read false, per the documented
    /// ordering), then flips `is_up` to true.
    pub fn reset(&self) {
        self.conviction_policy.lock().unwrap().reset();

        let listeners = self.snapshot_listeners();
        if let Some(host) = self.host.upgrade() {
            for listener in listeners {
                listener.on_up(Arc::clone(&host));
            }
        }

        self.is_up.store(true, Ordering::SeqCst);
    }

    /// Records a connection failure; convicts (and notifies `on_down`) if
    /// the conviction policy says so. Returns whether the host is now
    /// considered down.
    pub fn signal_connection_failure(&self, exc: &crate::error::DatabaseError) -> bool {
        let convicted = self.conviction_policy.lock().unwrap().add_failure(exc);
        if convicted {
            self.set_down();
        }
        convicted
    }
}
