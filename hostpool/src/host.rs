//! Host identity, location, and the single-slot reconnection handler.
//!
//! Grounded in the original source's `Host` class (`examples/original_source/cassandra/pool.py`):
//! equality and hashing are by address alone, and the "current reconnection
//! handler" is swapped atomically so installing a new one yields the
//! displaced one to cancel (§3).

use crate::health::{ConvictionPolicy, HealthMonitor};
use crate::reconnection::ReconnectionHandle;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

/// A server endpoint identified by network address (§3, GLOSSARY).
pub struct Host {
    /// Opaque network identity (e.g. `"10.0.0.1:9042"`). The sole basis for
    /// equality and hashing.
    pub address: String,
    /// Up/down lifecycle tracking and listener fan-out for this host.
    pub monitor: HealthMonitor,
    location: Mutex<(Option<String>, Option<String>)>,
    reconnection_handler: Mutex<Option<ReconnectionHandle>>,
}

impl Host {
    /// Creates a host and its `HealthMonitor`. `conviction_policy_factory`
    /// receives a weak handle to the host being constructed — mirroring the
    /// source, which hands the host to the conviction policy — without
    /// keeping it alive (`Arc::new_cyclic`, since the monitor's back
    /// reference must be weak per §3).
    pub fn new<F>(address: impl Into<String>, conviction_policy_factory: F) -> Arc<Self>
    where
        F: FnOnce(Weak<Host>) -> Box<dyn ConvictionPolicy>,
    {
        Arc::new_cyclic(|weak_self| {
            let conviction_policy = conviction_policy_factory(weak_self.clone());
            Self {
                address: address.into(),
                monitor: HealthMonitor::new(weak_self.clone(), conviction_policy),
                location: Mutex::new((None, None)),
                reconnection_handler: Mutex::new(None),
            }
        })
    }

    /// Sets the datacenter/rack this host belongs to.
    pub fn set_location_info(&self, datacenter: Option<String>, rack: Option<String>) {
        *self.location.lock().unwrap() = (datacenter, rack);
    }

    /// The host's datacenter, if known.
    pub fn datacenter(&self) -> Option<String> {
        self.location.lock().unwrap().0.clone()
    }

    /// The host's rack, if known.
    pub fn rack(&self) -> Option<String> {
        self.location.lock().unwrap().1.clone()
    }

    /// Atomically installs `new_handler` as the current reconnection
    /// handler, returning whatever was there before so the caller can
    /// cancel it (§3 invariant: exactly one handler is "current").
    pub fn get_and_set_reconnection_handler(
        &self,
        new_handler: Option<ReconnectionHandle>,
    ) -> Option<ReconnectionHandle> {
        let mut slot = self.reconnection_handler.lock().unwrap();
        std::mem::replace(&mut *slot, new_handler)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Host({})", self.address)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::NeverConvicts;

    #[test]
    fn equality_and_hash_are_address_only() {
        let a = Host::new("10.0.0.1:9042", |_| Box::new(NeverConvicts));
        let b = Host::new("10.0.0.1:9042", |_| Box::new(NeverConvicts));
        let c = Host::new("10.0.0.2:9042", |_| Box::new(NeverConvicts));
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn reconnection_handler_swap_returns_previous() {
        let host = Host::new("h:1", |_| Box::new(NeverConvicts));
        assert!(host.get_and_set_reconnection_handler(None).is_none());

        let handle = ReconnectionHandle::new_for_test();
        let displaced = host.get_and_set_reconnection_handler(Some(handle.clone()));
        assert!(displaced.is_none());

        let handle2 = ReconnectionHandle::new_for_test();
        let displaced = host.get_and_set_reconnection_handler(Some(handle2));
        assert!(displaced.is_some());
    }

    #[test]
    fn location_info_round_trips() {
        let host = Host::new("h:1", |_| Box::new(NeverConvicts));
        assert_eq!(host.datacenter(), None);
        host.set_location_info(Some("dc1".to_string()), Some("rack1".to_string()));
        assert_eq!(host.datacenter(), Some("dc1".to_string()));
        assert_eq!(host.rack(), Some("rack1".to_string()));
    }
}
