//! The minimal `Session`/`Cluster` surface a [`crate::pool::HostConnectionPool`]
//! consumes (§6): config getters, a connection factory, and fire-and-forget
//! task submission. Request routing, retries, paging, prepared statements,
//! and multi-host topology are explicitly out of scope (§1) — a `Session`
//! here owns exactly the one pool under test or in use.

use crate::config::ClusterConfig;
use crate::connection::ConnectionFactory;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The external collaborator a pool borrows configuration and a connection
/// factory from.
pub struct Session<F: ConnectionFactory> {
    config: Arc<ClusterConfig>,
    factory: Arc<F>,
    keyspace: RwLock<Option<String>>,
}

impl<F: ConnectionFactory> Session<F> {
    pub fn new(config: Arc<ClusterConfig>, factory: Arc<F>) -> Arc<Self> {
        Arc::new(Self {
            config,
            factory,
            keyspace: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &Arc<ClusterConfig> {
        &self.config
    }

    pub fn connection_factory(&self) -> &Arc<F> {
        &self.factory
    }

    /// The keyspace set on the session, applied to freshly borrowed
    /// connections (§4.3.2's `set_keyspace(session.keyspace)`).
    pub async fn keyspace(&self) -> Option<String> {
        self.keyspace.read().await.clone()
    }

    pub async fn set_keyspace(&self, keyspace: impl Into<String>) {
        *self.keyspace.write().await = Some(keyspace.into());
    }

    /// Fire-and-forget submission to the shared task executor
    /// (`cluster.submit`, §6). `tokio::spawn` never fails the way a bounded
    /// threadpool submission could, matching the "submit is infallible"
    /// resolution in §9.
    pub fn submit<Fut>(&self, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostDistance;
    use crate::connection::test_support::AlwaysSucceedsFactory;

    #[tokio::test]
    async fn keyspace_round_trips() {
        let session = Session::new(Arc::new(ClusterConfig::default()), Arc::new(AlwaysSucceedsFactory));
        assert_eq!(session.keyspace().await, None);
        session.set_keyspace("ks1").await;
        assert_eq!(session.keyspace().await, Some("ks1".to_string()));
    }

    #[tokio::test]
    async fn config_getters_are_distance_parameterized() {
        let session = Session::new(Arc::new(ClusterConfig::default()), Arc::new(AlwaysSucceedsFactory));
        assert_eq!(session.config().core_connections_per_host(HostDistance::Local), 2);
        assert_eq!(session.config().core_connections_per_host(HostDistance::Remote), 1);
    }
}
