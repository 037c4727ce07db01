//! The per-host connection pool: dynamic sizing, fair connection selection,
//! and safe recycling (§4.3).
//!
//! Grounded directly in the original source's `HostConnectionPool`
//! (`examples/original_source/cassandra/pool.py`). The source's re-entrant
//! `_lock` + condition variable + per-connection lock become a
//! `tokio::sync::Mutex<PoolState>` guarding pool bookkeeping, a
//! `tokio::sync::Notify` standing in for `_conn_available_condition`, and
//! the `tokio::sync::Mutex<u32>` already embedded in `PooledConnection` for
//! per-connection `in_flight`. No method holds the pool lock across an
//! `.await` that performs I/O or notifies listeners, matching §5's "no
//! operation suspends while holding `_lock`" for the operations that matter
//! (creation, replacement); bookkeeping itself is async-lock-guarded rather
//! than refactored to avoid ever awaiting under lock, since `tokio::sync::Mutex`
//! makes that safe.

use crate::config::HostDistance;
use crate::connection::{Connection, ConnectionFactory, PooledConnection};
use crate::error::DatabaseError;
use crate::host::Host;
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{Duration, Instant};

struct PoolState<C: Connection> {
    connections: Vec<Arc<PooledConnection<C>>>,
    trash: Vec<Arc<PooledConnection<C>>>,
    open_count: u32,
    scheduled_for_creation: u32,
    is_shutdown: bool,
}

/// A dynamically-sized pool of connections to one host (§4.3).
pub struct HostConnectionPool<F: ConnectionFactory> {
    host: Arc<Host>,
    distance: HostDistance,
    session: Arc<Session<F>>,
    state: Mutex<PoolState<F::Conn>>,
    conn_available: Notify,
}

impl<F: ConnectionFactory> HostConnectionPool<F> {
    /// Opens `core_connections_per_host(distance)` connections synchronously.
    /// Any failure propagates to the caller without retaining a
    /// partially-built pool (§4.3.1).
    pub async fn new(
        host: Arc<Host>,
        distance: HostDistance,
        session: Arc<Session<F>>,
    ) -> Result<Arc<Self>, DatabaseError> {
        let core_conns = session.config().core_connections_per_host(distance);

        let mut connections = Vec::with_capacity(core_conns as usize);
        for _ in 0..core_conns {
            let conn = session.connection_factory().connect(&host.address).await?;
            connections.push(Arc::new(PooledConnection::new(host.address.clone(), conn)));
        }

        Ok(Arc::new(Self {
            host,
            distance,
            session,
            state: Mutex::new(PoolState {
                connections,
                trash: Vec::new(),
                open_count: core_conns,
                scheduled_for_creation: 0,
                is_shutdown: false,
            }),
            conn_available: Notify::new(),
        }))
    }

    /// The host this pool serves connections to.
    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// Current open connection count, including trashed-but-undrained ones.
    pub async fn open_count(&self) -> u32 {
        self.state.lock().await.open_count
    }

    pub async fn is_shutdown(&self) -> bool {
        self.state.lock().await.is_shutdown
    }

    /// Borrows a connection with `in_flight` already incremented; the
    /// caller owes a matching [`Self::return_connection`] (§4.3.2).
    pub async fn borrow_connection(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<Arc<PooledConnection<F::Conn>>, DatabaseError> {
        let deadline = Instant::now() + timeout;
        let max_stream = self.session.config().max_stream_per_connection;
        let max_reqs = self.session.config().max_requests_per_connection(self.distance);
        let max_conns = self.session.config().max_connections_per_host(self.distance);
        let core_conns = self.session.config().core_connections_per_host(self.distance);

        let snapshot = {
            let state = self.state.lock().await;
            if state.is_shutdown {
                return Err(DatabaseError::PoolShutdown {
                    host: self.host.address.clone(),
                });
            }
            state.connections.clone()
        };

        if snapshot.is_empty() {
            for _ in 0..core_conns {
                self.spawn_creation_task_unchecked().await;
            }
            return self.wait_for_conn(max_stream, deadline).await;
        }

        let least_busy = match self.least_busy(&snapshot).await {
            Some(c) => c,
            None => return self.wait_for_conn(max_stream, deadline).await,
        };

        if least_busy.1 >= max_reqs && (snapshot.len() as u32) < max_conns {
            self.maybe_spawn_new_connection().await;
        }

        if least_busy.0.try_claim_stream(max_stream).await {
            let keyspace = self.session.keyspace().await;
            if let Some(ks) = keyspace {
                least_busy.0.set_keyspace(&ks).await?;
            }
            return Ok(least_busy.0);
        }

        self.wait_for_conn(max_stream, deadline).await
    }

    /// Returns `(connection, in_flight)` for the least-busy connection in
    /// `snapshot`, ties broken by first-encountered (§4.3.2 step 3).
    async fn least_busy(
        &self,
        snapshot: &[Arc<PooledConnection<F::Conn>>],
    ) -> Option<(Arc<PooledConnection<F::Conn>>, u32)> {
        let mut best: Option<(Arc<PooledConnection<F::Conn>>, u32)> = None;
        for conn in snapshot {
            let in_flight = conn.in_flight().await;
            if best.as_ref().is_none_or(|(_, b)| in_flight < *b) {
                best = Some((Arc::clone(conn), in_flight));
            }
        }
        best
    }

    /// Loops until a connection is claimed, the pool shuts down, or
    /// `deadline` passes (§4.3.3). Tolerates spurious wakeups by re-checking
    /// shutdown and re-scanning connections on every wake.
    async fn wait_for_conn(
        &self,
        max_stream: u32,
        deadline: Instant,
    ) -> Result<Arc<PooledConnection<F::Conn>>, DatabaseError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DatabaseError::NoConnectionsAvailable {
                    host: self.host.address.clone(),
                    waited_ms: 0,
                });
            }

            let notified = self.conn_available.notified();

            let snapshot = {
                let state = self.state.lock().await;
                if state.is_shutdown {
                    return Err(DatabaseError::PoolShutdown {
                        host: self.host.address.clone(),
                    });
                }
                state.connections.clone()
            };

            if !snapshot.is_empty() {
                if let Some((conn, _)) = self.least_busy(&snapshot).await {
                    if conn.try_claim_stream(max_stream).await {
                        let keyspace = self.session.keyspace().await;
                        if let Some(ks) = keyspace {
                            conn.set_keyspace(&ks).await?;
                        }
                        return Ok(conn);
                    }
                }
            }

            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Guarded by `_MAX_SIMULTANEOUS_CREATION`: at most one pending
    /// background creation per pool (§4.3.4).
    async fn maybe_spawn_new_connection(self: &Arc<Self>) {
        let max_simultaneous = self.session.config().max_simultaneous_creation;
        {
            let mut state = self.state.lock().await;
            if state.scheduled_for_creation >= max_simultaneous {
                return;
            }
            state.scheduled_for_creation += 1;
        }
        self.submit_creation_task();
    }

    /// Reserves a `scheduled_for_creation` slot and submits a background
    /// creation task, bypassing `_MAX_SIMULTANEOUS_CREATION`. Used by the
    /// empty-pool recovery branch of `borrow_connection` and by
    /// `ensure_core_connections` (§4.3.2 step 2, §4.3.7), both of which must
    /// urgently restore the pool to `core_conns` connections at once rather
    /// than trickling one creation at a time.
    async fn spawn_creation_task_unchecked(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            state.scheduled_for_creation += 1;
        }
        self.submit_creation_task();
    }

    /// Submits the background task that opens a connection and releases its
    /// `scheduled_for_creation` reservation. The reservation itself must
    /// already have been taken by the caller.
    fn submit_creation_task(self: &Arc<Self>) {
        let pool = Arc::clone(self);
        self.session.submit(async move {
            pool.add_conn_if_under_max().await;
            let mut state = pool.state.lock().await;
            state.scheduled_for_creation = state.scheduled_for_creation.saturating_sub(1);
        });
    }

    /// Reserves an `open_count` slot, opens a connection, and either
    /// commits or rolls back the reservation depending on the outcome
    /// (§4.3.4).
    async fn add_conn_if_under_max(self: &Arc<Self>) -> bool {
        let max_conns = self.session.config().max_connections_per_host(self.distance);
        {
            let mut state = self.state.lock().await;
            if state.is_shutdown {
                return false;
            }
            if state.open_count >= max_conns {
                return false;
            }
            state.open_count += 1;
        }

        match self.session.connection_factory().connect(&self.host.address).await {
            Ok(conn) => {
                let pooled = Arc::new(PooledConnection::new(self.host.address.clone(), conn));
                {
                    let mut state = self.state.lock().await;
                    state.connections.push(pooled);
                }
                self.conn_available.notify_one();
                true
            }
            Err(exc) => {
                {
                    let mut state = self.state.lock().await;
                    state.open_count = state.open_count.saturating_sub(1);
                }
                if exc.is_auth_error() {
                    tracing::warn!(host = %self.host.address, error = %exc, "authentication failed opening connection");
                } else {
                    tracing::warn!(host = %self.host.address, error = %exc, "failed to open connection");
                    let convicted = self.host.monitor.signal_connection_failure(&exc);
                    if convicted {
                        self.shutdown().await;
                    }
                }
                false
            }
        }
    }

    /// Returns a borrowed connection, decrementing `in_flight` and then
    /// routing to defunct handling, trash drain, shrink, or a plain waiter
    /// signal (§4.3.5).
    pub async fn return_connection(self: &Arc<Self>, conn: Arc<PooledConnection<F::Conn>>) {
        let in_flight = conn.release_stream().await;

        if conn.is_defunct() {
            let exc = conn.last_exception().unwrap_or(DatabaseError::ConnectionError {
                host: self.host.address.clone(),
                details: "connection defunct with no recorded exception".to_string(),
            });
            let convicted = self.host.monitor.signal_connection_failure(&exc);
            if convicted {
                self.shutdown().await;
            } else {
                self.replace(conn).await;
            }
            return;
        }

        let drained_trash = {
            let mut state = self.state.lock().await;
            let was_trashed = state.trash.iter().any(|c| Arc::ptr_eq(c, &conn));
            if was_trashed && in_flight == 0 {
                state.trash.retain(|c| !Arc::ptr_eq(c, &conn));
                true
            } else {
                false
            }
        };
        if drained_trash {
            conn.close();
            return;
        }

        let core_conns = self.session.config().core_connections_per_host(self.distance);
        let min_reqs = self.session.config().min_requests_per_connection(self.distance);
        let should_shrink = {
            let state = self.state.lock().await;
            (state.connections.len() as u32) > core_conns && in_flight <= min_reqs
        };

        if should_shrink {
            self.trash_connection(conn).await;
        } else {
            self.conn_available.notify_one();
        }
    }

    /// Removes `conn` from service; closes it immediately if idle, else
    /// defers close to whenever its last in-flight request completes
    /// (§4.3.6).
    async fn trash_connection(&self, conn: Arc<PooledConnection<F::Conn>>) {
        let core_conns = self.session.config().core_connections_per_host(self.distance);
        let mut state = self.state.lock().await;
        if state.open_count <= core_conns {
            return;
        }
        state.open_count -= 1;
        state.connections.retain(|c| !Arc::ptr_eq(c, &conn));

        let in_flight = conn.in_flight().await;
        if in_flight == 0 {
            drop(state);
            conn.close();
        } else {
            state.trash.push(conn);
        }
    }

    /// Removes a defunct connection and submits its close + replacement as
    /// a background task (§4.3.6). Removal happens before close so a
    /// trashed connection is never handed out again.
    async fn replace(self: &Arc<Self>, conn: Arc<PooledConnection<F::Conn>>) {
        {
            let mut state = self.state.lock().await;
            state.connections.retain(|c| !Arc::ptr_eq(c, &conn));
        }

        let pool = Arc::clone(self);
        self.session.submit(async move {
            conn.close();
            pool.add_conn_if_under_max().await;
        });
    }

    /// Idempotently shuts the pool down: unblocks every waiter, closes
    /// every connection, and cancels the host's current reconnection
    /// handler (§4.3.6).
    pub async fn shutdown(&self) {
        let (connections, trash) = {
            let mut state = self.state.lock().await;
            if state.is_shutdown {
                return;
            }
            state.is_shutdown = true;
            state.open_count = 0;
            (
                std::mem::take(&mut state.connections),
                std::mem::take(&mut state.trash),
            )
        };

        self.conn_available.notify_waiters();

        for conn in connections.into_iter().chain(trash) {
            conn.close();
        }

        if let Some(handle) = self.host.get_and_set_reconnection_handler(None) {
            handle.cancel();
        }

        tracing::warn!(host = %self.host.address, "pool shut down");
    }

    /// Tops the pool back up to `core_conns` if it has fallen short
    /// (§4.3.7).
    pub async fn ensure_core_connections(self: &Arc<Self>) {
        let core_conns = self.session.config().core_connections_per_host(self.distance);
        let (is_shutdown, open_count) = {
            let state = self.state.lock().await;
            (state.is_shutdown, state.open_count)
        };
        if is_shutdown {
            return;
        }
        let missing = core_conns.saturating_sub(open_count);
        for _ in 0..missing {
            self.spawn_creation_task_unchecked().await;
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::config::{ClusterConfig, PoolSizing};
    use crate::connection::test_support::AlwaysSucceedsFactory;
    use crate::health::NeverConvicts;
    use proptest::prelude::*;
    use std::time::Duration as StdDuration;

    fn config() -> Arc<ClusterConfig> {
        Arc::new(
            ClusterConfig::new(
                PoolSizing {
                    core_connections: 2,
                    max_connections: 6,
                    max_requests_per_connection: 50,
                    min_requests_per_connection: 5,
                },
                PoolSizing {
                    core_connections: 2,
                    max_connections: 6,
                    max_requests_per_connection: 50,
                    min_requests_per_connection: 5,
                },
                128,
            )
            .unwrap(),
        )
    }

    proptest! {
        #[test]
        fn in_flight_sum_matches_outstanding_borrows(borrow_counts in prop::collection::vec(1usize..4, 1..8)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let session = Session::new(config(), Arc::new(AlwaysSucceedsFactory));
                let host = Host::new("h:1", |_| Box::new(NeverConvicts));
                let pool = HostConnectionPool::new(host, HostDistance::Local, session).await.unwrap();

                let mut outstanding = Vec::new();
                for batch in &borrow_counts {
                    for _ in 0..*batch {
                        if let Ok(conn) = pool.borrow_connection(StdDuration::from_millis(200)).await {
                            outstanding.push(conn);
                        }
                    }
                }

                let mut total_in_flight = 0u32;
                {
                    let state = pool.state.lock().await;
                    for conn in state.connections.iter().chain(state.trash.iter()) {
                        total_in_flight += conn.in_flight().await;
                    }
                }
                prop_assert_eq!(total_in_flight as usize, outstanding.len());

                for conn in outstanding {
                    pool.return_connection(conn).await;
                }
                Ok(())
            })?;
        }
    }
}
