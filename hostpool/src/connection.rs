//! The connection interface the pool consumes, and a minimal TCP-backed
//! implementation of it.
//!
//! Wire protocol framing and the full `Connection` object are explicitly out
//! of scope (§1, §3): the pool only needs `in_flight`, a per-connection
//! lock, `is_defunct`, `last_exception`, `set_keyspace`, and `close`. This
//! module defines that surface as the [`Connection`] trait and wraps it in
//! [`PooledConnection`], which owns the `in_flight` counter and its lock —
//! the counter lives here rather than on `Connection` itself so that any
//! `Connection` implementation, including a test double, gets correct
//! bookkeeping for free.

use crate::error::DatabaseError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// The minimal interface the pool requires from a connection (§3).
pub trait Connection: Send + Sync + 'static {
    /// True once the connection has encountered an unrecoverable error.
    fn is_defunct(&self) -> bool;

    /// The error that made the connection defunct, if any.
    fn last_exception(&self) -> Option<DatabaseError>;

    /// Sets the active keyspace on this connection. Idempotent and cheap.
    fn set_keyspace(
        &self,
        keyspace: &str,
    ) -> impl std::future::Future<Output = Result<(), DatabaseError>> + Send;

    /// Closes the connection. Must be safe to call exactly once; the pool
    /// guarantees it will not call this twice for the same connection
    /// (§3 invariant, §5 "Resource cleanup").
    fn close(&self);
}

/// Opens a new [`Connection`] to a host address (`cluster.connection_factory`
/// in §6).
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The concrete connection type this factory produces.
    type Conn: Connection;

    /// Synchronously (from the caller's point of view) opens a connection.
    fn connect(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Self::Conn, DatabaseError>> + Send;
}

/// A connection plus the `in_flight` bookkeeping the pool maintains on its
/// behalf (§3: "an integer `in_flight` counter ... a per-connection mutex
/// that serializes mutation of `in_flight`").
pub struct PooledConnection<C: Connection> {
    address: String,
    inner: C,
    in_flight: Mutex<u32>,
}

impl<C: Connection> PooledConnection<C> {
    /// Wraps `inner` with a zeroed `in_flight` counter.
    pub fn new(address: String, inner: C) -> Self {
        Self {
            address,
            inner,
            in_flight: Mutex::new(0),
        }
    }

    /// The address this connection was opened to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The wrapped connection.
    pub fn connection(&self) -> &C {
        &self.inner
    }

    /// A snapshot of the current in-flight count.
    pub async fn in_flight(&self) -> u32 {
        *self.in_flight.lock().await
    }

    /// Attempts to claim one stream: if `in_flight < max_stream`, increments
    /// and returns true; otherwise leaves it unchanged and returns false.
    /// This is the atomic "check-and-increment" §4.3.2/§4.3.3 require.
    pub async fn try_claim_stream(&self, max_stream: u32) -> bool {
        let mut guard = self.in_flight.lock().await;
        if *guard < max_stream {
            *guard += 1;
            true
        } else {
            false
        }
    }

    /// Releases one stream, returning the new in_flight value.
    pub async fn release_stream(&self) -> u32 {
        let mut guard = self.in_flight.lock().await;
        *guard = guard.saturating_sub(1);
        *guard
    }

    pub fn is_defunct(&self) -> bool {
        self.inner.is_defunct()
    }

    pub fn last_exception(&self) -> Option<DatabaseError> {
        self.inner.last_exception()
    }

    pub async fn set_keyspace(&self, keyspace: &str) -> Result<(), DatabaseError> {
        self.inner.set_keyspace(keyspace).await
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl<C: Connection + fmt::Debug> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .field("inner", &self.inner)
            .finish()
    }
}

/// A bare TCP connection, demonstrating the [`Connection`] trait is
/// satisfiable by a real socket. Grounded in the teacher's
/// `connection::Connection::connect` (timeout + `TCP_NODELAY`); full wire
/// framing and request/response multiplexing stay out of scope, so
/// `set_keyspace` only records the keyspace rather than sending a protocol
/// message.
pub struct TcpConnection {
    address: String,
    _socket: TcpStream,
    defunct: AtomicBool,
    last_exception: StdMutex<Option<DatabaseError>>,
    keyspace: StdMutex<Option<String>>,
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("address", &self.address)
            .field("defunct", &self.defunct.load(Ordering::SeqCst))
            .finish()
    }
}

impl TcpConnection {
    /// Opens a TCP connection to `address`, applying `connect_timeout` and
    /// enabling `TCP_NODELAY` for low latency.
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self, DatabaseError> {
        let socket = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| DatabaseError::ConnectionError {
                host: address.to_string(),
                details: format!("timed out after {:?}", connect_timeout),
            })?
            .map_err(|e| DatabaseError::ConnectionError {
                host: address.to_string(),
                details: e.to_string(),
            })?;

        socket.set_nodelay(true).map_err(|e| DatabaseError::ConnectionError {
            host: address.to_string(),
            details: format!("failed to set TCP_NODELAY: {e}"),
        })?;

        Ok(Self {
            address: address.to_string(),
            _socket: socket,
            defunct: AtomicBool::new(false),
            last_exception: StdMutex::new(None),
            keyspace: StdMutex::new(None),
        })
    }

    /// The peer address, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self._socket.peer_addr().ok()
    }

    /// Marks this connection defunct with `exc`, as a real implementation
    /// would after an unrecoverable I/O error.
    pub fn mark_defunct(&self, exc: DatabaseError) {
        *self.last_exception.lock().unwrap() = Some(exc);
        self.defunct.store(true, Ordering::SeqCst);
    }
}

impl Connection for TcpConnection {
    fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::SeqCst)
    }

    fn last_exception(&self) -> Option<DatabaseError> {
        self.last_exception.lock().unwrap().clone()
    }

    async fn set_keyspace(&self, keyspace: &str) -> Result<(), DatabaseError> {
        *self.keyspace.lock().unwrap() = Some(keyspace.to_string());
        Ok(())
    }

    fn close(&self) {
        self.defunct.store(true, Ordering::SeqCst);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockConnection;
    use super::*;

    #[tokio::test]
    async fn try_claim_stream_respects_max() {
        let pooled = PooledConnection::new("h:1".to_string(), MockConnection::default());
        assert!(pooled.try_claim_stream(2).await);
        assert_eq!(pooled.in_flight().await, 1);
        assert!(pooled.try_claim_stream(2).await);
        assert_eq!(pooled.in_flight().await, 2);
        assert!(!pooled.try_claim_stream(2).await);
        assert_eq!(pooled.in_flight().await, 2);
    }

    #[tokio::test]
    async fn release_stream_decrements() {
        let pooled = PooledConnection::new("h:1".to_string(), MockConnection::default());
        pooled.try_claim_stream(2).await;
        pooled.try_claim_stream(2).await;
        assert_eq!(pooled.release_stream().await, 1);
        assert_eq!(pooled.release_stream().await, 0);
    }

    #[tokio::test]
    async fn close_is_forwarded_once() {
        let pooled = PooledConnection::new("h:1".to_string(), MockConnection::default());
        pooled.close();
        assert!(pooled.connection().closed.load(Ordering::SeqCst));
        assert_eq!(pooled.connection().close_count.load(Ordering::SeqCst), 1);
    }
}
