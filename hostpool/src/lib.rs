//! hostpool
//!
//! Per-host connection pool and host health/reconnection subsystem for a
//! distributed wide-column database client.
//!
//! # Features
//!
//! - Dynamically sized, per-host connection pools with fair connection
//!   selection and safe recycling
//! - Host up/down lifecycle tracking with listener fan-out
//! - A schedulable, cancelable reconnection state machine with pluggable
//!   backoff
//! - Async/await API using tokio
//!
//! # Example
//!
//! ```no_run
//! use hostpool::config::{ClusterConfig, HostDistance};
//! use hostpool::connection::{Connection, ConnectionFactory};
//! use hostpool::error::DatabaseError;
//! use hostpool::health::NeverConvicts;
//! use hostpool::host::Host;
//! use hostpool::pool::HostConnectionPool;
//! use hostpool::session::Session;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # struct DemoConnection;
//! # impl Connection for DemoConnection {
//! #     fn is_defunct(&self) -> bool { false }
//! #     fn last_exception(&self) -> Option<DatabaseError> { None }
//! #     async fn set_keyspace(&self, _keyspace: &str) -> Result<(), DatabaseError> { Ok(()) }
//! #     fn close(&self) {}
//! # }
//! # struct DemoFactory;
//! # impl ConnectionFactory for DemoFactory {
//! #     type Conn = DemoConnection;
//! #     async fn connect(&self, _address: &str) -> Result<Self::Conn, DatabaseError> { Ok(DemoConnection) }
//! # }
//! #
//! # #[tokio::main]
//! # async fn main() -> Result<(), DatabaseError> {
//! let host = Host::new("10.0.0.1:9042", |_| Box::new(NeverConvicts));
//! let session = Session::new(Arc::new(ClusterConfig::default()), Arc::new(DemoFactory));
//! let pool = HostConnectionPool::new(host, HostDistance::Local, session).await?;
//!
//! let conn = pool.borrow_connection(Duration::from_secs(5)).await?;
//! pool.return_connection(conn).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod host;
pub mod pool;
pub mod reconnection;
pub mod schedule;
pub mod scheduler;
pub mod session;

pub use config::{ClusterConfig, HostDistance, PoolSizing};
pub use connection::{Connection, ConnectionFactory, PooledConnection};
pub use error::DatabaseError;
pub use health::{ConvictionPolicy, HealthListener, HealthMonitor};
pub use host::Host;
pub use pool::HostConnectionPool;
pub use reconnection::{HandlerState, ReconnectionHandle, ReconnectionHandler, ReconnectionTarget};
pub use schedule::Schedule;
pub use scheduler::Scheduler;
pub use session::Session;

/// Result type alias using [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
