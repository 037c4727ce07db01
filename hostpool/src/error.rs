//! Error types for the host connection pool and health/reconnection subsystem.
//!
//! This module defines the error taxonomy consumed by the pool, health
//! monitor, and reconnection handler: connection-layer failures that feed
//! the conviction policy, authentication failures that are terminal for a
//! single host without necessarily convicting it, and the pool's own
//! deterministic failure modes (shutdown, timeout).

use thiserror::Error;

/// Errors surfaced by the connection pool, health monitor, and reconnection
/// handler.
#[derive(Error, Debug, Clone)]
pub enum DatabaseError {
    /// A connection attempt or in-flight I/O operation failed at the
    /// network layer. Fed to `ConvictionPolicy::add_failure`; may lead to
    /// host conviction and pool shutdown.
    #[error("connection error to {host}: {details}")]
    ConnectionError {
        /// The host the connection was to or from.
        host: String,
        /// Details about the failure.
        details: String,
    },

    /// Authentication failed against a host. Terminal for reconnection
    /// attempts against that host, but does not by itself convict the host
    /// via the health monitor.
    #[error("authentication failed for {host}: {reason}")]
    AuthenticationError {
        /// The host authentication was attempted against.
        host: String,
        /// The reason authentication failed.
        reason: String,
    },

    /// The pool has been shut down and will not hand out further
    /// connections.
    #[error("pool for {host} is shut down")]
    PoolShutdown {
        /// The host whose pool is shut down.
        host: String,
    },

    /// No connection became available before the borrow timeout elapsed.
    #[error("no connections available for {host} after waiting {waited_ms}ms")]
    NoConnectionsAvailable {
        /// The host a connection was requested from.
        host: String,
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// Reserved for callers that inspect a borrowed connection's saturation
    /// directly rather than going through `borrow_connection`.
    #[error("connection to {host} is busy")]
    BusyConnection {
        /// The host the busy connection belongs to.
        host: String,
    },

    /// A pool or cluster configuration value was invalid.
    #[error("invalid configuration: {message}")]
    ConfigError {
        /// Description of what was invalid.
        message: String,
    },
}

impl DatabaseError {
    /// Returns true if this error is retryable by a `ReconnectionHandler`.
    ///
    /// Every variant in this taxonomy is retryable except authentication
    /// failures, which are terminal for the handler (§4.2's default
    /// `on_exception` policy).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DatabaseError::AuthenticationError { .. })
    }

    /// Returns true if this is a network-layer connection error, as opposed
    /// to an authentication failure or a pool-local condition.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DatabaseError::ConnectionError { .. })
    }

    /// Returns true if this is an authentication failure.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, DatabaseError::AuthenticationError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let err = DatabaseError::ConnectionError {
            host: "10.0.0.1:9042".to_string(),
            details: "refused".to_string(),
        };
        assert_eq!(err.to_string(), "connection error to 10.0.0.1:9042: refused");
    }

    #[test]
    fn retryable_excludes_only_auth_errors() {
        assert!(DatabaseError::ConnectionError {
            host: "h".to_string(),
            details: "d".to_string(),
        }
        .is_retryable());
        assert!(DatabaseError::PoolShutdown { host: "h".to_string() }.is_retryable());
        assert!(!DatabaseError::AuthenticationError {
            host: "h".to_string(),
            reason: "bad creds".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn classification_helpers() {
        let conn = DatabaseError::ConnectionError {
            host: "h".to_string(),
            details: "d".to_string(),
        };
        assert!(conn.is_connection_error());
        assert!(!conn.is_auth_error());

        let auth = DatabaseError::AuthenticationError {
            host: "h".to_string(),
            reason: "r".to_string(),
        };
        assert!(auth.is_auth_error());
        assert!(!auth.is_connection_error());
    }
}
