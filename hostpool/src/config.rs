//! Per-host-distance pool sizing and cluster-wide configuration.
//!
//! Grounded in the distance-parameterized config getters enumerated in §6 of
//! the spec (`get_core_connections_per_host`, `get_max_connections_per_host`,
//! `get_max_requests_per_connection`, `get_min_requests_per_connection`),
//! expressed here as a `HashMap<HostDistance, PoolSizing>` instead of one
//! method call per distance.

use crate::error::DatabaseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How far a host is from the client, driving pool sizing decisions.
///
/// `Ignored` hosts are never pooled; a pool constructed for an `Ignored`
/// host should never be asked to open connections (its `PoolSizing` is
/// `core_connections = max_connections = 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostDistance {
    /// Same datacenter as the client.
    Local,
    /// A different datacenter.
    Remote,
    /// Known to the cluster but excluded from pooling.
    Ignored,
}

/// Pool size bounds and request thresholds for one [`HostDistance`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolSizing {
    /// Floor on pool size; the pool opens this many connections at
    /// construction and never shrinks below it.
    pub core_connections: u32,
    /// Ceiling on pool size.
    pub max_connections: u32,
    /// `in_flight` threshold above which growth is triggered.
    pub max_requests_per_connection: u32,
    /// `in_flight` threshold at or below which shrink is allowed.
    pub min_requests_per_connection: u32,
}

impl PoolSizing {
    fn validate(&self, max_stream_per_connection: u32) -> Result<(), DatabaseError> {
        if self.core_connections > self.max_connections {
            return Err(DatabaseError::ConfigError {
                message: format!(
                    "core_connections ({}) must not exceed max_connections ({})",
                    self.core_connections, self.max_connections
                ),
            });
        }
        if self.max_requests_per_connection >= max_stream_per_connection {
            return Err(DatabaseError::ConfigError {
                message: format!(
                    "max_requests_per_connection ({}) must be less than max_stream_per_connection ({})",
                    self.max_requests_per_connection, max_stream_per_connection
                ),
            });
        }
        if self.min_requests_per_connection >= self.max_requests_per_connection {
            return Err(DatabaseError::ConfigError {
                message: format!(
                    "min_requests_per_connection ({}) must be less than max_requests_per_connection ({})",
                    self.min_requests_per_connection, self.max_requests_per_connection
                ),
            });
        }
        Ok(())
    }

    fn ignored() -> Self {
        Self {
            core_connections: 0,
            max_connections: 0,
            max_requests_per_connection: 0,
            min_requests_per_connection: 0,
        }
    }
}

/// Cluster-wide pool configuration: sizing per [`HostDistance`] plus the two
/// protocol-level constants from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    sizing: HashMap<HostDistance, PoolSizing>,
    /// The protocol's maximum concurrent streams per connection
    /// (`MAX_STREAM_PER_CONNECTION`, §6). Compile-time in the source;
    /// configurable here since it is a cluster negotiation outcome in
    /// practice.
    pub max_stream_per_connection: u32,
    /// At most one pending async connection-creation task per pool at a
    /// time (`_MAX_SIMULTANEOUS_CREATION`, §6).
    pub max_simultaneous_creation: u32,
}

impl ClusterConfig {
    /// Builds a config from explicit local/remote sizing, validating both
    /// against `max_stream_per_connection`.
    pub fn new(
        local: PoolSizing,
        remote: PoolSizing,
        max_stream_per_connection: u32,
    ) -> Result<Self, DatabaseError> {
        local.validate(max_stream_per_connection)?;
        remote.validate(max_stream_per_connection)?;

        let mut sizing = HashMap::with_capacity(3);
        sizing.insert(HostDistance::Local, local);
        sizing.insert(HostDistance::Remote, remote);
        sizing.insert(HostDistance::Ignored, PoolSizing::ignored());

        Ok(Self {
            sizing,
            max_stream_per_connection,
            max_simultaneous_creation: 1,
        })
    }

    /// Returns the sizing for a given distance.
    pub fn sizing(&self, distance: HostDistance) -> PoolSizing {
        self.sizing
            .get(&distance)
            .copied()
            .unwrap_or_else(PoolSizing::ignored)
    }

    pub fn core_connections_per_host(&self, distance: HostDistance) -> u32 {
        self.sizing(distance).core_connections
    }

    pub fn max_connections_per_host(&self, distance: HostDistance) -> u32 {
        self.sizing(distance).max_connections
    }

    pub fn max_requests_per_connection(&self, distance: HostDistance) -> u32 {
        self.sizing(distance).max_requests_per_connection
    }

    pub fn min_requests_per_connection(&self, distance: HostDistance) -> u32 {
        self.sizing(distance).min_requests_per_connection
    }
}

impl Default for ClusterConfig {
    /// §6's typical values: local core=2/max=8, remote core=1/max=2,
    /// max_requests=100, min_requests=25, MAX_STREAM_PER_CONNECTION=128.
    fn default() -> Self {
        Self::new(
            PoolSizing {
                core_connections: 2,
                max_connections: 8,
                max_requests_per_connection: 100,
                min_requests_per_connection: 25,
            },
            PoolSizing {
                core_connections: 1,
                max_connections: 2,
                max_requests_per_connection: 100,
                min_requests_per_connection: 25,
            },
            128,
        )
        .expect("default cluster config is valid")
    }
}
