//! Configuration for minidfs components

use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix (`MINIDFS_BIND_ADDR=...`)
const ENV_PREFIX: &str = "MINIDFS";

/// Load a config struct from an optional TOML file layered with environment variables.
/// Missing keys fall back to the struct's `Default`.
pub fn load<T>(path: Option<&Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }
    let settings = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP RPC surface
    pub bind_addr: SocketAddr,

    /// Department names a file may belong to
    pub departments: Vec<String>,

    /// Seeded manager account
    pub manager_user: String,
    pub manager_password: String,

    /// Session token validity
    pub token_ttl_secs: u64,

    /// Health monitor interval
    pub health_interval_secs: u64,

    /// Per-probe timeout; an expired probe counts as unreachable
    pub probe_timeout_ms: u64,

    /// Reconciler time of day ("HH:MM", local time). Takes precedence over the interval.
    pub sync_at: Option<String>,

    /// Reconciler interval when no time of day is set
    pub sync_interval_secs: u64,

    pub log_level: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            departments: ["IT", "HR", "QA", "GRAPHICS", "SALES"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            manager_user: "man".to_string(),
            manager_password: "123".to_string(),
            token_ttl_secs: 30 * 60,
            health_interval_secs: 10,
            probe_timeout_ms: 2_000,
            sync_at: None,
            sync_interval_secs: 3_600,
            log_level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node ID (unique identifier)
    pub node_id: String,

    /// Bind address for the HTTP RPC surface
    pub bind_addr: SocketAddr,

    /// URL the coordinator uses to reach this node
    pub advertise_url: String,

    /// Coordinator URL for self-registration
    pub coordinator_url: String,

    /// Root directory for this node's files
    pub storage_root: PathBuf,

    /// Replication multicast group and port
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,

    /// Interface used to join the multicast group
    pub multicast_interface: Ipv4Addr,

    /// Maximum payload bytes per DATA datagram
    pub chunk_size: usize,

    /// Delay between consecutive replication datagrams
    pub pacing_ms: u64,

    /// Connect timeout for dial-back transfers
    pub dial_timeout_ms: u64,

    /// A replication transfer silent for this long is abandoned
    pub replication_idle_secs: u64,

    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 6000)),
            advertise_url: "http://127.0.0.1:6000".to_string(),
            coordinator_url: "http://127.0.0.1:5000".to_string(),
            storage_root: PathBuf::from("./storage"),
            multicast_group: Ipv4Addr::new(239, 0, 0, 2),
            multicast_port: 5678,
            multicast_interface: Ipv4Addr::UNSPECIFIED,
            chunk_size: 1024,
            pacing_ms: 5,
            dial_timeout_ms: 5_000,
            replication_idle_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Storage directory private to this node
    pub fn node_root(&self) -> PathBuf {
        self.storage_root.join(&self.node_id)
    }

    pub fn multicast_target(&self) -> SocketAddr {
        SocketAddr::from((self.multicast_group, self.multicast_port))
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn replication_idle(&self) -> Duration {
        Duration::from_secs(self.replication_idle_secs)
    }
}
