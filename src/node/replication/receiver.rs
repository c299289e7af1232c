//! Receive side of replication
//!
//! One in-flight transfer per `(sender, path)`. START opens a fresh staged
//! file (abandoning any earlier one for the same key), DATA appends, END
//! renames the staged file onto the real path, ERROR abandons. DATA or END
//! with no open transfer is dropped, so a lost START means the whole
//! transfer is silently skipped and picked up by a later reconcile pass.
//!
//! A transfer that hears nothing for `idle_timeout` is abandoned by the
//! receive loop, so a lost END or ERROR does not leave a staging file behind.

use super::codec::{MessageType, ReplicationMessage};
use crate::common::{FullName, Result};
use crate::node::storage::{StagedFile, Storage};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Receive buffer; larger than any valid frame so oversized datagrams are caught by decode
const RECV_BUFFER: usize = 64 * 1024;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// What a single message did to receiver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Opened,
    Appended,
    Committed,
    Aborted,
    /// Own message, unknown transfer, or invalid path
    Ignored,
}

struct Inflight {
    staged: StagedFile,
    last_seen: Instant,
}

pub struct Receiver {
    node_id: String,
    storage: Arc<Storage>,
    idle_timeout: Duration,
    inflight: HashMap<(String, FullName), Inflight>,
}

impl Receiver {
    pub fn new(node_id: String, storage: Arc<Storage>) -> Self {
        Self {
            node_id,
            storage,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            inflight: HashMap::new(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Transfers currently open
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub async fn handle(&mut self, msg: ReplicationMessage) -> Result<Applied> {
        if msg.sender == self.node_id {
            return Ok(Applied::Ignored);
        }
        let name = match FullName::parse(&msg.path) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Dropping frame from {}: {}", msg.sender, e);
                return Ok(Applied::Ignored);
            }
        };
        let key = (msg.sender, name);

        match msg.kind {
            MessageType::Start => {
                if let Some(previous) = self.inflight.remove(&key) {
                    tracing::debug!("Restarting transfer of {} from {}", key.1, key.0);
                    previous.staged.abort().await;
                }
                let staged = self.storage.stage(&key.1).await?;
                tracing::info!("Receiving {} from {}", key.1, key.0);
                self.inflight.insert(
                    key,
                    Inflight {
                        staged,
                        last_seen: Instant::now(),
                    },
                );
                Ok(Applied::Opened)
            }
            MessageType::Data => {
                let Some(entry) = self.inflight.get_mut(&key) else {
                    return Ok(Applied::Ignored);
                };
                entry.last_seen = Instant::now();
                if let Err(e) = entry.staged.write_all(&msg.payload).await {
                    if let Some(entry) = self.inflight.remove(&key) {
                        entry.staged.abort().await;
                    }
                    return Err(e);
                }
                Ok(Applied::Appended)
            }
            MessageType::End => {
                let Some(entry) = self.inflight.remove(&key) else {
                    return Ok(Applied::Ignored);
                };
                entry.staged.commit().await?;
                tracing::info!("Replica of {} from {} stored", key.1, key.0);
                Ok(Applied::Committed)
            }
            MessageType::Error => {
                let Some(entry) = self.inflight.remove(&key) else {
                    return Ok(Applied::Ignored);
                };
                tracing::warn!("{} aborted transfer of {}", key.0, key.1);
                entry.staged.abort().await;
                Ok(Applied::Aborted)
            }
        }
    }

    /// Abandon transfers idle since before `now - idle_timeout`. Returns how
    /// many were dropped.
    pub async fn expire_idle(&mut self, now: Instant) -> usize {
        let idle_timeout = self.idle_timeout;
        let stale: Vec<(String, FullName)> = self
            .inflight
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) >= idle_timeout)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(entry) = self.inflight.remove(key) {
                tracing::warn!("Transfer of {} from {} went idle; dropping it", key.1, key.0);
                entry.staged.abort().await;
            }
        }
        stale.len()
    }

    /// Receive loop; runs for the life of the node
    pub async fn run(mut self, socket: UdpSocket) {
        tracing::info!("Replication receiver for {} listening", self.node_id);
        let mut buf = vec![0u8; RECV_BUFFER];
        let period = (self.idle_timeout / 2).max(Duration::from_millis(10));
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            let received = tokio::select! {
                received = socket.recv_from(&mut buf) => received,
                _ = sweep.tick() => {
                    self.expire_idle(Instant::now()).await;
                    continue;
                }
            };
            let (n, from) = match received {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Replication socket error: {}", e);
                    continue;
                }
            };
            let msg = match ReplicationMessage::decode(&buf[..n]) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("Discarding datagram from {}: {}", from, e);
                    continue;
                }
            };
            if let Err(e) = self.handle(msg).await {
                tracing::warn!("Replication receive failed: {}", e);
            }
        }
    }
}

/// Socket joined to the replication group. Address reuse lets several nodes
/// on one host share the port.
pub fn multicast_socket(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    if group.is_multicast() {
        socket.join_multicast_v4(&group, &interface)?;
    }
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}
