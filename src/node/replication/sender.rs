//! Broadcast side of replication: START, DATA*, END

use super::codec::{header_len, ReplicationMessage, MAX_DATAGRAM};
use crate::common::{format_bytes, Error, FullName, Result};
use crate::node::storage::Storage;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;

/// Summary of one broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub chunks: u64,
    pub bytes: u64,
}

pub struct Broadcaster {
    node_id: String,
    storage: Arc<Storage>,
    socket: UdpSocket,
    target: SocketAddr,
    chunk_size: usize,
    pacing: Duration,
}

impl Broadcaster {
    /// Bind an ephemeral sending socket aimed at `target` (normally the multicast group)
    pub async fn bind(
        node_id: String,
        storage: Arc<Storage>,
        target: SocketAddr,
        chunk_size: usize,
        pacing: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        if let SocketAddr::V4(v4) = target {
            if v4.ip().is_multicast() {
                socket.set_multicast_loop_v4(true)?;
                socket.set_multicast_ttl_v4(1)?;
            }
        }
        Ok(Self {
            node_id,
            storage,
            socket,
            target,
            chunk_size,
            pacing,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Largest chunk that keeps a DATA frame for `path` inside one datagram
    fn effective_chunk(&self, path: &str) -> Result<usize> {
        let room = MAX_DATAGRAM.saturating_sub(header_len(&self.node_id, path));
        let chunk = self.chunk_size.min(room);
        if chunk == 0 {
            return Err(Error::Protocol(format!(
                "no room for payload in a datagram for {}",
                path
            )));
        }
        Ok(chunk)
    }

    async fn send(&self, msg: &ReplicationMessage) -> Result<()> {
        let frame = msg.encode()?;
        self.socket.send_to(&frame, self.target).await?;
        Ok(())
    }

    /// Broadcast a stored file to every listening peer. Nothing is acknowledged.
    pub async fn broadcast(&self, name: &FullName) -> Result<BroadcastReport> {
        let path = name.to_string();
        let chunk_size = self.effective_chunk(&path)?;
        let mut file = self
            .storage
            .open_read(name)
            .await?
            .ok_or_else(|| Error::ResourceState(format!("{} not found on this node", name)))?;

        tracing::info!("Broadcasting {} to {}", path, self.target);
        self.send(&ReplicationMessage::start(&self.node_id, &path))
            .await?;
        tokio::time::sleep(self.pacing * 2).await;

        let mut report = BroadcastReport { chunks: 0, bytes: 0 };
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = match read_chunk(&mut file, &mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Read of {} failed mid-broadcast: {}", path, e);
                    self.send(&ReplicationMessage::error(&self.node_id, &path))
                        .await?;
                    return Err(e.into());
                }
            };
            let payload = Bytes::copy_from_slice(&buf[..n]);
            self.send(&ReplicationMessage::data(&self.node_id, &path, payload))
                .await?;
            report.chunks += 1;
            report.bytes += n as u64;
            if report.chunks % 100 == 0 {
                tracing::debug!("{}: sent {} chunks", path, report.chunks);
            }
            tokio::time::sleep(self.pacing).await;
        }

        self.send(&ReplicationMessage::end(&self.node_id, &path))
            .await?;
        tracing::info!(
            "Broadcast of {} complete: {} chunks, {}",
            path,
            report.chunks,
            format_bytes(report.bytes)
        );
        Ok(report)
    }
}

/// Fill `buf` unless the file ends first
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
