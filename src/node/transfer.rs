//! Point-to-point transfers
//!
//! The client listens first; the node dials out to the client's address and
//! the whole connection payload is the file content. End of stream is end of
//! file. Only "already exists" (create) maps to `Ok(false)`; every socket or
//! I/O failure is an error so the coordinator moves on to the next candidate.

use crate::common::{format_bytes, Error, FullName, Result};
use crate::node::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

pub struct TransferEndpoint {
    storage: Arc<Storage>,
    dial_timeout: Duration,
}

impl TransferEndpoint {
    pub fn new(storage: Arc<Storage>, dial_timeout: Duration) -> Self {
        Self {
            storage,
            dial_timeout,
        }
    }

    async fn dial(&self, addr: &str, port: u16) -> Result<TcpStream> {
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect((addr, port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::Transport(format!(
                "dial {}:{} failed: {}",
                addr, port, e
            ))),
            Err(_) => Err(Error::Transport(format!(
                "dial {}:{} timed out after {:?}",
                addr, port, self.dial_timeout
            ))),
        }
    }

    /// Pull a new file from the client. `Ok(false)` if it already exists here.
    pub async fn receive_new(&self, addr: &str, port: u16, name: &FullName) -> Result<bool> {
        let mut file = match self.storage.create(name).await? {
            Some(file) => file,
            None => {
                tracing::info!("{} already exists, refusing create", name);
                return Ok(false);
            }
        };

        let result = async {
            let mut stream = self.dial(addr, port).await?;
            let bytes = tokio::io::copy(&mut stream, &mut file).await?;
            file.sync_all().await?;
            Ok::<_, Error>(bytes)
        }
        .await;

        match result {
            Ok(bytes) => {
                tracing::info!("Created {} ({})", name, format_bytes(bytes));
                Ok(true)
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = self.storage.delete(name).await {
                    tracing::warn!("Failed to remove partial {}: {}", name, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Pull replacement content from the client; creates the file if missing
    pub async fn receive_update(&self, addr: &str, port: u16, name: &FullName) -> Result<bool> {
        let mut staged = self.storage.stage(name).await?;

        let result = async {
            let mut stream = self.dial(addr, port).await?;
            Ok::<_, Error>(tokio::io::copy(&mut stream, staged.file_mut()).await?)
        }
        .await;

        match result {
            Ok(bytes) => {
                staged.commit().await?;
                tracing::info!("Updated {} ({})", name, format_bytes(bytes));
                Ok(true)
            }
            Err(e) => {
                staged.abort().await;
                Err(e)
            }
        }
    }

    /// Push a stored file to the client
    pub async fn send(&self, addr: &str, port: u16, name: &FullName) -> Result<()> {
        let mut file = self
            .storage
            .open_read(name)
            .await?
            .ok_or_else(|| Error::ResourceState(format!("{} not found on this node", name)))?;

        let mut stream = self.dial(addr, port).await?;
        let bytes = tokio::io::copy(&mut file, &mut stream).await?;
        stream.shutdown().await?;
        tracing::info!("Sent {} to {}:{} ({})", name, addr, port, format_bytes(bytes));
        Ok(())
    }
}
