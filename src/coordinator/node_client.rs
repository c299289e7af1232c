//! Coordinator-side handle to a storage node
//!
//! The orchestrator, reconciler and health monitor only see [`NodeHandle`].
//! [`HttpNodeClient`] is the production implementation; tests substitute
//! in-process fakes.

use crate::client::decode_json;
use crate::common::{FullName, Result};
use crate::node::api::{NameRequest, NodeIdResponse, OkResponse, StatResponse, TransferRequest};
use crate::node::storage::FileDigest;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Operations a coordinator may invoke on a storage node.
///
/// `Ok(false)` means the node declined (file exists on create, missing on
/// update or delete); `Err` is a remote or transport fault.
pub trait NodeHandle: Send + Sync {
    fn create_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>>;

    fn get_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<()>>;

    fn update_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>>;

    fn delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<bool>>;

    /// Fingerprint of the node's copy; `None` if it holds none
    fn stat_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<Option<FileDigest>>>;

    /// Broadcast the node's copy to every peer
    fn sync_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>>;

    /// Physically remove a tombstoned file
    fn sync_delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>>;

    fn ping(&self) -> BoxFuture<'_, Result<bool>>;

    fn node_id(&self) -> BoxFuture<'_, Result<String>>;
}

/// Node handle speaking the node's JSON-over-HTTP surface
pub struct HttpNodeClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpNodeClient {
    /// No overall request timeout: a create or get holds the call open for
    /// the whole dial-back stream.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        decode_json(resp).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        decode_json(resp).await
    }

    async fn transfer(&self, path: &str, addr: &str, port: u16, name: &FullName) -> Result<bool> {
        let req = TransferRequest {
            addr: addr.to_string(),
            port,
            name: name.clone(),
        };
        let resp: OkResponse = self.post(path, &req).await?;
        Ok(resp.ok)
    }

    async fn named(&self, path: &str, name: &FullName) -> Result<bool> {
        let req = NameRequest { name: name.clone() };
        let resp: OkResponse = self.post(path, &req).await?;
        Ok(resp.ok)
    }
}

impl NodeHandle for HttpNodeClient {
    fn create_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>> {
        self.transfer("/files/create", addr, port, name).boxed()
    }

    fn get_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.transfer("/files/get", addr, port, name).await?;
            Ok(())
        }
        .boxed()
    }

    fn update_file<'a>(
        &'a self,
        addr: &'a str,
        port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>> {
        self.transfer("/files/update", addr, port, name).boxed()
    }

    fn delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<bool>> {
        self.named("/files/delete", name).boxed()
    }

    fn stat_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<Option<FileDigest>>> {
        async move {
            let req = NameRequest { name: name.clone() };
            let resp: StatResponse = self.post("/files/stat", &req).await?;
            Ok(resp.digest)
        }
        .boxed()
    }

    fn sync_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>> {
        async move {
            self.named("/sync", name).await?;
            Ok(())
        }
        .boxed()
    }

    fn sync_delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>> {
        async move {
            self.named("/sync/delete", name).await?;
            Ok(())
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<bool>> {
        async move {
            let resp: OkResponse = self.get("/ping").await?;
            Ok(resp.ok)
        }
        .boxed()
    }

    fn node_id(&self) -> BoxFuture<'_, Result<String>> {
        async move {
            let resp: NodeIdResponse = self.get("/id").await?;
            Ok(resp.node_id)
        }
        .boxed()
    }
}
