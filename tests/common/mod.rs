//! Shared fixtures for integration tests

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use minidfs::common::{Error, FullName, Result};
use minidfs::coordinator::{NodeHandle, Orchestrator, Reconciler};
use minidfs::node::FileDigest;
use minidfs::{Coordinator, CoordinatorConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;

/// How a fake node answers file operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Decline,
    Fail,
}

/// How a fake node answers pings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingBehavior {
    Up,
    SaysFalse,
    Fail,
    Hang,
}

/// Calls across every fake of one test, in order
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Content `put` stores
pub const ORIGINAL: &[u8] = b"original";

/// In-process node holding files in memory
pub struct FakeNode {
    pub id: String,
    files: Mutex<HashMap<FullName, Vec<u8>>>,
    behavior: Mutex<Behavior>,
    ping: Mutex<PingBehavior>,
    hold: Mutex<Option<Arc<Notify>>>,
    peers: Mutex<Vec<Weak<FakeNode>>>,
    log: CallLog,
}

impl FakeNode {
    pub fn new(id: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            files: Mutex::new(HashMap::new()),
            behavior: Mutex::new(Behavior::Succeed),
            ping: Mutex::new(PingBehavior::Up),
            hold: Mutex::new(None),
            peers: Mutex::new(Vec::new()),
            log: log.clone(),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_ping(&self, ping: PingBehavior) {
        *self.ping.lock().unwrap() = ping;
    }

    /// File operations wait until `release` is called
    pub fn hold(&self) {
        *self.hold.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release(&self) {
        if let Some(notify) = self.hold.lock().unwrap().take() {
            notify.notify_waiters();
            notify.notify_one();
        }
    }

    pub fn has(&self, name: &FullName) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    pub fn content(&self, name: &FullName) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn put(&self, name: &FullName) {
        self.store(name, ORIGINAL.to_vec());
    }

    pub fn store(&self, name: &FullName, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(name.clone(), bytes);
    }

    /// Lose a file without telling anyone, as a wiped disk would
    pub fn lose(&self, name: &FullName) {
        self.files.lock().unwrap().remove(name);
    }

    fn record(&self, op: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", op, self.id));
    }

    async fn gate(&self, op: &str) -> Result<Behavior> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        self.record(op);
        let behavior = *self.behavior.lock().unwrap();
        if behavior == Behavior::Fail {
            return Err(Error::Transport(format!("{} unreachable", self.id)));
        }
        Ok(behavior)
    }
}

/// Link every fake to every other so `sync_file` copies to peers
pub fn link(nodes: &[Arc<FakeNode>]) {
    for node in nodes {
        let peers = nodes
            .iter()
            .filter(|p| p.id != node.id)
            .map(Arc::downgrade)
            .collect();
        *node.peers.lock().unwrap() = peers;
    }
}

impl NodeHandle for FakeNode {
    fn create_file<'a>(
        &'a self,
        _addr: &'a str,
        _port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            if self.gate("create").await? == Behavior::Decline {
                return Ok(false);
            }
            let mut files = self.files.lock().unwrap();
            if files.contains_key(name) {
                return Ok(false);
            }
            files.insert(name.clone(), format!("created on {}", self.id).into_bytes());
            Ok(true)
        }
        .boxed()
    }

    fn get_file<'a>(
        &'a self,
        _addr: &'a str,
        _port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.gate("get").await?;
            if self.has(name) {
                Ok(())
            } else {
                Err(Error::ResourceState(format!("{} not here", name)))
            }
        }
        .boxed()
    }

    fn update_file<'a>(
        &'a self,
        _addr: &'a str,
        _port: u16,
        name: &'a FullName,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            if self.gate("update").await? == Behavior::Decline {
                return Ok(false);
            }
            self.store(name, format!("updated on {}", self.id).into_bytes());
            Ok(true)
        }
        .boxed()
    }

    fn delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<bool>> {
        async move {
            if self.gate("delete").await? == Behavior::Decline {
                return Ok(false);
            }
            Ok(self.files.lock().unwrap().remove(name).is_some())
        }
        .boxed()
    }

    /// Answers whatever the behavior, and is not logged
    fn stat_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<Option<FileDigest>>> {
        async move {
            Ok(self.content(name).map(|bytes| FileDigest {
                size: bytes.len() as u64,
                crc32: crc32fast::hash(&bytes),
            }))
        }
        .boxed()
    }

    /// Copies to linked peers only
    fn sync_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>> {
        async move {
            self.gate("sync").await?;
            let Some(bytes) = self.content(name) else {
                return Err(Error::ResourceState(format!("{} not here", name)));
            };
            let peers = self.peers.lock().unwrap().clone();
            for peer in peers.iter().filter_map(Weak::upgrade) {
                peer.store(name, bytes.clone());
            }
            Ok(())
        }
        .boxed()
    }

    fn sync_delete_file<'a>(&'a self, name: &'a FullName) -> BoxFuture<'a, Result<()>> {
        async move {
            self.record("purge");
            self.files.lock().unwrap().remove(name);
            Ok(())
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<bool>> {
        async move {
            let ping = *self.ping.lock().unwrap();
            match ping {
                PingBehavior::Up => Ok(true),
                PingBehavior::SaysFalse => Ok(false),
                PingBehavior::Fail => Err(Error::Transport("connection refused".into())),
                PingBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(true)
                }
            }
        }
        .boxed()
    }

    fn node_id(&self) -> BoxFuture<'_, Result<String>> {
        async move { Ok(self.id.clone()) }.boxed()
    }
}

/// Coordinator with the default configuration (manager `man`/`123`)
pub fn orchestrator() -> Arc<Orchestrator> {
    Coordinator::new(CoordinatorConfig::default())
        .unwrap()
        .orchestrator()
}

pub fn reconciler(orch: &Orchestrator) -> Reconciler {
    Reconciler::new(
        orch.nodes().clone(),
        orch.replicas().clone(),
        orch.gate().clone(),
    )
}

pub fn name(s: &str) -> FullName {
    FullName::parse(s).unwrap()
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
