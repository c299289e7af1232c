//! Reconciler: repairs under-replicated files and purges tombstones
//!
//! A pass walks every known file. A tombstone is purged from every
//! registered node. For a live file, every registered node is asked for a
//! digest of its copy; nodes whose digest matches the least-loaded replica's
//! become the replica set. If any registered node is still missing the
//! content, the file is broadcast from one of the confirmed holders.
//!
//! Broadcasts are never acknowledged. A node only joins the replica set once
//! a later pass sees the right digest on it, so a node that missed the
//! datagrams is broadcast to again on every pass until it holds the file.
//!
//! Files with an operation in flight are skipped for the pass.

use crate::common::{Error, FullName, Result};
use crate::coordinator::gate::{BusyGate, GateMode};
use crate::coordinator::node_client::NodeHandle;
use crate::coordinator::registry::NodeRegistry;
use crate::coordinator::replicas::{FileMeta, ReplicaRegistry};
use crate::node::storage::FileDigest;
use chrono::{Local, NaiveDateTime, NaiveTime};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// When the recurring pass fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSchedule {
    /// Once a day at a local wall-clock time
    Daily(NaiveTime),
    Every(Duration),
}

impl SyncSchedule {
    /// `sync_at` ("HH:MM") wins over the interval
    pub fn from_config(sync_at: Option<&str>, interval: Duration) -> Result<Self> {
        match sync_at {
            Some(at) => NaiveTime::parse_from_str(at, "%H:%M")
                .map(SyncSchedule::Daily)
                .map_err(|e| Error::InvalidConfig(format!("sync_at {:?}: {}", at, e))),
            None if interval.is_zero() => Err(Error::InvalidConfig(
                "sync interval must be positive".into(),
            )),
            None => Ok(SyncSchedule::Every(interval)),
        }
    }

    /// Delay from `now` until the next firing
    pub fn next_delay(&self, now: NaiveDateTime) -> Duration {
        match self {
            SyncSchedule::Every(interval) => *interval,
            SyncSchedule::Daily(at) => {
                let today = now.date().and_time(*at);
                let next = if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                };
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub purged: usize,
    /// Files whose replica set changed after digest checks
    pub confirmed: usize,
    /// Files broadcast this pass
    pub repaired: usize,
    pub skipped_busy: usize,
    pub failed: usize,
}


pub struct Reconciler {
    nodes: Arc<NodeRegistry>,
    replicas: Arc<ReplicaRegistry>,
    gate: Arc<BusyGate>,
}

impl Reconciler {
    pub fn new(
        nodes: Arc<NodeRegistry>,
        replicas: Arc<ReplicaRegistry>,
        gate: Arc<BusyGate>,
    ) -> Self {
        Self {
            nodes,
            replicas,
            gate,
        }
    }

    pub async fn run_pass(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        tracing::info!("Reconcile pass starting over {} nodes", self.nodes.len());

        for entry in self.replicas.snapshot() {
            report.checked += 1;
            let _permit = match self.gate.try_acquire(&entry.name, GateMode::Write) {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("Skipping {}: operation in flight", entry.name);
                    report.skipped_busy += 1;
                    continue;
                }
            };
            // the entry may have changed between the snapshot and the gate
            let Some(meta) = self.replicas.get(&entry.name) else {
                continue;
            };

            if meta.is_tombstone() {
                self.purge(&meta.name).await;
                report.purged += 1;
                continue;
            }

            // registry membership can change mid-pass; each file sees one view
            let nodes = self.nodes.handles();
            let registered: Vec<String> = nodes.iter().map(|(id, _)| id.clone()).collect();
            let holders = match self.verify(&meta, &nodes).await {
                Some(holders) => holders,
                None => {
                    tracing::warn!("{} has no registered replica holding it", meta.name);
                    report.failed += 1;
                    continue;
                }
            };
            if self.replicas.confirm(&meta.name, &registered, &holders) {
                report.confirmed += 1;
            }

            if holders.len() < registered.len() {
                if self.repair(&meta.name, &holders).await {
                    report.repaired += 1;
                } else {
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Reconcile pass done: {} checked, {} purged, {} confirmed, {} repaired, \
             {} busy, {} failed",
            report.checked,
            report.purged,
            report.confirmed,
            report.repaired,
            report.skipped_busy,
            report.failed
        );
        report
    }

    async fn purge(&self, name: &FullName) {
        for (node_id, handle) in self.nodes.handles() {
            if let Err(e) = handle.sync_delete_file(name).await {
                tracing::warn!("Purge of {} on {} failed: {}", name, node_id, e);
            }
        }
        tracing::debug!("Purged {}", name);
    }

    /// Registered nodes whose copy matches the least-loaded registered
    /// replica that still has one. `None` when no replica has a copy.
    async fn verify(
        &self,
        meta: &FileMeta,
        nodes: &[(String, Arc<dyn NodeHandle>)],
    ) -> Option<BTreeSet<String>> {
        let mut digests: HashMap<&str, FileDigest> = HashMap::new();
        for (node_id, handle) in nodes {
            match handle.stat_file(&meta.name).await {
                Ok(Some(digest)) => {
                    digests.insert(node_id.as_str(), digest);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Stat of {} on {} failed: {}", meta.name, node_id, e),
            }
        }

        let with_copy: Vec<&String> = meta
            .replicas
            .iter()
            .filter(|id| digests.contains_key(id.as_str()))
            .collect();
        let (reference_id, _) = self.nodes.rank_by_load(&with_copy).ok()?.into_iter().next()?;
        let reference = *digests.get(reference_id.as_str())?;

        Some(
            digests
                .into_iter()
                .filter(|(_, digest)| *digest == reference)
                .map(|(id, _)| id.to_string())
                .collect(),
        )
    }

    /// Broadcast from the least-loaded holder, falling back to the next
    async fn repair(&self, name: &FullName, holders: &BTreeSet<String>) -> bool {
        let holders: Vec<&String> = holders.iter().collect();
        let sources = match self.nodes.rank_by_load(&holders) {
            Ok(sources) => sources,
            Err(_) => {
                tracing::warn!("{} has no registered holder to broadcast from", name);
                return false;
            }
        };

        for (node_id, handle) in sources {
            let outcome = {
                let _load = self.nodes.begin_operation(&node_id);
                handle.sync_file(name).await
            };
            match outcome {
                Ok(()) => {
                    tracing::info!("Broadcast {} from {}", name, node_id);
                    return true;
                }
                Err(e) => tracing::warn!("Broadcast of {} from {} failed: {}", name, node_id, e),
            }
        }
        false
    }

    /// Recurring pass; re-arms after each run
    pub fn spawn(self: Arc<Self>, schedule: SyncSchedule) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delay = schedule.next_delay(Local::now().naive_local());
                tracing::info!("Next reconcile pass in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
                self.run_pass().await;
            }
        })
    }

    /// One pass on a detached task
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<ReconcileReport> {
        let reconciler = self.clone();
        tokio::spawn(async move { reconciler.run_pass().await })
    }
}
