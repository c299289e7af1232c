//! Health monitor
//!
//! Pings every registered node on a fixed interval. A probe that errors or
//! times out evicts the node at once; a node answering `false` stays.
//! An evicted node also leaves every replica set it shares with another
//! node, so if it comes back it is only trusted again once a reconcile pass
//! confirms its copy.

use crate::coordinator::registry::NodeRegistry;
use crate::coordinator::replicas::ReplicaRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct HealthMonitor {
    nodes: Arc<NodeRegistry>,
    replicas: Arc<ReplicaRegistry>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        nodes: Arc<NodeRegistry>,
        replicas: Arc<ReplicaRegistry>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            nodes,
            replicas,
            interval,
            probe_timeout,
        }
    }

    /// Start the monitor loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        tracing::info!(
            "Health monitor started (interval {}s, probe timeout {}ms)",
            self.interval.as_secs(),
            self.probe_timeout.as_millis()
        );
        loop {
            tokio::time::sleep(self.interval).await;
            self.check_all().await;
        }
    }

    /// Probe every registered node once. Returns the evicted ids.
    pub async fn check_all(&self) -> Vec<String> {
        let mut evicted = Vec::new();

        for (node_id, handle) in self.nodes.handles() {
            match tokio::time::timeout(self.probe_timeout, handle.ping()).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    tracing::warn!("Node {} answered ping with false", node_id);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Node {} failed ping: {}; evicting", node_id, e);
                    if self.evict(&node_id) {
                        evicted.push(node_id);
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        "Node {} did not answer within {}ms; evicting",
                        node_id,
                        self.probe_timeout.as_millis()
                    );
                    if self.evict(&node_id) {
                        evicted.push(node_id);
                    }
                }
            }
        }

        tracing::info!("Live nodes: {:?}", self.nodes.node_ids());
        evicted
    }

    fn evict(&self, node_id: &str) -> bool {
        if !self.nodes.evict(node_id) {
            return false;
        }
        let dropped = self.replicas.forget_node(node_id);
        tracing::info!("Evicted {}; dropped from {} replica sets", node_id, dropped);
        true
    }
}
