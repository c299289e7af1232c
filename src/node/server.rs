//! Storage node server

use crate::client::CoordinatorClient;
use crate::common::{NodeConfig, Result};
use crate::node::http::{create_router, NodeState};
use crate::node::replication::{multicast_socket, Broadcaster, Receiver};
use crate::node::storage::Storage;
use crate::node::transfer::TransferEndpoint;
use std::sync::Arc;
use std::time::Duration;

const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct NodeServer {
    config: NodeConfig,
}

impl NodeServer {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let root = self.config.node_root();
        tracing::info!("Starting storage node: {}", self.config.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Advertised as: {}", self.config.advertise_url);
        tracing::info!("  Storage root: {}", root.display());
        tracing::info!("  Replication group: {}", self.config.multicast_target());

        let storage = Arc::new(Storage::open(&root)?);
        let transfer = Arc::new(TransferEndpoint::new(
            storage.clone(),
            self.config.dial_timeout(),
        ));
        let broadcaster = Arc::new(
            Broadcaster::bind(
                self.config.node_id.clone(),
                storage.clone(),
                self.config.multicast_target(),
                self.config.chunk_size,
                self.config.pacing(),
            )
            .await?,
        );

        // Replication receiver
        let socket = multicast_socket(
            self.config.multicast_group,
            self.config.multicast_port,
            self.config.multicast_interface,
        )?;
        let receiver = Receiver::new(self.config.node_id.clone(), storage.clone())
            .with_idle_timeout(self.config.replication_idle());
        let _receiver_handle = tokio::spawn(receiver.run(socket));

        // Create HTTP server
        let http_router = create_router(NodeState {
            node_id: self.config.node_id.clone(),
            storage,
            transfer,
            broadcaster,
        });
        let http_listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        // The listener is bound, so the coordinator can reach us once registered
        let coordinator = CoordinatorClient::new(&self.config.coordinator_url)?;
        let _register_handle = tokio::spawn(register(
            coordinator,
            self.config.node_id.clone(),
            self.config.advertise_url.clone(),
        ));

        tracing::info!("✓ Storage node ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down storage node");
            }
        }

        Ok(())
    }
}

async fn register(coordinator: CoordinatorClient, node_id: String, url: String) {
    for attempt in 1..=REGISTER_ATTEMPTS {
        match coordinator.add_node(&node_id, &url).await {
            Ok(()) => {
                tracing::info!("Registered with coordinator {}", coordinator.base_url());
                return;
            }
            Err(e) => tracing::warn!(
                "Registration attempt {}/{} failed: {}",
                attempt,
                REGISTER_ATTEMPTS,
                e
            ),
        }
        tokio::time::sleep(REGISTER_RETRY_DELAY).await;
    }
    tracing::error!(
        "Could not register with {}; node is running but unreachable to the cluster",
        coordinator.base_url()
    );
}
