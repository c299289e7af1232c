//! Coordinator server

use crate::common::{CoordinatorConfig, Result, SessionAuthority, MANAGER_ROLE};
use crate::coordinator::gate::BusyGate;
use crate::coordinator::health::HealthMonitor;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::orchestrator::Orchestrator;
use crate::coordinator::reconciler::{Reconciler, SyncSchedule};
use crate::coordinator::registry::NodeRegistry;
use crate::coordinator::replicas::ReplicaRegistry;
use std::sync::Arc;

pub struct Coordinator {
    config: CoordinatorConfig,
    nodes: Arc<NodeRegistry>,
    reconciler: Arc<Reconciler>,
    orchestrator: Arc<Orchestrator>,
}

impl Coordinator {
    /// Build every registry and seed the manager account
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let auth = Arc::new(SessionAuthority::new(config.token_ttl()));
        auth.add_employee(
            &config.manager_user,
            &config.manager_password,
            vec![MANAGER_ROLE.to_string()],
        )?;

        let nodes = Arc::new(NodeRegistry::new());
        let replicas = Arc::new(ReplicaRegistry::new());
        let gate = Arc::new(BusyGate::new());
        let reconciler = Arc::new(Reconciler::new(
            nodes.clone(),
            replicas.clone(),
            gate.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.departments.clone(),
            auth,
            nodes.clone(),
            replicas,
            gate,
            reconciler.clone(),
            config.probe_timeout(),
        ));

        Ok(Self {
            config,
            nodes,
            reconciler,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    pub async fn serve(self) -> Result<()> {
        let schedule = SyncSchedule::from_config(
            self.config.sync_at.as_deref(),
            std::time::Duration::from_secs(self.config.sync_interval_secs),
        )?;

        tracing::info!("Starting coordinator");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Departments: {}", self.config.departments.join(", "));
        tracing::info!("  Token TTL: {}s", self.config.token_ttl_secs);
        tracing::info!("  Health interval: {}s", self.config.health_interval_secs);
        tracing::info!("  Reconcile schedule: {:?}", schedule);

        // Background jobs
        let monitor = HealthMonitor::new(
            self.nodes.clone(),
            self.orchestrator.replicas().clone(),
            self.config.health_interval(),
            self.config.probe_timeout(),
        );
        let _health_handle = monitor.spawn();
        let _reconcile_handle = self.reconciler.clone().spawn(schedule);

        // Create HTTP server
        let http_router = create_router(CoordState {
            orchestrator: self.orchestrator.clone(),
        });
        let http_listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = axum::serve(http_listener, http_router);

        tracing::info!("✓ Coordinator ready");

        tokio::select! {
            res = http_server => {
                if let Err(e) = res {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down coordinator");
            }
        }

        Ok(())
    }
}
