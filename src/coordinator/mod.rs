//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Sessions and department authorization
//! - Node registration and load-aware node selection with failover
//! - The replica registry (file name → nodes holding a copy)
//! - Per-file mutual exclusion through the busy gate
//! - Health monitoring and eviction of unreachable nodes
//! - Periodic reconciliation of replicas and tombstones

pub mod api;
pub mod gate;
pub mod health;
pub mod http;
pub mod node_client;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod replicas;
pub mod server;

pub use gate::{BusyGate, GateMode, GatePermit};
pub use health::HealthMonitor;
pub use node_client::{HttpNodeClient, NodeHandle};
pub use orchestrator::{FileOp, Orchestrator};
pub use reconciler::{ReconcileReport, Reconciler, SyncSchedule};
pub use registry::{LoadGuard, NodeRegistry};
pub use replicas::{FileMeta, ReplicaRegistry};
pub use server::Coordinator;
