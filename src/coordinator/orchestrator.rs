//! Request orchestrator
//!
//! Every coordinator call lands here. File operations are split in two:
//!
//! 1. A synchronous phase that validates the session, authorizes the
//!    department, checks file state and claims the busy gate. Its errors are
//!    the only ones a caller ever sees.
//! 2. A detached task that ranks candidate nodes by load and drives the chosen
//!    node's transfer endpoint, failing over to the next candidate on a fault.
//!    Its failures are logged and otherwise dropped: the effect simply never
//!    materializes.

use crate::common::{Error, FullName, Result, SessionAuthority, MANAGER_ROLE};
use crate::coordinator::gate::{BusyGate, GateMode, GatePermit};
use crate::coordinator::node_client::{HttpNodeClient, NodeHandle};
use crate::coordinator::reconciler::Reconciler;
use crate::coordinator::registry::NodeRegistry;
use crate::coordinator::replicas::ReplicaRegistry;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// File operation with the client's dial-back address where it has one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Create { addr: String, port: u16 },
    Get { addr: String, port: u16 },
    Update { addr: String, port: u16 },
    Delete,
}

impl FileOp {
    fn gate_mode(&self) -> GateMode {
        match self {
            FileOp::Get { .. } => GateMode::Read,
            _ => GateMode::Write,
        }
    }
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            FileOp::Create { .. } => "create",
            FileOp::Get { .. } => "get",
            FileOp::Update { .. } => "update",
            FileOp::Delete => "delete",
        };
        f.write_str(op)
    }
}

pub struct Orchestrator {
    departments: Vec<String>,
    auth: Arc<SessionAuthority>,
    nodes: Arc<NodeRegistry>,
    replicas: Arc<ReplicaRegistry>,
    gate: Arc<BusyGate>,
    reconciler: Arc<Reconciler>,
    node_connect_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        departments: Vec<String>,
        auth: Arc<SessionAuthority>,
        nodes: Arc<NodeRegistry>,
        replicas: Arc<ReplicaRegistry>,
        gate: Arc<BusyGate>,
        reconciler: Arc<Reconciler>,
        node_connect_timeout: Duration,
    ) -> Self {
        Self {
            departments,
            auth,
            nodes,
            replicas,
            gate,
            reconciler,
            node_connect_timeout,
        }
    }

    pub fn nodes(&self) -> &Arc<NodeRegistry> {
        &self.nodes
    }

    pub fn replicas(&self) -> &Arc<ReplicaRegistry> {
        &self.replicas
    }

    pub fn gate(&self) -> &Arc<BusyGate> {
        &self.gate
    }

    // === Session ===

    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        self.auth.login(username, password)
    }

    pub fn is_valid_token(&self, token: &str) -> bool {
        self.auth.is_valid(token)
    }

    pub fn list_departments(&self, token: &str) -> Result<Vec<String>> {
        self.auth.validate(token)?;
        Ok(self.departments.clone())
    }

    /// Names of the department's files with at least one replica
    pub fn list_department_files(&self, token: &str, department: &str) -> Result<Vec<String>> {
        self.auth.validate(token)?;
        Ok(self.replicas.list_department(department))
    }

    // === File operations ===

    pub fn create_file(&self, token: &str, addr: &str, port: u16, name: &FullName) -> Result<bool> {
        let op = FileOp::Create {
            addr: addr.to_string(),
            port,
        };
        self.launch(token, name.clone(), op).map(|_| true)
    }

    pub fn get_file(
        &self,
        token: &str,
        addr: &str,
        port: u16,
        name: &str,
        department: &str,
    ) -> Result<bool> {
        let full_name = FullName::new(department, name)?;
        let op = FileOp::Get {
            addr: addr.to_string(),
            port,
        };
        self.launch(token, full_name, op).map(|_| true)
    }

    pub fn update_file(&self, token: &str, addr: &str, port: u16, name: &FullName) -> Result<bool> {
        let op = FileOp::Update {
            addr: addr.to_string(),
            port,
        };
        self.launch(token, name.clone(), op).map(|_| true)
    }

    pub fn delete_file(&self, token: &str, name: &FullName) -> Result<bool> {
        self.launch(token, name.clone(), FileOp::Delete).map(|_| true)
    }

    /// Synchronous phase. On success the task is already running; the handle
    /// resolves to the node that served the request, if any did.
    pub(crate) fn launch(
        &self,
        token: &str,
        name: FullName,
        op: FileOp,
    ) -> Result<JoinHandle<Option<String>>> {
        let principal = self.auth.validate(token)?;
        if !principal.can_access(name.department()) {
            return Err(Error::Authorization(format!(
                "{} has no access to department {}",
                principal.username,
                name.department()
            )));
        }
        if matches!(op, FileOp::Create { .. }) && !self.is_department(name.department()) {
            return Err(Error::InvalidArgument(format!(
                "unknown department {}",
                name.department()
            )));
        }

        self.check_state(&name, &op)?;
        let permit = self.gate.try_acquire(&name, op.gate_mode())?;
        // another request may have finished between the check and the claim
        self.check_state(&name, &op)?;

        tracing::info!("{} {} accepted for {}", op, name, principal.username);
        let task = FileTask {
            nodes: self.nodes.clone(),
            replicas: self.replicas.clone(),
            name,
            op,
            _permit: permit,
        };
        Ok(tokio::spawn(task.run()))
    }

    fn check_state(&self, name: &FullName, op: &FileOp) -> Result<()> {
        let live = self.replicas.is_live(name);
        match op {
            FileOp::Create { .. } if live => {
                Err(Error::ResourceState(format!("{} already exists", name)))
            }
            FileOp::Create { .. } => Ok(()),
            _ if !live => Err(Error::ResourceState(format!("{} does not exist", name))),
            _ => Ok(()),
        }
    }

    fn is_department(&self, department: &str) -> bool {
        self.departments.iter().any(|d| d == department)
    }

    // === Cluster administration ===

    /// Register a node reachable at `url`
    pub fn add_node(&self, node_id: &str, url: &str) -> Result<()> {
        let handle = HttpNodeClient::new(url, self.node_connect_timeout)?;
        self.add_node_handle(node_id, Arc::new(handle))
    }

    pub fn add_node_handle(&self, node_id: &str, handle: Arc<dyn NodeHandle>) -> Result<()> {
        if node_id.trim().is_empty() {
            return Err(Error::InvalidArgument("empty node id".into()));
        }
        self.nodes.register(node_id, handle);
        Ok(())
    }

    /// Manager-only. Every role must be a known department or the manager role.
    pub fn add_employee(
        &self,
        token: &str,
        username: &str,
        password: &str,
        roles: Vec<String>,
    ) -> Result<bool> {
        let principal = self.auth.validate(token)?;
        principal.require_manager()?;

        if let Some(bad) = roles
            .iter()
            .find(|r| r.as_str() != MANAGER_ROLE && !self.is_department(r))
        {
            return Err(Error::InvalidArgument(format!("unknown role {}", bad)));
        }
        self.auth.add_employee(username, password, roles)?;
        tracing::info!("{} added employee {}", principal.username, username);
        Ok(true)
    }

    /// Manager-only. Starts a reconcile pass on a detached task.
    pub fn trigger_sync(&self, token: &str) -> Result<bool> {
        let principal = self.auth.validate(token)?;
        principal.require_manager()?;
        tracing::info!("Reconcile pass requested by {}", principal.username);
        self.reconciler.trigger();
        Ok(true)
    }
}

/// Asynchronous phase of one file operation. The gate entry is held until
/// the task value drops.
struct FileTask {
    nodes: Arc<NodeRegistry>,
    replicas: Arc<ReplicaRegistry>,
    name: FullName,
    op: FileOp,
    _permit: GatePermit,
}

impl FileTask {
    async fn run(self) -> Option<String> {
        let candidates: Vec<String> = match self.op {
            FileOp::Delete => self
                .replicas
                .get(&self.name)
                .map(|meta| meta.replicas.into_iter().collect())
                .unwrap_or_default(),
            _ => self.nodes.node_ids(),
        };

        let ranked = match self.nodes.rank_by_load(&candidates[..]) {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::warn!("{} {} abandoned: {}", self.op, self.name, e);
                return None;
            }
        };

        for (node_id, handle) in ranked {
            let outcome = {
                let _load = self.nodes.begin_operation(&node_id);
                self.invoke(handle.as_ref()).await
            };
            match outcome {
                Ok(true) => {
                    self.apply(&node_id);
                    tracing::info!("{} {} served by {}", self.op, self.name, node_id);
                    return Some(node_id);
                }
                Ok(false) => {
                    tracing::warn!("{} {} declined by {}", self.op, self.name, node_id);
                }
                Err(e) => {
                    tracing::warn!("{} {} failed on {}: {}", self.op, self.name, node_id, e);
                }
            }
        }

        tracing::warn!(
            "{} {} abandoned: every candidate failed",
            self.op,
            self.name
        );
        None
    }

    async fn invoke(&self, node: &dyn NodeHandle) -> Result<bool> {
        match &self.op {
            FileOp::Create { addr, port } => node.create_file(addr, *port, &self.name).await,
            FileOp::Get { addr, port } => {
                node.get_file(addr, *port, &self.name).await?;
                Ok(true)
            }
            FileOp::Update { addr, port } => node.update_file(addr, *port, &self.name).await,
            FileOp::Delete => node.delete_file(&self.name).await,
        }
    }

    fn apply(&self, node_id: &str) {
        match self.op {
            FileOp::Create { .. } => self.replicas.add_replica(&self.name, node_id),
            // other copies are stale until the reconciler re-broadcasts
            FileOp::Update { .. } => self.replicas.replace(&self.name, node_id),
            FileOp::Delete => {
                self.replicas.tombstone(&self.name);
            }
            FileOp::Get { .. } => {}
        }
    }
}
