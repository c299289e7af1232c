//! Node registry and load tracker
//!
//! Handles, in-flight operation counts and liveness live in one table behind
//! one lock, so eviction never leaves a node half-removed.

use crate::common::{Error, Result};
use crate::coordinator::api::NodeStatus;
use crate::coordinator::node_client::NodeHandle;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Tables {
    /// Registration order, used to break load ties
    order: Vec<String>,
    handles: HashMap<String, Arc<dyn NodeHandle>>,
    loads: HashMap<String, u64>,
    alive: HashSet<String>,
}

#[derive(Default)]
pub struct NodeRegistry {
    tables: Mutex<Tables>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node. A fresh node starts at load 0; a node that
    /// re-registers keeps its position and its in-flight count.
    pub fn register(&self, node_id: &str, handle: Arc<dyn NodeHandle>) {
        let mut tables = self.tables.lock().unwrap();
        if tables.handles.insert(node_id.to_string(), handle).is_none() {
            tables.order.push(node_id.to_string());
            tables.loads.insert(node_id.to_string(), 0);
            tracing::info!("Registered node {}", node_id);
        } else {
            tracing::info!("Node {} re-registered", node_id);
        }
        tables.alive.insert(node_id.to_string());
    }

    /// Registered candidates sorted by ascending load, ties in registration
    /// order. Ids that are not registered are dropped.
    pub fn rank_by_load<S: AsRef<str>>(
        &self,
        candidates: &[S],
    ) -> Result<Vec<(String, Arc<dyn NodeHandle>)>> {
        let wanted: HashSet<&str> = candidates.iter().map(|c| c.as_ref()).collect();
        let tables = self.tables.lock().unwrap();

        let mut ranked: Vec<(u64, String, Arc<dyn NodeHandle>)> = tables
            .order
            .iter()
            .filter(|id| wanted.contains(id.as_str()))
            .filter_map(|id| {
                let handle = tables.handles.get(id)?;
                let load = tables.loads.get(id).copied().unwrap_or(0);
                Some((load, id.clone(), handle.clone()))
            })
            .collect();
        drop(tables);

        if ranked.is_empty() {
            return Err(Error::ServiceUnavailable);
        }
        // stable: equal loads keep registration order
        ranked.sort_by_key(|(load, _, _)| *load);
        Ok(ranked.into_iter().map(|(_, id, h)| (id, h)).collect())
    }

    /// Saturates at zero; unknown ids are ignored
    pub fn adjust_load(&self, node_id: &str, delta: i64) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(load) = tables.loads.get_mut(node_id) {
            *load = if delta >= 0 {
                load.saturating_add(delta as u64)
            } else {
                load.saturating_sub(delta.unsigned_abs())
            };
        }
    }

    /// Count one in-flight operation against `node_id` until the guard drops
    pub fn begin_operation(&self, node_id: &str) -> LoadGuard<'_> {
        self.adjust_load(node_id, 1);
        LoadGuard {
            registry: self,
            node_id: node_id.to_string(),
        }
    }

    /// Remove a node from every table in one step. Returns false if it was
    /// not registered.
    pub fn evict(&self, node_id: &str) -> bool {
        let mut tables = self.tables.lock().unwrap();
        let removed = tables.handles.remove(node_id).is_some();
        tables.loads.remove(node_id);
        tables.alive.remove(node_id);
        tables.order.retain(|id| id != node_id);
        removed
    }

    pub fn handle(&self, node_id: &str) -> Option<Arc<dyn NodeHandle>> {
        self.tables.lock().unwrap().handles.get(node_id).cloned()
    }

    /// Registered ids in registration order
    pub fn node_ids(&self) -> Vec<String> {
        self.tables.lock().unwrap().order.clone()
    }

    /// Registered ids with their handles, in registration order
    pub fn handles(&self) -> Vec<(String, Arc<dyn NodeHandle>)> {
        let tables = self.tables.lock().unwrap();
        tables
            .order
            .iter()
            .filter_map(|id| tables.handles.get(id).map(|h| (id.clone(), h.clone())))
            .collect()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.tables.lock().unwrap().handles.contains_key(node_id)
    }

    pub fn load_of(&self, node_id: &str) -> Option<u64> {
        self.tables.lock().unwrap().loads.get(node_id).copied()
    }

    pub fn is_alive(&self, node_id: &str) -> bool {
        self.tables.lock().unwrap().alive.contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.tables.lock().unwrap().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<NodeStatus> {
        let tables = self.tables.lock().unwrap();
        tables
            .order
            .iter()
            .map(|id| NodeStatus {
                node_id: id.clone(),
                load: tables.loads.get(id).copied().unwrap_or(0),
                alive: tables.alive.contains(id),
            })
            .collect()
    }
}

/// Decrements the node's load when dropped
pub struct LoadGuard<'a> {
    registry: &'a NodeRegistry,
    node_id: String,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.registry.adjust_load(&self.node_id, -1);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::FullName;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    /// Handle that answers pings and nothing else
    pub(crate) struct IdleNode;

    impl NodeHandle for IdleNode {
        fn create_file<'a>(
            &'a self,
            _: &'a str,
            _: u16,
            _: &'a FullName,
        ) -> BoxFuture<'a, Result<bool>> {
            async { Ok(false) }.boxed()
        }
        fn get_file<'a>(
            &'a self,
            _: &'a str,
            _: u16,
            _: &'a FullName,
        ) -> BoxFuture<'a, Result<()>> {
            async { Ok(()) }.boxed()
        }
        fn update_file<'a>(
            &'a self,
            _: &'a str,
            _: u16,
            _: &'a FullName,
        ) -> BoxFuture<'a, Result<bool>> {
            async { Ok(false) }.boxed()
        }
        fn delete_file<'a>(&'a self, _: &'a FullName) -> BoxFuture<'a, Result<bool>> {
            async { Ok(false) }.boxed()
        }
        fn stat_file<'a>(
            &'a self,
            _: &'a FullName,
        ) -> BoxFuture<'a, Result<Option<crate::node::FileDigest>>> {
            async { Ok(None) }.boxed()
        }
        fn sync_file<'a>(&'a self, _: &'a FullName) -> BoxFuture<'a, Result<()>> {
            async { Ok(()) }.boxed()
        }
        fn sync_delete_file<'a>(&'a self, _: &'a FullName) -> BoxFuture<'a, Result<()>> {
            async { Ok(()) }.boxed()
        }
        fn ping(&self) -> BoxFuture<'_, Result<bool>> {
            async { Ok(true) }.boxed()
        }
        fn node_id(&self) -> BoxFuture<'_, Result<String>> {
            async { Ok("idle".to_string()) }.boxed()
        }
    }

    fn registry(ids: &[&str]) -> NodeRegistry {
        let reg = NodeRegistry::new();
        for id in ids {
            reg.register(id, Arc::new(IdleNode));
        }
        reg
    }

    fn ids(ranked: Vec<(String, Arc<dyn NodeHandle>)>) -> Vec<String> {
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn test_rank_by_load_orders_and_filters() {
        let reg = registry(&["a", "b", "c"]);
        reg.adjust_load("a", 3);
        reg.adjust_load("b", 1);

        let ranked = ids(reg.rank_by_load(&["a", "b", "c", "ghost"]).unwrap());
        assert_eq!(ranked, vec!["c", "b", "a"]);

        let ranked = ids(reg.rank_by_load(&["a", "b"]).unwrap());
        assert_eq!(ranked, vec!["b", "a"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let reg = registry(&["z", "y", "x"]);
        assert_eq!(ids(reg.rank_by_load(&["x", "y", "z"]).unwrap()), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_rank_empty_is_unavailable() {
        let reg = registry(&["a"]);
        assert!(matches!(reg.rank_by_load(&["b"]), Err(Error::ServiceUnavailable)));
        let none: [&str; 0] = [];
        assert!(matches!(reg.rank_by_load(&none), Err(Error::ServiceUnavailable)));
    }

    #[test]
    fn test_load_never_negative() {
        let reg = registry(&["a"]);
        reg.adjust_load("a", -5);
        assert_eq!(reg.load_of("a"), Some(0));
        reg.adjust_load("ghost", 1);
        assert_eq!(reg.load_of("ghost"), None);
    }

    #[test]
    fn test_load_guard_restores_count() {
        let reg = registry(&["a"]);
        {
            let _first = reg.begin_operation("a");
            let _second = reg.begin_operation("a");
            assert_eq!(reg.load_of("a"), Some(2));
        }
        assert_eq!(reg.load_of("a"), Some(0));
    }

    #[test]
    fn test_evict_removes_everything() {
        let reg = registry(&["a", "b"]);
        reg.adjust_load("a", 4);
        assert!(reg.evict("a"));

        assert!(!reg.contains("a"));
        assert!(!reg.is_alive("a"));
        assert_eq!(reg.load_of("a"), None);
        assert_eq!(reg.node_ids(), vec!["b"]);
        assert!(!reg.evict("a"));

        // in-flight guard finishing after eviction must not resurrect the node
        let guard = reg.begin_operation("b");
        reg.evict("b");
        drop(guard);
        assert_eq!(reg.load_of("b"), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_reregister_keeps_load() {
        let reg = registry(&["a", "b"]);
        reg.adjust_load("a", 2);
        reg.register("a", Arc::new(IdleNode));
        assert_eq!(reg.load_of("a"), Some(2));
        assert_eq!(reg.node_ids(), vec!["a", "b"]);
        assert_eq!(reg.len(), 2);
    }
}
