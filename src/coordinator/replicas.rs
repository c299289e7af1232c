//! Replica registry: which nodes are believed to hold a valid copy of each file
//!
//! An entry whose replica set is empty is a tombstone. Tombstones are kept
//! until the name is created again, so every reconcile pass re-issues the
//! purge to nodes that may have missed it.

use crate::common::FullName;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: FullName,
    pub replicas: BTreeSet<String>,
}

impl FileMeta {
    /// Servable iff at least one replica is known
    pub fn is_live(&self) -> bool {
        !self.replicas.is_empty()
    }

    pub fn is_tombstone(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[derive(Default)]
pub struct ReplicaRegistry {
    files: Mutex<BTreeMap<FullName, FileMeta>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &FullName) -> Option<FileMeta> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn is_live(&self, name: &FullName) -> bool {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(FileMeta::is_live)
    }

    /// Record that `node_id` holds a good copy. Creates the entry, or revives
    /// a tombstone.
    pub fn add_replica(&self, name: &FullName, node_id: &str) {
        self.add_replicas(name, [node_id]);
    }

    pub fn add_replicas<I, S>(&self, name: &FullName, node_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files = self.files.lock().unwrap();
        let meta = files.entry(name.clone()).or_insert_with(|| FileMeta {
            name: name.clone(),
            replicas: BTreeSet::new(),
        });
        meta.replicas.extend(node_ids.into_iter().map(Into::into));
    }

    /// Make `node_id` the only holder. Used after an update, when every other
    /// copy is stale until the reconciler re-broadcasts it.
    pub fn replace(&self, name: &FullName, node_id: &str) {
        let mut files = self.files.lock().unwrap();
        let meta = files.entry(name.clone()).or_insert_with(|| FileMeta {
            name: name.clone(),
            replicas: BTreeSet::new(),
        });
        meta.replicas = BTreeSet::from([node_id.to_string()]);
    }

    /// Rewrite a live entry from a verified view: registered members not in
    /// `holders` are dropped, `holders` are added, unregistered members are
    /// left alone. Never empties the set and never touches a tombstone.
    /// Returns true if the set changed.
    pub fn confirm(
        &self,
        name: &FullName,
        registered: &[String],
        holders: &BTreeSet<String>,
    ) -> bool {
        let mut files = self.files.lock().unwrap();
        let Some(meta) = files.get_mut(name) else {
            return false;
        };
        if meta.is_tombstone() {
            return false;
        }
        let confirmed: BTreeSet<String> = meta
            .replicas
            .iter()
            .filter(|id| !registered.contains(id))
            .chain(holders.iter())
            .cloned()
            .collect();
        if confirmed.is_empty() || confirmed == meta.replicas {
            return false;
        }
        meta.replicas = confirmed;
        true
    }

    /// Drop an evicted node from every replica set it shares with another
    /// node. A file whose only holder is `node_id` keeps it, so the file is
    /// not tombstoned by an outage. Returns the number of sets changed.
    pub fn forget_node(&self, node_id: &str) -> usize {
        let mut files = self.files.lock().unwrap();
        let mut changed = 0;
        for meta in files.values_mut() {
            if meta.replicas.len() > 1 && meta.replicas.remove(node_id) {
                changed += 1;
            }
        }
        changed
    }

    /// Clear the replica set, leaving a tombstone. Returns false if the name
    /// was never known.
    pub fn tombstone(&self, name: &FullName) -> bool {
        match self.files.lock().unwrap().get_mut(name) {
            Some(meta) => {
                meta.replicas.clear();
                true
            }
            None => false,
        }
    }

    /// Live file names of one department, sorted
    pub fn list_department(&self, department: &str) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.is_live() && m.name.department() == department)
            .map(|m| m.name.name().to_string())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<FileMeta> {
        self.files.lock().unwrap().values().cloned().collect()
    }

    /// `(live, tombstoned)` entry counts
    pub fn counts(&self) -> (usize, usize) {
        let files = self.files.lock().unwrap();
        let live = files.values().filter(|m| m.is_live()).count();
        (live, files.len() - live)
    }
}
