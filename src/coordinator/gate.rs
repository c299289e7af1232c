//! Busy gate: per-file mutual exclusion
//!
//! A request on a file that already has an operation in flight is rejected
//! immediately, never queued. Reads exclude reads too.

use crate::common::{Error, FullName, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Read,
    Write,
}

#[derive(Default)]
pub struct BusyGate {
    entries: Mutex<HashMap<FullName, GateMode>>,
}

impl BusyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`. The entry is released when the returned permit drops.
    pub fn try_acquire(self: &Arc<Self>, name: &FullName, mode: GateMode) -> Result<GatePermit> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(held) = entries.get(name) {
            return Err(Error::ResourceBusy(format!(
                "{} has a {:?} in progress",
                name, held
            )));
        }
        entries.insert(name.clone(), mode);
        Ok(GatePermit {
            gate: self.clone(),
            name: name.clone(),
            mode,
        })
    }

    pub fn mode_of(&self, name: &FullName) -> Option<GateMode> {
        self.entries.lock().unwrap().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, name: &FullName) {
        self.entries.lock().unwrap().remove(name);
    }
}

/// Proof of a held gate entry; dropping it releases the entry exactly once
pub struct GatePermit {
    gate: Arc<BusyGate>,
    name: FullName,
    mode: GateMode,
}

impl GatePermit {
    pub fn name(&self) -> &FullName {
        &self.name
    }

    pub fn mode(&self) -> GateMode {
        self.mode
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release(&self.name);
    }
}
