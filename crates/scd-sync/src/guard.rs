//! Per-machine mutual exclusion for reconciliation passes.
//!
//! A single shared set of in-flight machine ids, not a per-instance
//! boolean: the same guard serves every loop and every manual trigger,
//! however many machines are tracked. A tick that fires while its
//! machine's pass is still running is skipped entirely — no queuing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InFlightGuard {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a pass for `machine_id`. Returns `None` when one is
    /// already in flight; the permit releases the slot on drop.
    pub fn try_begin(&self, machine_id: &str) -> Option<PassPermit> {
        let mut set = self.inner.lock().expect("in-flight set poisoned");
        if set.insert(machine_id.to_string()) {
            Some(PassPermit {
                set: Arc::clone(&self.inner),
                machine_id: machine_id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_running(&self, machine_id: &str) -> bool {
        self.inner
            .lock()
            .expect("in-flight set poisoned")
            .contains(machine_id)
    }

    /// Machine ids with a pass currently in flight, sorted.
    pub fn running(&self) -> Vec<String> {
        let set = self.inner.lock().expect("in-flight set poisoned");
        let mut ids: Vec<String> = set.iter().cloned().collect();
        ids.sort();
        ids
    }
}

/// RAII release of one machine's in-flight slot.
pub struct PassPermit {
    set: Arc<Mutex<HashSet<String>>>,
    machine_id: String,
}

impl Drop for PassPermit {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.machine_id);
        }
    }
}
