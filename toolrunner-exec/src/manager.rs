//! Process registry. Owned by the orchestrator as a plain field, never a
//! process-wide singleton, so multiple orchestrators (e.g. in tests) never
//! share state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::process::ProcessHandle;

pub struct ProcessManager {
    next_id: AtomicU64,
    live: Mutex<std::collections::HashMap<u64, Arc<ProcessHandle>>>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register(&self, handle: Arc<ProcessHandle>) {
        debug!(process_id = handle.id, "registering process");
        self.live.lock().insert(handle.id, handle);
    }

    pub fn unregister(&self, id: u64) -> Option<Arc<ProcessHandle>> {
        self.live.lock().remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<Arc<ProcessHandle>> {
        self.live.lock().get(&id).cloned()
    }

    /// Terminate a specific process, running the graceful-then-forceful
    /// escalation protocol, and drop it from the registry regardless of
    /// outcome.
    pub async fn terminate(&self, id: u64) -> anyhow::Result<()> {
        let handle = self.live.lock().remove(&id);
        match handle {
            Some(h) => {
                let outcome = h.terminate().await?;
                debug!(process_id = id, ?outcome, "process terminated");
                Ok(())
            }
            None => {
                warn!(process_id = id, "terminate called for unknown process");
                Ok(())
            }
        }
    }

    /// Terminate every live process. Used on orchestrator shutdown and on
    /// pipeline dependency-failure short-circuit.
    pub async fn cleanup_all(&self) {
        let handles: Vec<Arc<ProcessHandle>> = {
            let mut live = self.live.lock();
            live.drain().map(|(_, v)| v).collect()
        };
        for handle in handles {
            if let Err(err) = handle.terminate().await {
                warn!(process_id = handle.id, %err, "error terminating process during cleanup");
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
