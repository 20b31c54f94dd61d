//! Process-wide tracking of live sandboxes, so that a shutdown can reclaim
//! them.

use dashmap::DashMap;

use super::engine::SandboxEngine;

/// Live sandbox containers, keyed by container id, with their names.
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    live: DashMap<String, String>,
}

impl SandboxRegistry {
    pub fn new() -> SandboxRegistry {
        SandboxRegistry::default()
    }

    pub fn register(&self, id: &str, name: &str) {
        tracing::trace!(%id, %name, "sandbox registered");
        self.live.insert(id.to_owned(), name.to_owned());
    }

    pub fn unregister(&self, id: &str) {
        if self.live.remove(id).is_some() {
            tracing::trace!(%id, "sandbox unregistered");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.live.iter().map(|e| e.key().clone()).collect()
    }

    /// Kill and remove every registered sandbox. Returns how many were
    /// removed.
    ///
    /// Failures are logged and the entry is kept, so a later sweep can retry.
    pub async fn sweep(&self, engine: &dyn SandboxEngine) -> usize {
        let ids = self.ids();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Sweeping live sandboxes");
        }
        let mut removed = 0;
        for id in ids {
            if let Err(e) = engine.kill(&id).await {
                tracing::debug!(%id, "kill before sweep failed: {:#}", e);
            }
            match engine.remove(&id).await {
                Ok(()) => {
                    self.unregister(&id);
                    removed += 1;
                }
                Err(e) => tracing::warn!(%id, "Failed to remove sandbox: {:#}", e),
            }
        }
        removed
    }
}
