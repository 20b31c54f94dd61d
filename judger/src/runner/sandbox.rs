use std::sync::Arc;

use async_trait::async_trait;

use super::{
    engine::{SandboxEngine, SandboxSpec},
    registry::SandboxRegistry,
};
use crate::util::AsyncTeardown;

/// A live sandbox container, owned by exactly one run.
///
/// The container is registered from creation until [`teardown`] finishes.
/// If the handle is dropped without being torn down (e.g. the owning future
/// was cancelled), removal is spawned onto the current runtime instead.
///
/// [`teardown`]: AsyncTeardown::teardown
pub struct Sandbox {
    engine: Arc<dyn SandboxEngine>,
    registry: Arc<SandboxRegistry>,
    id: String,
    name: String,
    torn_down: bool,
}

impl Sandbox {
    pub async fn create(
        engine: Arc<dyn SandboxEngine>,
        registry: Arc<SandboxRegistry>,
        spec: &SandboxSpec,
    ) -> anyhow::Result<Sandbox> {
        let id = engine.create(spec).await?;
        registry.register(&id, &spec.name);
        tracing::debug!(%id, name = %spec.name, image = %spec.image, "sandbox created");
        Ok(Sandbox {
            engine,
            registry,
            id,
            name: spec.name.clone(),
            torn_down: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &dyn SandboxEngine {
        &*self.engine
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("engine", &self.engine.name())
            .field("id", &self.id)
            .field("name", &self.name)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[async_trait]
impl AsyncTeardown for Sandbox {
    async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Err(e) = self.engine.remove(&self.id).await {
            tracing::warn!(id = %self.id, "Failed to remove sandbox: {:#}", e);
        }
        self.registry.unregister(&self.id);
        tracing::debug!(id = %self.id, name = %self.name, "sandbox torn down");
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(%id, "sandbox dropped before teardown, removing in background");
                handle.spawn(async move {
                    if let Err(e) = engine.remove(&id).await {
                        tracing::warn!(%id, "Failed to remove sandbox: {:#}", e);
                    }
                    registry.unregister(&id);
                });
            }
            Err(_) => {
                tracing::warn!(%id, "No runtime to remove dropped sandbox; leaving it to the sweep")
            }
        }
    }
}
