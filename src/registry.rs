//! Instance registry.
//!
//! An explicit, process-wide registry object mapping bus names to live
//! instances with get-or-create semantics. Construction happens while the
//! registry lock is held, so two concurrent lookups of the same name can
//! never produce two connection pairs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::Backend;
use crate::bus::EventBus;
use crate::config::BusOptions;
use crate::error::{BusError, Result};

/// Registry of named bus instances over one backend.
///
/// Holds at most one live instance per name; instances remove themselves on
/// [`EventBus::destroy`]. The registry is cheap to clone into whatever
/// components need bus access.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    backend: Arc<dyn Backend>,
    buses: Mutex<HashMap<String, Arc<EventBus>>>,
}

impl RegistryInner {
    pub(crate) async fn remove(&self, name: &str) {
        if self.buses.lock().await.remove(name).is_some() {
            debug!(name = %name, "Removed event bus from registry");
        }
    }
}

impl Registry {
    /// A registry whose instances connect through the given backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                buses: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the instance registered under `name`, creating and connecting
    /// it first if absent.
    ///
    /// Idempotent: repeated calls with the same name return the same
    /// instance. `options` only apply when the call actually creates the
    /// instance.
    ///
    /// # Errors
    /// Propagates [`BusError::Connection`] when the backend is unreachable;
    /// no registry entry is left behind on failure.
    pub async fn get_or_create(&self, name: &str, options: BusOptions) -> Result<Arc<EventBus>> {
        let mut buses = self.inner.buses.lock().await;
        if let Some(existing) = buses.get(name) {
            return Ok(Arc::clone(existing));
        }

        let bus = EventBus::create(
            name,
            &options,
            self.inner.backend.as_ref(),
            Arc::downgrade(&self.inner),
        )
        .await?;
        buses.insert(name.to_string(), Arc::clone(&bus));
        debug!(name = %name, "Registered event bus");
        Ok(bus)
    }

    /// Return the instance registered under `name`; never creates.
    ///
    /// # Errors
    /// Returns [`BusError::NotFound`] when no such instance exists.
    pub async fn get_by_name(&self, name: &str) -> Result<Arc<EventBus>> {
        self.inner
            .buses
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::NotFound {
                name: name.to_string(),
            })
    }

    /// Drop the registry entry for `name`, if any. The instance itself is
    /// untouched; use [`EventBus::destroy`] for a full teardown.
    pub async fn remove(&self, name: &str) {
        self.inner.remove(name).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[tokio::test]
    async fn test_get_by_name_never_creates() {
        let registry = Registry::new(Arc::new(MemoryBackend::new()));

        let result = registry.get_by_name("missing").await;
        assert!(matches!(result, Err(BusError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_remove_is_a_noop_when_absent() {
        let registry = Registry::new(Arc::new(MemoryBackend::new()));
        registry.remove("missing").await;
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = Registry::new(Arc::new(MemoryBackend::new()));

        let first = registry
            .get_or_create("jobs", BusOptions::default())
            .await
            .unwrap();
        let second = registry
            .get_or_create("jobs", BusOptions::default())
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        first.destroy().await;
    }
}
