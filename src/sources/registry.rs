//! Provider registry - the ordered set of provider factories.
//!
//! Registration order is priority order: targets of earlier providers come
//! first, and the first target overall becomes the default active one.

use std::sync::Arc;

use crate::sources::build_file::BuildFileFactory;
use crate::sources::provider::ProviderFactory;

/// Ordered registry of provider factories.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        ProviderRegistry {
            factories: Vec::new(),
        }
    }

    /// Create a registry with the built-in build-file provider.
    pub fn with_defaults() -> Self {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(BuildFileFactory));
        registry
    }

    /// Register a factory at the lowest priority.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        tracing::debug!("registered provider `{}`", factory.name());
        self.factories.push(factory);
    }

    /// Factories in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ProviderFactory>> + '_ {
        self.factories.iter()
    }

    /// Names in priority order.
    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
