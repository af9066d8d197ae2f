//! Explicit provider registry.
//!
//! Providers are registered at composition time into a name-keyed map;
//! model names resolve to a provider through a static prefix table. No
//! dynamic imports, no reflection.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AdapterError;
use crate::AiAdapter;

/// Static model-name prefix → provider table.
///
/// First match wins; extend alongside new providers.
const MODEL_PREFIXES: &[(&str, &str)] = &[
    ("gpt-", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("glm-", "glm"),
];

/// Registration-based factory mapping provider names to adapters.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AiAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its provider name. Later registrations for
    /// the same provider replace earlier ones.
    pub fn register(&mut self, adapter: Arc<dyn AiAdapter>) {
        self.adapters.insert(adapter.provider().to_owned(), adapter);
    }

    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Resolve a model name to its registered adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::ModelNotFound`] when the model maps to no
    /// known provider or the provider has no registered adapter.
    pub fn get(&self, model: &str) -> Result<Arc<dyn AiAdapter>, AdapterError> {
        let provider = provider_for_model(model).ok_or_else(|| AdapterError::ModelNotFound {
            model: model.to_owned(),
        })?;
        self.adapters
            .get(provider)
            .cloned()
            .ok_or_else(|| AdapterError::ModelNotFound {
                model: model.to_owned(),
            })
    }
}

fn provider_for_model(model: &str) -> Option<&'static str> {
    MODEL_PREFIXES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|&(_, provider)| provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    #[test]
    fn model_prefix_resolution() {
        assert_eq!(provider_for_model("gpt-4o-mini"), Some("openai"));
        assert_eq!(provider_for_model("glm-4-flash"), Some("glm"));
        assert_eq!(provider_for_model("claude-3"), None);
    }

    #[test]
    fn get_returns_registered_adapter() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockAdapter::succeeding("openai", "hello")));

        let adapter = registry.get("gpt-4o-mini").expect("adapter");
        assert_eq!(adapter.provider(), "openai");
    }

    #[test]
    fn get_unknown_model_is_model_not_found() {
        let registry = AdapterRegistry::new();
        let err = registry.get("mystery-model").unwrap_err();
        assert!(matches!(err, AdapterError::ModelNotFound { .. }));
    }

    #[test]
    fn get_known_prefix_without_registration_is_model_not_found() {
        let registry = AdapterRegistry::new();
        let err = registry.get("gpt-4o-mini").unwrap_err();
        assert!(matches!(err, AdapterError::ModelNotFound { .. }));
    }
}
