//! Provider registry
//!
//! Owns the one live instance per backend name. Factories are registered
//! before `initialize()`; a factory that fails leaves its backend absent
//! from the registry without taking the process down.

use crate::provider::{InferenceProvider, ProviderKind};
use crate::types::{RouterError, RouterResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Provider factory function type
pub type ProviderFactory =
    Box<dyn Fn() -> RouterResult<Arc<dyn InferenceProvider>> + Send + Sync>;

/// Read-only registration status for the admin surface
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub kind: ProviderKind,
    pub available: bool,
}

/// Provider registry
///
/// Process-wide shared state: one instance per backend name, overwrite-ok
/// runtime registration for substitutes, and aggregate availability.
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, ProviderFactory>>,
    providers: RwLock<HashMap<String, Arc<dyn InferenceProvider>>>,
    initialized: AtomicBool,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Register a factory to be run by [`initialize`](Self::initialize)
    pub async fn register_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> RouterResult<Arc<dyn InferenceProvider>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().await;
        factories.insert(name.to_string(), Box::new(factory));
    }

    /// Instantiate every registered factory. Idempotent: the second and
    /// later calls are no-ops. A factory that errors is logged and its
    /// backend is simply absent — not fatal.
    pub async fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("provider registry already initialized");
            return;
        }

        let factories = self.factories.read().await;
        let mut providers = self.providers.write().await;
        for (name, factory) in factories.iter() {
            match factory() {
                Ok(provider) => {
                    debug!(backend = %name, available = provider.is_available(), "registered provider");
                    providers.insert(name.clone(), provider);
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "provider construction failed; backend absent");
                }
            }
        }
    }

    /// Get a registered provider by name
    pub async fn get(&self, name: &str) -> RouterResult<Arc<dyn InferenceProvider>> {
        let providers = self.providers.read().await;
        providers
            .get(name)
            .cloned()
            .ok_or_else(|| RouterError::ProviderUnavailable(name.to_string()))
    }

    /// Insert or overwrite a provider instance (used for substitutes and
    /// test doubles). No error on overwrite.
    pub async fn register(&self, name: &str, provider: Arc<dyn InferenceProvider>) {
        let mut providers = self.providers.write().await;
        providers.insert(name.to_string(), provider);
    }

    /// All providers whose configuration is present
    pub async fn get_available(&self) -> Vec<Arc<dyn InferenceProvider>> {
        let providers = self.providers.read().await;
        providers
            .values()
            .filter(|p| p.is_available())
            .cloned()
            .collect()
    }

    /// Names of available providers
    pub async fn available_names(&self) -> Vec<String> {
        let providers = self.providers.read().await;
        let mut names: Vec<String> = providers
            .iter()
            .filter(|(_, p)| p.is_available())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// All registered names
    pub async fn registered_names(&self) -> Vec<String> {
        let providers = self.providers.read().await;
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe every available backend; unavailable backends report `false`
    /// without being probed.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let providers: Vec<(String, Arc<dyn InferenceProvider>)> = {
            let guard = self.providers.read().await;
            guard
                .iter()
                .map(|(name, p)| (name.clone(), p.clone()))
                .collect()
        };

        let mut results = HashMap::new();
        for (name, provider) in providers {
            let healthy = if provider.is_available() {
                provider.health_check().await
            } else {
                false
            };
            results.insert(name, healthy);
        }
        results
    }

    /// Close every provider's network resources and clear the registry.
    pub async fn shutdown(&self) {
        let mut providers = self.providers.write().await;
        for (name, provider) in providers.drain() {
            debug!(backend = %name, "closing provider");
            provider.close().await;
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    /// Read-only snapshot for the admin surface
    pub async fn snapshot(&self) -> HashMap<String, ProviderStatus> {
        let providers = self.providers.read().await;
        providers
            .iter()
            .map(|(name, p)| {
                (
                    name.clone(),
                    ProviderStatus {
                        name: p.name().to_string(),
                        kind: p.kind(),
                        available: p.is_available(),
                    },
                )
            })
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubProvider {
        name: String,
        available: bool,
    }

    #[async_trait]
    impl InferenceProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Local
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> ProviderResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: "ok".into(),
                backend: self.name.clone(),
                model: "stub".into(),
                usage: TokenUsage::new(1, 1),
                finish_reason: Some(FinishReason::Stop),
                metadata: Default::default(),
            })
        }
    }

    fn stub(name: &str, available: bool) -> Arc<dyn InferenceProvider> {
        Arc::new(StubProvider {
            name: name.to_string(),
            available,
        })
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let registry = ProviderRegistry::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        registry
            .register_factory("stub", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(stub("stub", true))
            })
            .await;

        registry.initialize().await;
        registry.initialize().await;

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(registry.get("stub").await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_factory_leaves_backend_absent() {
        let registry = ProviderRegistry::new();
        registry
            .register_factory("broken", || Err(RouterError::Config("no key".into())))
            .await;
        registry
            .register_factory("good", || Ok(stub("good", true)))
            .await;

        registry.initialize().await;

        assert!(matches!(
            registry.get("broken").await,
            Err(RouterError::ProviderUnavailable(name)) if name == "broken"
        ));
        assert!(registry.get("good").await.is_ok());
    }

    #[tokio::test]
    async fn test_register_overwrites_without_error() {
        let registry = ProviderRegistry::new();
        registry.register("ollama", stub("ollama", false)).await;
        registry.register("ollama", stub("ollama", true)).await;

        let provider = registry.get("ollama").await.unwrap();
        assert!(provider.is_available());
        assert_eq!(registry.registered_names().await, vec!["ollama"]);
    }

    #[tokio::test]
    async fn test_availability_filter() {
        let registry = ProviderRegistry::new();
        registry.register("up", stub("up", true)).await;
        registry.register("down", stub("down", false)).await;

        assert_eq!(registry.available_names().await, vec!["up"]);
        assert_eq!(registry.get_available().await.len(), 1);
    }

    #[tokio::test]
    async fn test_health_check_skips_unavailable() {
        let registry = ProviderRegistry::new();
        registry.register("up", stub("up", true)).await;
        registry.register("down", stub("down", false)).await;

        let results = registry.health_check_all().await;
        assert_eq!(results["up"], true);
        // Reported false without probing
        assert_eq!(results["down"], false);
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let registry = ProviderRegistry::new();
        registry.register("ollama", stub("ollama", true)).await;
        registry.shutdown().await;
        assert!(registry.registered_names().await.is_empty());
    }
}
