//! Reference backend adapters
//!
//! Two cloud adapters (Azure OpenAI, AWS Bedrock) and two local adapters
//! (Ollama, vLLM). Azure, Ollama and vLLM share the OpenAI-compatible core;
//! Bedrock speaks its own JSON protocol.

pub mod azure;
pub mod bedrock;
pub mod ollama;
pub mod openai_compat;
pub mod vllm;

pub use azure::{AzureConfig, AzureOpenAIProvider};
pub use bedrock::{BedrockConfig, BedrockProvider};
pub use ollama::{OllamaConfig, OllamaProvider};
pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use vllm::{VllmConfig, VllmProvider};

use crate::provider::InferenceProvider;
use crate::registry::ProviderRegistry;
use std::sync::Arc;

/// Register factories for the default adapter roster, each configured from
/// the environment. Adapters missing credentials still register — they
/// report `is_available() == false` and the router skips them.
pub async fn register_default_factories(registry: &ProviderRegistry) {
    registry
        .register_factory("azure", || {
            Ok(Arc::new(AzureOpenAIProvider::from_env()) as Arc<dyn InferenceProvider>)
        })
        .await;
    registry
        .register_factory("bedrock", || {
            Ok(Arc::new(BedrockProvider::from_env()) as Arc<dyn InferenceProvider>)
        })
        .await;
    registry
        .register_factory("ollama", || {
            Ok(Arc::new(OllamaProvider::from_env()) as Arc<dyn InferenceProvider>)
        })
        .await;
    registry
        .register_factory("vllm", || {
            Ok(Arc::new(VllmProvider::from_env()) as Arc<dyn InferenceProvider>)
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_roster_registers() {
        let registry = ProviderRegistry::new();
        register_default_factories(&registry).await;
        registry.initialize().await;

        let names = registry.registered_names().await;
        assert_eq!(names, vec!["azure", "bedrock", "ollama", "vllm"]);
    }
}
