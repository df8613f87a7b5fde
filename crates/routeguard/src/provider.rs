//! Inference provider trait
//!
//! The capability contract every backend adapter implements. The router only
//! ever talks to `dyn InferenceProvider`; which concrete engine sits behind a
//! name is decided at registry-initialization time.

use crate::types::*;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Streaming response type
pub type ChunkStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Where a backend runs, and therefore whether it is metered
///
/// Local backends incur no metered cost: they bypass budget admission and
/// never produce cost-ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Metered cloud service — subject to budget admission control
    Cloud,
    /// On-premise engine — always admissible, never billed
    Local,
}

/// Inference provider trait
///
/// All backends (Azure OpenAI, Bedrock, Ollama, vLLM, ...) implement this
/// trait. Adapters must wrap every transport/SDK failure in
/// [`ProviderError`]; nothing backend-specific crosses this boundary.
///
/// # Example
///
/// ```rust,ignore
/// use routeguard::{InferenceProvider, ProviderKind, CompletionRequest, ProviderResult};
///
/// struct MyEngine {
///     endpoint: String,
/// }
///
/// #[async_trait::async_trait]
/// impl InferenceProvider for MyEngine {
///     fn name(&self) -> &str {
///         "my-engine"
///     }
///
///     fn kind(&self) -> ProviderKind {
///         ProviderKind::Local
///     }
///
///     fn is_available(&self) -> bool {
///         !self.endpoint.is_empty()
///     }
///
///     async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stable identifier used in cost records, logs, and fallback-chain
    /// configuration
    fn name(&self) -> &str;

    /// Cloud (metered) or local (free)
    fn kind(&self) -> ProviderKind;

    /// True iff required configuration (endpoint/credentials) is present.
    /// Must not perform I/O — transient runtime failures do not make a
    /// backend unavailable.
    fn is_available(&self) -> bool;

    /// Non-streaming completion
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse>;

    /// Streaming completion
    ///
    /// The sequence is finite and ends with a chunk carrying a finish reason
    /// (or an error item). Not restartable — a fresh call produces a fresh
    /// sequence.
    async fn stream(&self, _request: CompletionRequest) -> ProviderResult<ChunkStream> {
        Err(ProviderError::Unsupported {
            backend: self.name().to_string(),
            operation: "stream".to_string(),
        })
    }

    /// Batch embedding
    async fn embed(&self, _request: EmbeddingRequest) -> ProviderResult<EmbeddingResponse> {
        Err(ProviderError::Unsupported {
            backend: self.name().to_string(),
            operation: "embed".to_string(),
        })
    }

    /// Best-effort liveness probe: issues a minimal completion and reports
    /// whether any content came back. Never raises.
    async fn health_check(&self) -> bool {
        let request = CompletionRequest::new().system("Say 'ok'").max_tokens(5);
        match self.complete(request).await {
            Ok(response) => !response.content.is_empty(),
            Err(_) => false,
        }
    }

    /// Release cached network clients. Invoked by
    /// [`ProviderRegistry::shutdown`](crate::registry::ProviderRegistry::shutdown).
    async fn close(&self) {}
}
