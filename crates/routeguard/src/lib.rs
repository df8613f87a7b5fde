//! routeguard — multi-backend inference routing with budget admission control
//!
//! Callers never talk to a specific inference backend: they hand a request
//! to the [`Router`], which picks a backend (explicit choice, data
//! classification rule, or the configured default), enforces the monthly
//! spending cap, transparently falls back across backends on failure, and
//! bills every successful cloud call to the cost ledger.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                              Router                                |
//! |  selection -> admission -> traversal -> cost recording             |
//! +----------+----------------+-----------------+---------------------+
//!            |                |                 |
//!            v                v                 v
//!   +-----------------+ +--------------+ +------------------+
//!   | ProviderRegistry| | BudgetBreaker| | CostLedger       |
//!   | (one instance   | | (monthly     | | (bounded,        |
//!   |  per backend)   | |  spend gate) | |  append-only)    |
//!   +--------+--------+ +--------------+ +---------+--------+
//!            |                                     |
//!            v                                     v
//!   +-----------------+                  +------------------+
//!   | dyn Inference   |                  | ModelTierTable   |
//!   | Provider        |                  | (backend, tier)  |
//!   | azure / bedrock |                  |  -> model, price |
//!   | ollama / vllm   |                  +------------------+
//!   +-----------------+
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use routeguard::{InferenceStack, RouteRequest, RoutingConfig, Tier};
//!
//! let stack = InferenceStack::from_config(RoutingConfig::from_env()).await?;
//!
//! let response = stack
//!     .router
//!     .complete(
//!         RouteRequest::new()
//!             .system("You are a financial analyst.")
//!             .user_message("Summarize the attached filing.")
//!             .tier(Tier::CostEffective),
//!     )
//!     .await?;
//!
//! println!("[{}] {}", response.backend, response.content);
//! ```

// types module - messages, responses, tiers, errors
pub mod types;

// provider module - the backend capability contract
pub mod provider;

// registry module - one live instance per backend name
pub mod registry;

// pricing module - (backend, tier) -> model id + per-token prices
pub mod pricing;

// ledger module - append-only cost history
pub mod ledger;

// breaker module - budget-driven admission control
pub mod breaker;

// router module - selection, fallback traversal, cost recording
pub mod router;

// config module - routing configuration
pub mod config;

// bootstrap module - explicit composition point
pub mod bootstrap;

// providers module - reference backend adapters
pub mod providers;

// Re-export core types
pub use types::{
    ChatMessage, CompletionRequest, CompletionResponse, DataClassification, EmbeddingRequest,
    EmbeddingResponse, EmbeddingUsage, FinishReason, ProviderError, ProviderResult, Role,
    RouterError, RouterResult, StreamChunk, Tier, TokenUsage,
};

pub use provider::{ChunkStream, InferenceProvider, ProviderKind};
pub use registry::{ProviderFactory, ProviderRegistry, ProviderStatus};
pub use pricing::{ModelTierTable, TierEntry};
pub use ledger::{Attribution, CostEntry, CostLedger, CostSummary, DEFAULT_LEDGER_CAPACITY};
pub use breaker::{BreakerSnapshot, BreakerState, BudgetBreaker, BudgetBreakerConfig};
pub use router::{RouteRequest, Router, RouterStatus};
pub use config::RoutingConfig;
pub use bootstrap::InferenceStack;

// Re-export reference adapters
pub use providers::{
    AzureConfig, AzureOpenAIProvider, BedrockConfig, BedrockProvider, OllamaConfig,
    OllamaProvider, VllmConfig, VllmProvider,
};
