//! Inference router
//!
//! The single entry point collaborators call. One logical request resolves
//! to an ordered candidate chain (data residency > explicit backend choice >
//! configured fallback order), which is traversed strictly in sequence:
//! unregistered/unavailable candidates are skipped, cloud candidates pass
//! through budget admission, provider failures fall through to the next
//! candidate, and the first success is billed and returned. Candidates are
//! never attempted in parallel — speculative fan-out would double-bill.

use crate::breaker::BudgetBreaker;
use crate::config::RoutingConfig;
use crate::ledger::{Attribution, CostLedger};
use crate::pricing::ModelTierTable;
use crate::provider::{ChunkStream, InferenceProvider, ProviderKind};
use crate::registry::{ProviderRegistry, ProviderStatus};
use crate::types::*;
use futures::Stream;
use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

// ============================================================================
// Route request
// ============================================================================

/// One routed completion request
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub messages: Vec<ChatMessage>,
    /// Explicit model override; `None` resolves via the tier table
    pub model: Option<String>,
    /// Explicit backend choice; overridden by data residency
    pub backend: Option<String>,
    pub tier: Tier,
    pub classification: Option<DataClassification>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub user: Option<String>,
    pub request_id: Option<String>,
    /// Backend-specific passthrough options
    pub extra: HashMap<String, serde_json::Value>,
}

impl RouteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn classification(mut self, classification: DataClassification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Read-only router introspection for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub default_backend: String,
    pub fallback_chain: Vec<String>,
    pub breaker: crate::breaker::BreakerSnapshot,
    pub model_tiers: HashMap<String, HashMap<Tier, String>>,
    pub providers: HashMap<String, ProviderStatus>,
}

// ============================================================================
// Router
// ============================================================================

/// Inference router
///
/// All collaborators are injected at construction — the router owns no
/// global state (see the composition point in [`crate::bootstrap`]).
pub struct Router {
    config: RoutingConfig,
    registry: Arc<ProviderRegistry>,
    tiers: Arc<ModelTierTable>,
    ledger: Arc<CostLedger>,
    breaker: Arc<BudgetBreaker>,
}

impl Router {
    pub fn new(
        config: RoutingConfig,
        registry: Arc<ProviderRegistry>,
        tiers: Arc<ModelTierTable>,
        ledger: Arc<CostLedger>,
        breaker: Arc<BudgetBreaker>,
    ) -> Self {
        Self {
            config,
            registry,
            tiers,
            ledger,
            breaker,
        }
    }

    /// Configured fallback order with the default backend at the head,
    /// duplicates removed.
    fn ordered_defaults(&self) -> Vec<String> {
        let mut chain = Vec::with_capacity(self.config.fallback_chain.len() + 1);
        for name in
            std::iter::once(&self.config.default_backend).chain(self.config.fallback_chain.iter())
        {
            if !chain.contains(name) {
                chain.push(name.clone());
            }
        }
        chain
    }

    /// Resolve the candidate chain for one request, in priority order:
    ///
    /// 1. `internal`/`confidential` classification forces a local-only
    ///    chain — data residency overrides explicit backend and breaker
    ///    state.
    /// 2. An explicit backend becomes the chain head, followed by the
    ///    remaining fallback order.
    /// 3. Otherwise the configured fallback order, with any hybrid-rule
    ///    preference promoted to the head.
    async fn resolve_chain(
        &self,
        explicit: Option<&str>,
        classification: Option<DataClassification>,
    ) -> Vec<String> {
        let base = self.ordered_defaults();

        if let Some(class) = classification {
            if class.requires_local() {
                if let Some(backend) = explicit {
                    debug!(
                        %class,
                        backend,
                        "data residency overrides explicit backend choice"
                    );
                }
                let mut local = Vec::new();
                for name in &base {
                    if let Ok(provider) = self.registry.get(name).await {
                        if provider.kind() == ProviderKind::Local {
                            local.push(name.clone());
                        }
                    }
                }
                if let Some(preferred) = self.config.hybrid_rules.get(&class) {
                    promote_if_present(&mut local, preferred);
                }
                return local;
            }
        }

        let mut chain = base;
        if let Some(backend) = explicit {
            promote(&mut chain, backend);
        } else if let Some(class) = classification {
            if let Some(preferred) = self.config.hybrid_rules.get(&class) {
                promote(&mut chain, preferred);
            }
        }
        chain
    }

    /// Build the per-candidate provider request; the model resolves from the
    /// caller override, else the candidate's tier entry, else the adapter
    /// default.
    fn provider_request(&self, req: &RouteRequest, backend: &str) -> CompletionRequest {
        let model = req.model.clone().or_else(|| {
            self.tiers
                .resolve(backend, req.tier)
                .ok()
                .map(|entry| entry.model.clone())
        });
        CompletionRequest {
            messages: req.messages.clone(),
            model,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            extra: req.extra.clone(),
        }
    }

    fn attribution(&self, req: &RouteRequest, operation: &str) -> Attribution {
        Attribution {
            user: req.user.clone(),
            request_id: Some(
                req.request_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            ),
            operation: operation.to_string(),
        }
    }

    /// Route a completion across the candidate chain.
    ///
    /// Exactly one cost entry is recorded per successful cloud call — a
    /// candidate that failed before it is never billed. Local candidates
    /// are free and unmetered.
    pub async fn complete(&self, req: RouteRequest) -> RouterResult<CompletionResponse> {
        let chain = self
            .resolve_chain(req.backend.as_deref(), req.classification)
            .await;
        debug!(?chain, tier = %req.tier, "resolved candidate chain");

        let mut budget_rejection: Option<RouterError> = None;
        let mut invoked_failure = false;

        for name in &chain {
            let provider = match self.registry.get(name).await {
                Ok(p) => p,
                Err(_) => {
                    debug!(backend = %name, "not registered; skipping");
                    continue;
                }
            };
            if !provider.is_available() {
                debug!(backend = %name, "not available; skipping");
                continue;
            }
            if provider.kind() == ProviderKind::Cloud {
                if let Err(e) = self.breaker.admit(req.tier) {
                    debug!(backend = %name, error = %e, "budget admission rejected; skipping candidate");
                    budget_rejection = Some(e);
                    continue;
                }
            }

            match provider.complete(self.provider_request(&req, name)).await {
                Ok(response) => {
                    if provider.kind() == ProviderKind::Cloud {
                        let entry = self.ledger.record(
                            name,
                            &response.model,
                            req.tier,
                            response.usage.prompt_tokens,
                            response.usage.completion_tokens,
                            self.attribution(&req, "completion"),
                        )?;
                        self.breaker.record_spend(entry.cost, name, &response.model);
                    }
                    if invoked_failure {
                        info!(backend = %name, "request served after fallback");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "provider call failed; trying next candidate");
                    invoked_failure = true;
                }
            }
        }

        // Every cloud candidate was budget-rejected and nothing else was
        // actually invoked: the budget error is the actionable one.
        if !invoked_failure {
            if let Some(rejection) = budget_rejection {
                return Err(rejection);
            }
        }
        Err(RouterError::AllProvidersFailed { attempted: chain })
    }

    /// Streaming analogue of [`complete`](Self::complete).
    ///
    /// Commits to the first candidate whose stream opens without error; a
    /// mid-stream provider error is terminal for the call — partial output
    /// already delivered cannot be unsent, so there is no re-route after
    /// the first chunk. Cost for cloud streams is recorded exactly once,
    /// from a character-based approximation, when the stream finishes or is
    /// dropped.
    pub async fn stream(&self, req: RouteRequest) -> RouterResult<ChunkStream> {
        let chain = self
            .resolve_chain(req.backend.as_deref(), req.classification)
            .await;
        debug!(?chain, tier = %req.tier, "resolved candidate chain (streaming)");

        let mut budget_rejection: Option<RouterError> = None;
        let mut invoked_failure = false;

        for name in &chain {
            let provider = match self.registry.get(name).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !provider.is_available() {
                continue;
            }
            if provider.kind() == ProviderKind::Cloud {
                if let Err(e) = self.breaker.admit(req.tier) {
                    debug!(backend = %name, error = %e, "budget admission rejected; skipping candidate");
                    budget_rejection = Some(e);
                    continue;
                }
            }

            let preq = self.provider_request(&req, name);
            let prompt_chars = preq.prompt_chars();
            let resolved_model = preq.model.clone().unwrap_or_default();
            match provider.stream(preq).await {
                Ok(inner) => {
                    if invoked_failure {
                        info!(backend = %name, "stream served after fallback");
                    }
                    if provider.kind() == ProviderKind::Cloud {
                        return Ok(Box::pin(MeteredStream {
                            inner,
                            ledger: self.ledger.clone(),
                            breaker: self.breaker.clone(),
                            backend: name.clone(),
                            fallback_model: resolved_model,
                            seen_model: None,
                            tier: req.tier,
                            attribution: Some(self.attribution(&req, "stream")),
                            prompt_chars,
                            completion_chars: 0,
                        }));
                    }
                    return Ok(inner);
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "stream open failed; trying next candidate");
                    invoked_failure = true;
                }
            }
        }

        if !invoked_failure {
            if let Some(rejection) = budget_rejection {
                return Err(rejection);
            }
        }
        Err(RouterError::AllProvidersFailed { attempted: chain })
    }

    /// Route a batch embedding request with the same selection/traversal
    /// rules; embeddings are admitted and billed exactly like completions.
    pub async fn embed(
        &self,
        request: EmbeddingRequest,
        opts: RouteRequest,
    ) -> RouterResult<EmbeddingResponse> {
        let chain = self
            .resolve_chain(opts.backend.as_deref(), opts.classification)
            .await;
        debug!(?chain, "resolved candidate chain (embeddings)");

        let mut budget_rejection: Option<RouterError> = None;
        let mut invoked_failure = false;

        for name in &chain {
            let provider = match self.registry.get(name).await {
                Ok(p) => p,
                Err(_) => continue,
            };
            if !provider.is_available() {
                continue;
            }
            if provider.kind() == ProviderKind::Cloud {
                if let Err(e) = self.breaker.admit(opts.tier) {
                    budget_rejection = Some(e);
                    continue;
                }
            }

            match provider.embed(request.clone()).await {
                Ok(response) => {
                    if provider.kind() == ProviderKind::Cloud {
                        let entry = self.ledger.record(
                            name,
                            &response.model,
                            opts.tier,
                            response.usage.prompt_tokens,
                            0,
                            self.attribution(&opts, "embedding"),
                        )?;
                        self.breaker.record_spend(entry.cost, name, &response.model);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "embedding call failed; trying next candidate");
                    invoked_failure = true;
                }
            }
        }

        if !invoked_failure {
            if let Some(rejection) = budget_rejection {
                return Err(rejection);
            }
        }
        Err(RouterError::AllProvidersFailed { attempted: chain })
    }

    /// Read-only introspection for the admin surface; never mutates core
    /// state.
    pub async fn status(&self) -> RouterStatus {
        RouterStatus {
            default_backend: self.config.default_backend.clone(),
            fallback_chain: self.ordered_defaults(),
            breaker: self.breaker.snapshot(),
            model_tiers: self.tiers.snapshot(),
            providers: self.registry.snapshot().await,
        }
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    pub fn breaker(&self) -> &Arc<BudgetBreaker> {
        &self.breaker
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}

/// Move `name` to the head of the chain, inserting it if absent.
fn promote(chain: &mut Vec<String>, name: &str) {
    chain.retain(|n| n != name);
    chain.insert(0, name.to_string());
}

/// Move `name` to the head of the chain only if it is already a member.
fn promote_if_present(chain: &mut Vec<String>, name: &str) {
    if let Some(pos) = chain.iter().position(|n| n == name) {
        let entry = chain.remove(pos);
        chain.insert(0, entry);
    }
}

// ============================================================================
// Stream metering
// ============================================================================

/// Wraps a cloud backend's chunk stream and records cost exactly once when
/// the stream finishes (finish-reason chunk, natural end, or drop on
/// cancellation). Token counts are approximated from character counts since
/// chunks carry no usage.
struct MeteredStream {
    inner: ChunkStream,
    ledger: Arc<CostLedger>,
    breaker: Arc<BudgetBreaker>,
    backend: String,
    fallback_model: String,
    seen_model: Option<String>,
    tier: Tier,
    /// `Some` until the one-shot cost record fires
    attribution: Option<Attribution>,
    prompt_chars: usize,
    completion_chars: usize,
}

impl MeteredStream {
    fn finalize(&mut self) {
        let Some(attribution) = self.attribution.take() else {
            return;
        };
        let usage = TokenUsage::approximate(self.prompt_chars, self.completion_chars);
        let model = self
            .seen_model
            .clone()
            .unwrap_or_else(|| self.fallback_model.clone());
        match self.ledger.record(
            &self.backend,
            &model,
            self.tier,
            usage.prompt_tokens,
            usage.completion_tokens,
            attribution,
        ) {
            Ok(entry) => self.breaker.record_spend(entry.cost, &self.backend, &model),
            Err(e) => warn!(backend = %self.backend, error = %e, "stream cost record failed"),
        }
    }
}

impl Stream for MeteredStream {
    type Item = ProviderResult<StreamChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.completion_chars += chunk.content.len();
                if this.seen_model.is_none() && !chunk.model.is_empty() {
                    this.seen_model = Some(chunk.model.clone());
                }
                if chunk.finish_reason.is_some() {
                    this.finalize();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Partial output was still produced (and charged) upstream.
                this.finalize();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        // Cancellation mid-stream: bill what was already delivered.
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::TierEntry;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable provider: fails its first `failures` calls, then succeeds.
    struct ScriptedProvider {
        name: String,
        kind: ProviderKind,
        available: bool,
        failures: usize,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(name: &str, kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                kind,
                available: true,
                failures: 0,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &str, kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                kind,
                available: true,
                failures: usize::MAX,
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable(name: &str, kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                kind,
                available: false,
                failures: 0,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> ProviderResult<CompletionResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ProviderError::Network("connection refused".into()));
            }
            Ok(CompletionResponse {
                content: format!("answer from {}", self.name),
                backend: self.name.clone(),
                model: request.model.unwrap_or_else(|| "default-model".into()),
                usage: TokenUsage::new(1000, 500),
                finish_reason: Some(FinishReason::Stop),
                metadata: Default::default(),
            })
        }

        async fn stream(&self, request: CompletionRequest) -> ProviderResult<ChunkStream> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ProviderError::Network("connection refused".into()));
            }
            let backend = self.name.clone();
            let model = request.model.unwrap_or_else(|| "default-model".into());
            let chunks = vec![
                Ok(StreamChunk {
                    content: "hello ".into(),
                    backend: backend.clone(),
                    model: model.clone(),
                    finish_reason: None,
                }),
                Ok(StreamChunk {
                    content: "world".into(),
                    backend,
                    model,
                    finish_reason: Some(FinishReason::Stop),
                }),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct Fixture {
        router: Router,
        registry: Arc<ProviderRegistry>,
        ledger: Arc<CostLedger>,
        breaker: Arc<BudgetBreaker>,
    }

    async fn fixture(config: RoutingConfig) -> Fixture {
        let mut tiers = ModelTierTable::new();
        tiers.insert("azure", Tier::Sota, TierEntry::new("gpt-4o", 0.0025, 0.01));
        tiers.insert(
            "azure",
            Tier::CostEffective,
            TierEntry::new("gpt-4o-mini", 0.00015, 0.0006),
        );
        tiers.insert(
            "bedrock",
            Tier::CostEffective,
            TierEntry::new("claude-haiku", 0.00025, 0.00125),
        );
        tiers.insert("ollama", Tier::CostEffective, TierEntry::free("llama3.1:8b"));
        let tiers = Arc::new(tiers);

        let registry = Arc::new(ProviderRegistry::new());
        let ledger = Arc::new(CostLedger::new(tiers.clone()));
        let breaker = Arc::new(BudgetBreaker::with_limit(config.monthly_budget_usd));
        let router = Router::new(
            config,
            registry.clone(),
            tiers.clone(),
            ledger.clone(),
            breaker.clone(),
        );
        Fixture {
            router,
            registry,
            ledger,
            breaker,
        }
    }

    fn chain_config(chain: &[&str]) -> RoutingConfig {
        RoutingConfig::new()
            .with_default_backend(chain[0])
            .with_fallback_chain(chain.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_explicit_backend_becomes_chain_head() {
        let f = fixture(chain_config(&["azure", "bedrock", "ollama"])).await;
        f.registry
            .register("azure", ScriptedProvider::ok("azure", ProviderKind::Cloud))
            .await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        let response = f
            .router
            .complete(RouteRequest::new().user_message("hi").backend("bedrock"))
            .await
            .unwrap();
        assert_eq!(response.backend, "bedrock");
    }

    #[tokio::test]
    async fn test_unavailable_candidate_is_skipped_not_failed() {
        let f = fixture(chain_config(&["azure", "ollama"])).await;
        let azure = ScriptedProvider::unavailable("azure", ProviderKind::Cloud);
        f.registry.register("azure", azure.clone()).await;
        f.registry
            .register("ollama", ScriptedProvider::ok("ollama", ProviderKind::Local))
            .await;

        let response = f
            .router
            .complete(RouteRequest::new().user_message("hi"))
            .await
            .unwrap();
        assert_eq!(response.backend, "ollama");
        assert_eq!(azure.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cloud_success_records_exactly_one_entry() {
        let f = fixture(chain_config(&["azure", "bedrock"])).await;
        f.registry
            .register("azure", ScriptedProvider::failing("azure", ProviderKind::Cloud))
            .await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        let response = f
            .router
            .complete(RouteRequest::new().user_message("hi"))
            .await
            .unwrap();
        assert_eq!(response.backend, "bedrock");
        // No double-billing: the failed azure attempt left no entry
        assert_eq!(f.ledger.len(), 1);
        assert_eq!(f.breaker.snapshot().request_count, 1);
    }

    #[tokio::test]
    async fn test_local_success_is_not_billed() {
        let f = fixture(chain_config(&["ollama"])).await;
        f.registry
            .register("ollama", ScriptedProvider::ok("ollama", ProviderKind::Local))
            .await;

        f.router
            .complete(RouteRequest::new().user_message("hi"))
            .await
            .unwrap();
        assert!(f.ledger.is_empty());
        assert_eq!(f.breaker.current_spend(), 0.0);
    }

    #[tokio::test]
    async fn test_budget_open_falls_through_to_local() {
        let f = fixture(chain_config(&["azure", "ollama"])).await;
        let azure = ScriptedProvider::ok("azure", ProviderKind::Cloud);
        f.registry.register("azure", azure.clone()).await;
        f.registry
            .register("ollama", ScriptedProvider::ok("ollama", ProviderKind::Local))
            .await;

        // Exhaust the budget: breaker open, cloud rejected, local serves
        f.breaker.record_spend(500.0, "azure", "gpt-4o");
        let response = f
            .router
            .complete(RouteRequest::new().user_message("hi"))
            .await
            .unwrap();
        assert_eq!(response.backend, "ollama");
        assert_eq!(azure.call_count(), 0);
    }

    #[tokio::test]
    async fn test_budget_error_surfaces_when_only_cloud_remains() {
        let f = fixture(chain_config(&["azure", "bedrock"])).await;
        f.registry
            .register("azure", ScriptedProvider::ok("azure", ProviderKind::Cloud))
            .await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        f.breaker.record_spend(500.0, "azure", "gpt-4o");
        let err = f
            .router
            .complete(RouteRequest::new().user_message("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "budget_exceeded");
    }

    #[tokio::test]
    async fn test_hybrid_rule_promotes_preferred_backend() {
        let config = chain_config(&["azure", "bedrock", "ollama"])
            .with_hybrid_rule(DataClassification::Public, "bedrock");
        let f = fixture(config).await;
        f.registry
            .register("azure", ScriptedProvider::ok("azure", ProviderKind::Cloud))
            .await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        let response = f
            .router
            .complete(
                RouteRequest::new()
                    .user_message("hi")
                    .classification(DataClassification::Public),
            )
            .await
            .unwrap();
        assert_eq!(response.backend, "bedrock");
    }

    #[tokio::test]
    async fn test_model_not_found_is_terminal() {
        // The fixture table has no Sota entry for bedrock: the cloud call
        // succeeds, but the cost-estimation failure escapes instead of
        // silently defaulting — no further candidates are attempted.
        let f = fixture(chain_config(&["bedrock", "ollama"])).await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;
        let ollama = ScriptedProvider::ok("ollama", ProviderKind::Local);
        f.registry.register("ollama", ollama.clone()).await;

        let err = f
            .router
            .complete(RouteRequest::new().user_message("hi").tier(Tier::Sota))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "model_not_found");
        assert_eq!(ollama.call_count(), 0);
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_stream_commits_to_first_producer_and_bills_once() {
        let f = fixture(chain_config(&["azure", "bedrock"])).await;
        f.registry
            .register("azure", ScriptedProvider::failing("azure", ProviderKind::Cloud))
            .await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        let mut stream = f
            .router
            .stream(RouteRequest::new().user_message("stream please"))
            .await
            .unwrap();

        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            content.push_str(&chunk.unwrap().content);
        }
        drop(stream);

        assert_eq!(content, "hello world");
        // One cost entry, recorded by the metering wrapper
        assert_eq!(f.ledger.len(), 1);
        let summary = f.ledger.summary(None, None);
        assert_eq!(summary.by_backend.len(), 1);
        assert!(summary.by_backend.contains_key("bedrock"));
    }

    #[tokio::test]
    async fn test_dropped_stream_still_bills_partial_output() {
        let f = fixture(chain_config(&["bedrock"])).await;
        f.registry
            .register("bedrock", ScriptedProvider::ok("bedrock", ProviderKind::Cloud))
            .await;

        let mut stream = f
            .router
            .stream(RouteRequest::new().user_message("stream please"))
            .await
            .unwrap();
        // Consume one chunk, then cancel
        let _ = stream.next().await;
        drop(stream);

        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_status_reflects_configuration() {
        let f = fixture(chain_config(&["azure", "ollama"])).await;
        f.registry
            .register("azure", ScriptedProvider::ok("azure", ProviderKind::Cloud))
            .await;

        let status = f.router.status().await;
        assert_eq!(status.default_backend, "azure");
        assert_eq!(status.fallback_chain, vec!["azure", "ollama"]);
        assert!(status.providers.contains_key("azure"));
        assert_eq!(status.breaker.request_count, 0);
    }
}
