//! Model tier table
//!
//! Resolves (backend, tier) to a concrete model identifier and per-1K-token
//! prices, and computes estimated cost. The table is configuration, loaded
//! once at startup; registering a backend without a tier entry is a valid
//! (if degraded) state that only fails at cost-estimation time.

use crate::types::{RouterError, RouterResult, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One (backend, tier) pricing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierEntry {
    /// Concrete model identifier sent to the backend
    pub model: String,
    /// USD per 1K input tokens
    pub input_price_per_1k: f64,
    /// USD per 1K output tokens
    pub output_price_per_1k: f64,
}

impl TierEntry {
    pub fn new(model: impl Into<String>, input_price_per_1k: f64, output_price_per_1k: f64) -> Self {
        Self {
            model: model.into(),
            input_price_per_1k,
            output_price_per_1k,
        }
    }

    /// Zero-price entry for local engines
    pub fn free(model: impl Into<String>) -> Self {
        Self::new(model, 0.0, 0.0)
    }
}

/// (backend, tier) → model id + pricing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelTierTable {
    entries: HashMap<String, HashMap<Tier, TierEntry>>,
}

impl ModelTierTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in catalog covering the default adapter roster. Prices are per
    /// 1K tokens in USD; local engines are free.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table
            .insert("azure", Tier::Sota, TierEntry::new("gpt-4o", 0.0025, 0.01))
            .insert(
                "azure",
                Tier::CostEffective,
                TierEntry::new("gpt-4o-mini", 0.00015, 0.0006),
            )
            .insert(
                "bedrock",
                Tier::Sota,
                TierEntry::new("anthropic.claude-3-5-sonnet-20241022-v2:0", 0.003, 0.015),
            )
            .insert(
                "bedrock",
                Tier::CostEffective,
                TierEntry::new("anthropic.claude-3-haiku-20240307-v1:0", 0.00025, 0.00125),
            )
            .insert("ollama", Tier::Sota, TierEntry::free("llama3.1:70b"))
            .insert(
                "ollama",
                Tier::CostEffective,
                TierEntry::free("llama3.1:8b"),
            )
            .insert(
                "vllm",
                Tier::Sota,
                TierEntry::free("meta-llama/Llama-3.1-70B-Instruct"),
            )
            .insert(
                "vllm",
                Tier::CostEffective,
                TierEntry::free("meta-llama/Llama-3.1-8B-Instruct"),
            );
        table
    }

    /// Insert an entry, replacing any previous one for the same key.
    pub fn insert(&mut self, backend: impl Into<String>, tier: Tier, entry: TierEntry) -> &mut Self {
        self.entries.entry(backend.into()).or_default().insert(tier, entry);
        self
    }

    /// Resolve the entry for (backend, tier).
    pub fn resolve(&self, backend: &str, tier: Tier) -> RouterResult<&TierEntry> {
        self.entries
            .get(backend)
            .and_then(|tiers| tiers.get(&tier))
            .ok_or_else(|| RouterError::ModelNotFound {
                backend: backend.to_string(),
                tier,
            })
    }

    /// Estimated cost in USD, never negative:
    /// `input/1000 × input_price + output/1000 × output_price`.
    pub fn estimate_cost(
        &self,
        backend: &str,
        tier: Tier,
        input_tokens: u32,
        output_tokens: u32,
    ) -> RouterResult<f64> {
        let entry = self.resolve(backend, tier)?;
        let cost = (input_tokens as f64 / 1000.0) * entry.input_price_per_1k
            + (output_tokens as f64 / 1000.0) * entry.output_price_per_1k;
        Ok(cost.max(0.0))
    }

    /// Backends with at least one tier entry
    pub fn backends(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Per-backend tier→model view for the admin surface
    pub fn snapshot(&self) -> HashMap<String, HashMap<Tier, String>> {
        self.entries
            .iter()
            .map(|(backend, tiers)| {
                (
                    backend.clone(),
                    tiers
                        .iter()
                        .map(|(tier, entry)| (*tier, entry.model.clone()))
                        .collect(),
                )
            })
            .collect()
    }
}
