//! Routing configuration
//!
//! Everything the composition point needs before
//! [`ProviderRegistry::initialize`](crate::registry::ProviderRegistry::initialize)
//! runs: default backend, fallback order, budget thresholds, hybrid
//! classification rules, and tier-table overrides. Loadable from a
//! TOML/YAML/JSON file with a `ROUTEGUARD_*` environment overlay, or built
//! programmatically.

use crate::ledger::DEFAULT_LEDGER_CAPACITY;
use crate::pricing::ModelTierTable;
use crate::types::{DataClassification, RouterError, RouterResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Backend the default chain starts from
    pub default_backend: String,
    /// Ordered fallback chain the router traverses
    pub fallback_chain: Vec<String>,
    /// Monthly cloud-spend limit in USD (`<= 0` disables gating)
    pub monthly_budget_usd: f64,
    /// Fraction of the limit at which the breaker degrades
    pub warn_ratio: f64,
    /// Bounded cost-ledger capacity before FIFO eviction
    pub ledger_capacity: usize,
    /// Data classification → preferred backend name. For `internal` and
    /// `confidential` the named backend must be local; for `public` and
    /// `general` it is promoted to the head of the chain.
    pub hybrid_rules: HashMap<DataClassification, String>,
    /// Tier-table override; `None` uses the built-in catalog
    pub tiers: Option<ModelTierTable>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut hybrid_rules = HashMap::new();
        hybrid_rules.insert(DataClassification::Internal, "ollama".to_string());
        hybrid_rules.insert(DataClassification::Confidential, "ollama".to_string());

        Self {
            default_backend: "azure".to_string(),
            fallback_chain: vec![
                "azure".to_string(),
                "bedrock".to_string(),
                "ollama".to_string(),
                "vllm".to_string(),
            ],
            monthly_budget_usd: 500.0,
            warn_ratio: 0.8,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            hybrid_rules,
            tiers: None,
        }
    }
}

impl RoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a config file (TOML/YAML/JSON by extension) merged with a
    /// `ROUTEGUARD_*` environment overlay; environment wins.
    pub fn load(path: impl AsRef<Path>) -> RouterResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("ROUTEGUARD").separator("__"))
            .build()
            .map_err(|e| RouterError::Config(e.to_string()))?;

        let cfg: Self = settings
            .try_deserialize()
            .map_err(|e| RouterError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment-only construction for containerized deployments:
    /// `ROUTEGUARD_DEFAULT_BACKEND`, `ROUTEGUARD_FALLBACK_CHAIN`
    /// (comma-separated), `ROUTEGUARD_MONTHLY_BUDGET_USD`,
    /// `ROUTEGUARD_WARN_RATIO`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(backend) = std::env::var("ROUTEGUARD_DEFAULT_BACKEND") {
            cfg.default_backend = backend;
        }
        if let Ok(chain) = std::env::var("ROUTEGUARD_FALLBACK_CHAIN") {
            let parsed: Vec<String> = chain
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                cfg.fallback_chain = parsed;
            }
        }
        if let Ok(budget) = std::env::var("ROUTEGUARD_MONTHLY_BUDGET_USD") {
            if let Ok(v) = budget.parse() {
                cfg.monthly_budget_usd = v;
            }
        }
        if let Ok(ratio) = std::env::var("ROUTEGUARD_WARN_RATIO") {
            if let Ok(v) = ratio.parse() {
                cfg.warn_ratio = v;
            }
        }
        cfg
    }

    pub fn with_default_backend(mut self, backend: impl Into<String>) -> Self {
        self.default_backend = backend.into();
        self
    }

    pub fn with_fallback_chain(mut self, chain: Vec<String>) -> Self {
        self.fallback_chain = chain;
        self
    }

    pub fn with_monthly_budget(mut self, usd: f64) -> Self {
        self.monthly_budget_usd = usd;
        self
    }

    pub fn with_warn_ratio(mut self, ratio: f64) -> Self {
        self.warn_ratio = ratio;
        self
    }

    pub fn with_hybrid_rule(
        mut self,
        classification: DataClassification,
        backend: impl Into<String>,
    ) -> Self {
        self.hybrid_rules.insert(classification, backend.into());
        self
    }

    pub fn with_tiers(mut self, tiers: ModelTierTable) -> Self {
        self.tiers = Some(tiers);
        self
    }

    /// Sanity checks; called by [`load`](Self::load) and the composition
    /// point.
    pub fn validate(&self) -> RouterResult<()> {
        if self.fallback_chain.is_empty() {
            return Err(RouterError::Config("fallback_chain must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.warn_ratio) {
            return Err(RouterError::Config(format!(
                "warn_ratio must be within [0, 1], got {}",
                self.warn_ratio
            )));
        }
        if self.default_backend.is_empty() {
            return Err(RouterError::Config("default_backend must not be empty".into()));
        }
        Ok(())
    }

    /// The effective tier table: the override if present, else the built-in
    /// catalog.
    pub fn tier_table(&self) -> ModelTierTable {
        self.tiers.clone().unwrap_or_else(ModelTierTable::builtin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = RoutingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.default_backend, "azure");
        assert_eq!(cfg.fallback_chain.len(), 4);
        assert_eq!(
            cfg.hybrid_rules[&DataClassification::Confidential],
            "ollama"
        );
    }

    #[test]
    fn test_builder_chain() {
        let cfg = RoutingConfig::new()
            .with_default_backend("bedrock")
            .with_monthly_budget(1_000.0)
            .with_warn_ratio(0.9)
            .with_hybrid_rule(DataClassification::Public, "bedrock");

        assert_eq!(cfg.default_backend, "bedrock");
        assert_eq!(cfg.monthly_budget_usd, 1_000.0);
        assert_eq!(cfg.hybrid_rules[&DataClassification::Public], "bedrock");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cfg = RoutingConfig::new().with_fallback_chain(vec![]);
        assert!(matches!(cfg.validate(), Err(RouterError::Config(_))));

        let cfg = RoutingConfig::new().with_warn_ratio(1.5);
        assert!(matches!(cfg.validate(), Err(RouterError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial_document() {
        // Unspecified fields fall back to defaults
        let cfg: RoutingConfig = serde_json::from_str(
            r#"{
                "default_backend": "bedrock",
                "monthly_budget_usd": 250.0,
                "hybrid_rules": {"confidential": "vllm"}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.default_backend, "bedrock");
        assert_eq!(cfg.monthly_budget_usd, 250.0);
        assert_eq!(cfg.warn_ratio, 0.8);
        assert_eq!(cfg.hybrid_rules[&DataClassification::Confidential], "vllm");
    }

    #[test]
    fn test_tier_table_override() {
        use crate::pricing::TierEntry;
        use crate::types::Tier;

        let mut tiers = ModelTierTable::new();
        tiers.insert("azure", Tier::Sota, TierEntry::new("gpt-4.1", 0.002, 0.008));

        let cfg = RoutingConfig::new().with_tiers(tiers);
        let table = cfg.tier_table();
        assert_eq!(table.resolve("azure", Tier::Sota).unwrap().model, "gpt-4.1");
        assert!(table.resolve("bedrock", Tier::Sota).is_err());
    }
}
