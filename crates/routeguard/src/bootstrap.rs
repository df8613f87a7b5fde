//! Composition point
//!
//! The registry, tier table, ledger and breaker are process-wide singletons
//! by convention, not by mechanism: they are constructed exactly once here
//! and handed to the router by reference. Nothing in this crate reaches for
//! hidden global state.

use crate::breaker::{BudgetBreaker, BudgetBreakerConfig};
use crate::config::RoutingConfig;
use crate::ledger::CostLedger;
use crate::pricing::ModelTierTable;
use crate::providers::register_default_factories;
use crate::registry::ProviderRegistry;
use crate::router::Router;
use crate::types::RouterResult;
use std::sync::Arc;

/// Process-lifetime holder for the routing subsystem
pub struct InferenceStack {
    pub registry: Arc<ProviderRegistry>,
    pub tiers: Arc<ModelTierTable>,
    pub ledger: Arc<CostLedger>,
    pub breaker: Arc<BudgetBreaker>,
    pub router: Arc<Router>,
}

impl InferenceStack {
    /// Build and initialize the whole subsystem from configuration: tier
    /// table, ledger, breaker, registry with the default adapter roster,
    /// and the router wired over all of them.
    pub async fn from_config(config: RoutingConfig) -> RouterResult<Self> {
        config.validate()?;

        let tiers = Arc::new(config.tier_table());
        let ledger = Arc::new(CostLedger::with_capacity(
            tiers.clone(),
            config.ledger_capacity,
        ));
        let breaker = Arc::new(BudgetBreaker::new(BudgetBreakerConfig {
            monthly_limit: config.monthly_budget_usd,
            warn_ratio: config.warn_ratio,
        }));

        let registry = Arc::new(ProviderRegistry::new());
        register_default_factories(&registry).await;
        registry.initialize().await;

        let router = Arc::new(Router::new(
            config,
            registry.clone(),
            tiers.clone(),
            ledger.clone(),
            breaker.clone(),
        ));

        Ok(Self {
            registry,
            tiers,
            ledger,
            breaker,
            router,
        })
    }

    /// Close every provider's network resources.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
