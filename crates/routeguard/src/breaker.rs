//! Budget circuit breaker
//!
//! A monthly-spend-driven admission gate consulted before every cloud
//! backend call. Unlike a failure-counting breaker, state here is a pure
//! function of accumulated spend against two thresholds:
//!
//! - `spend <  warn_ratio × limit`  → closed (any tier admitted)
//! - `spend ∈ [warn, limit)`        → half_open (cost_effective only)
//! - `spend ≥  limit`               → open (all cloud admission blocked)
//!
//! Local backends are never gated — they incur no metered cost. Spend is
//! tracked in memory for the current calendar month and resets on period
//! rollover (or manual reset); a process restart therefore resets the
//! observed monthly spend. Operators must persist spend externally if that
//! matters.

use crate::ledger::month_start;
use crate::types::{RouterError, RouterResult, Tier};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Normal operation — any tier admitted
    Closed,
    /// Degraded — only cost_effective tier admitted to cloud backends
    HalfOpen,
    /// Cloud admission blocked; only local backends serve
    Open,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::HalfOpen => write!(f, "half_open"),
            BreakerState::Open => write!(f, "open"),
        }
    }
}

/// Breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetBreakerConfig {
    /// Monthly cloud-spend limit in USD. `<= 0` disables gating entirely.
    pub monthly_limit: f64,
    /// Fraction of the limit at which the breaker degrades to half_open
    pub warn_ratio: f64,
}

impl Default for BudgetBreakerConfig {
    fn default() -> Self {
        Self {
            monthly_limit: 500.0,
            warn_ratio: 0.8,
        }
    }
}

/// Current-period counters. All externally observable state is derived
/// from these — there is no hidden state.
#[derive(Debug)]
struct SpendWindow {
    period_start: DateTime<Utc>,
    spend: f64,
    requests: u64,
    by_backend: HashMap<String, f64>,
    by_model: HashMap<String, f64>,
}

impl SpendWindow {
    fn fresh(period_start: DateTime<Utc>) -> Self {
        Self {
            period_start,
            spend: 0.0,
            requests: 0,
            by_backend: HashMap::new(),
            by_model: HashMap::new(),
        }
    }
}

/// Introspection snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub monthly_limit: f64,
    pub warn_ratio: f64,
    pub current_spend: f64,
    pub remaining_budget: f64,
    pub usage_ratio: f64,
    pub request_count: u64,
    pub period_start: DateTime<Utc>,
    pub by_backend: HashMap<String, f64>,
    pub by_model: HashMap<String, f64>,
}

/// Budget circuit breaker
///
/// Process-wide shared state, mutated on every successful cloud call. The
/// spend update is a single short lock-protected add-and-rederive — no
/// read-modify-write across await points.
pub struct BudgetBreaker {
    config: BudgetBreakerConfig,
    window: Mutex<SpendWindow>,
}

impl BudgetBreaker {
    pub fn new(config: BudgetBreakerConfig) -> Self {
        Self {
            config,
            window: Mutex::new(SpendWindow::fresh(month_start(Utc::now()))),
        }
    }

    /// Breaker with a monthly limit and the default 0.8 warn ratio
    pub fn with_limit(monthly_limit: f64) -> Self {
        Self::new(BudgetBreakerConfig {
            monthly_limit,
            ..Default::default()
        })
    }

    /// Pure state derivation from spend and thresholds
    fn derive_state(&self, spend: f64) -> BreakerState {
        if self.config.monthly_limit <= 0.0 {
            return BreakerState::Closed;
        }
        if spend >= self.config.monthly_limit {
            BreakerState::Open
        } else if spend >= self.config.warn_ratio * self.config.monthly_limit {
            BreakerState::HalfOpen
        } else {
            BreakerState::Closed
        }
    }

    fn rollover_if_needed(&self, window: &mut SpendWindow) {
        let current_period = month_start(Utc::now());
        if window.period_start != current_period {
            info!(
                previous_period = %window.period_start,
                spend = window.spend,
                "billing period rollover; resetting observed spend"
            );
            *window = SpendWindow::fresh(current_period);
        }
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        let mut window = self.window.lock();
        self.rollover_if_needed(&mut window);
        self.derive_state(window.spend)
    }

    /// Admission check for a cloud backend at the requested tier.
    ///
    /// `closed` admits any tier; `half_open` admits only `cost_effective`;
    /// `open` rejects everything. The error names the current spend and
    /// limit so callers can act on it.
    pub fn admit(&self, tier: Tier) -> RouterResult<()> {
        let mut window = self.window.lock();
        self.rollover_if_needed(&mut window);
        let state = self.derive_state(window.spend);

        let admitted = match state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => tier == Tier::CostEffective,
            BreakerState::Open => false,
        };

        if admitted {
            Ok(())
        } else {
            debug!(%state, %tier, spend = window.spend, "budget admission rejected");
            Err(RouterError::BudgetExceeded {
                spent: window.spend,
                limit: self.config.monthly_limit,
            })
        }
    }

    /// Add to current-period spend and re-derive state. Monotonic within a
    /// period; negative amounts are ignored.
    pub fn record_spend(&self, amount: f64, backend: &str, model: &str) {
        if amount < 0.0 {
            return;
        }
        let mut window = self.window.lock();
        self.rollover_if_needed(&mut window);

        let before = self.derive_state(window.spend);
        window.spend += amount;
        window.requests += 1;
        *window.by_backend.entry(backend.to_string()).or_default() += amount;
        *window.by_model.entry(model.to_string()).or_default() += amount;
        let after = self.derive_state(window.spend);

        if before != after {
            info!(
                from = %before,
                to = %after,
                spend = window.spend,
                limit = self.config.monthly_limit,
                "budget breaker state transition"
            );
        }
    }

    /// Manual reset: clears the current period's spend and counters.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        info!(spend = window.spend, "budget breaker manually reset");
        *window = SpendWindow::fresh(month_start(Utc::now()));
    }

    /// Current-period spend in USD
    pub fn current_spend(&self) -> f64 {
        let mut window = self.window.lock();
        self.rollover_if_needed(&mut window);
        window.spend
    }

    /// Derived snapshot — the only externally observable shape of the
    /// breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut window = self.window.lock();
        self.rollover_if_needed(&mut window);
        let limit = self.config.monthly_limit;
        BreakerSnapshot {
            state: self.derive_state(window.spend),
            monthly_limit: limit,
            warn_ratio: self.config.warn_ratio,
            current_spend: window.spend,
            remaining_budget: (limit - window.spend).max(0.0),
            usage_ratio: if limit > 0.0 { window.spend / limit } else { 0.0 },
            request_count: window.requests,
            period_start: window.period_start,
            by_backend: window.by_backend.clone(),
            by_model: window.by_model.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_period_start(&self, period_start: DateTime<Utc>) {
        self.window.lock().period_start = period_start;
    }
}

impl Default for BudgetBreaker {
    fn default() -> Self {
        Self::new(BudgetBreakerConfig::default())
    }
}
