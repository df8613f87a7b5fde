//! Cost ledger
//!
//! Append-only record of completed billable calls with time-windowed
//! aggregation. The ledger is bounded: past the capacity, the oldest entries
//! are evicted first, so summaries over evicted ranges undercount. That is an
//! accepted limitation of in-memory accounting, documented here rather than
//! hidden.

use crate::pricing::ModelTierTable;
use crate::types::{RouterResult, Tier};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default bounded capacity before FIFO eviction kicks in
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Caller attribution attached to a cost entry
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub user: Option<String>,
    pub request_id: Option<String>,
    /// Operation tag: "completion", "stream", "embedding", ...
    pub operation: String,
}

impl Attribution {
    pub fn operation(op: impl Into<String>) -> Self {
        Self {
            operation: op.into(),
            ..Default::default()
        }
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

/// One completed billable call. Created exactly once per successful cloud
/// call; never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct CostEntry {
    pub timestamp: DateTime<Utc>,
    pub backend: String,
    pub model: String,
    pub tier: Tier,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// USD, computed through the model tier table at record time
    pub cost: f64,
    pub user: Option<String>,
    pub request_id: Option<String>,
    pub operation: String,
}

/// Aggregate over a `[since, until)` window. Derived, not stored.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub total_cost: f64,
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub by_backend: HashMap<String, f64>,
    pub by_model: HashMap<String, f64>,
    pub by_tier: HashMap<Tier, f64>,
    pub by_user: HashMap<String, f64>,
}

impl CostSummary {
    /// Copy with every cost rounded to 4 decimals. Rounding each bucket
    /// independently keeps the breakdown identity within rounding error.
    pub fn rounded(&self) -> Self {
        fn round4(v: f64) -> f64 {
            (v * 10_000.0).round() / 10_000.0
        }
        Self {
            since: self.since,
            until: self.until,
            total_cost: round4(self.total_cost),
            total_requests: self.total_requests,
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            by_backend: self.by_backend.iter().map(|(k, v)| (k.clone(), round4(*v))).collect(),
            by_model: self.by_model.iter().map(|(k, v)| (k.clone(), round4(*v))).collect(),
            by_tier: self.by_tier.iter().map(|(k, v)| (*k, round4(*v))).collect(),
            by_user: self.by_user.iter().map(|(k, v)| (k.clone(), round4(*v))).collect(),
        }
    }
}

/// Start of the current calendar month (UTC) — the default summary window
/// and the breaker's billing-period boundary.
pub(crate) fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is always a valid timestamp")
}

/// Cost ledger
///
/// Safe to call from many concurrent completions: appends happen in a short
/// sync critical section that never performs I/O.
pub struct CostLedger {
    tiers: Arc<ModelTierTable>,
    entries: RwLock<VecDeque<CostEntry>>,
    capacity: usize,
}

impl CostLedger {
    pub fn new(tiers: Arc<ModelTierTable>) -> Self {
        Self::with_capacity(tiers, DEFAULT_LEDGER_CAPACITY)
    }

    pub fn with_capacity(tiers: Arc<ModelTierTable>, capacity: usize) -> Self {
        Self {
            tiers,
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Compute the cost for this call through the tier table, append an
    /// entry, and return it. Fails with `model_not_found` if the
    /// (backend, tier) pair has no pricing entry.
    pub fn record(
        &self,
        backend: &str,
        model: &str,
        tier: Tier,
        input_tokens: u32,
        output_tokens: u32,
        attribution: Attribution,
    ) -> RouterResult<CostEntry> {
        let cost = self
            .tiers
            .estimate_cost(backend, tier, input_tokens, output_tokens)?;

        let entry = CostEntry {
            timestamp: Utc::now(),
            backend: backend.to_string(),
            model: model.to_string(),
            tier,
            input_tokens,
            output_tokens,
            cost,
            user: attribution.user,
            request_id: attribution.request_id,
            operation: attribution.operation,
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(entry)
    }

    /// Aggregate over `[since, until)`. Defaults: start of the current
    /// calendar month to now. Read-only.
    pub fn summary(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> CostSummary {
        let now = Utc::now();
        let since = since.unwrap_or_else(|| month_start(now));
        let until = until.unwrap_or(now);

        let mut summary = CostSummary {
            since,
            until,
            total_cost: 0.0,
            total_requests: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            by_backend: HashMap::new(),
            by_model: HashMap::new(),
            by_tier: HashMap::new(),
            by_user: HashMap::new(),
        };

        let entries = self.entries.read();
        for entry in entries.iter() {
            if entry.timestamp < since || entry.timestamp >= until {
                continue;
            }
            summary.total_cost += entry.cost;
            summary.total_requests += 1;
            summary.total_input_tokens += entry.input_tokens as u64;
            summary.total_output_tokens += entry.output_tokens as u64;
            *summary.by_backend.entry(entry.backend.clone()).or_default() += entry.cost;
            *summary.by_model.entry(entry.model.clone()).or_default() += entry.cost;
            *summary.by_tier.entry(entry.tier).or_default() += entry.cost;
            if let Some(user) = &entry.user {
                *summary.by_user.entry(user.clone()).or_default() += entry.cost;
            }
        }
        summary
    }

    /// Rounded current-month summary for the admin surface
    pub fn snapshot(&self) -> CostSummary {
        self.summary(None, None).rounded()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::TierEntry;

    fn test_ledger(capacity: usize) -> CostLedger {
        let mut table = ModelTierTable::new();
        table.insert("azure", Tier::Sota, TierEntry::new("gpt-4o", 0.0025, 0.01));
        table.insert(
            "azure",
            Tier::CostEffective,
            TierEntry::new("gpt-4o-mini", 0.00015, 0.0006),
        );
        table.insert(
            "bedrock",
            Tier::Sota,
            TierEntry::new("claude-sonnet", 0.003, 0.015),
        );
        CostLedger::with_capacity(Arc::new(table), capacity)
    }

    #[test]
    fn test_record_computes_cost_through_table() {
        let ledger = test_ledger(100);
        let entry = ledger
            .record(
                "azure",
                "gpt-4o",
                Tier::Sota,
                10_000,
                2_000,
                Attribution::operation("completion"),
            )
            .unwrap();
        assert!((entry.cost - 0.045).abs() < 1e-9);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_record_missing_tier_entry_fails() {
        let ledger = test_ledger(100);
        let err = ledger
            .record(
                "vertex",
                "gemini-pro",
                Tier::Sota,
                100,
                100,
                Attribution::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "model_not_found");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let ledger = test_ledger(3);
        for i in 0..5 {
            ledger
                .record(
                    "azure",
                    "gpt-4o",
                    Tier::Sota,
                    1000,
                    0,
                    Attribution::operation(format!("op-{i}")),
                )
                .unwrap();
        }
        assert_eq!(ledger.len(), 3);
        let summary = ledger.summary(None, None);
        // Oldest two evicted; summary covers the surviving three
        assert_eq!(summary.total_requests, 3);
    }

    #[test]
    fn test_summary_breakdown_identity() {
        let ledger = test_ledger(100);
        ledger
            .record(
                "azure",
                "gpt-4o",
                Tier::Sota,
                123_457,
                77_701,
                Attribution::operation("completion").user("analyst-1"),
            )
            .unwrap();
        ledger
            .record(
                "azure",
                "gpt-4o-mini",
                Tier::CostEffective,
                987_653,
                41_117,
                Attribution::operation("completion").user("analyst-2"),
            )
            .unwrap();
        ledger
            .record(
                "bedrock",
                "claude-sonnet",
                Tier::Sota,
                55_511,
                9_319,
                Attribution::operation("stream").user("analyst-1"),
            )
            .unwrap();

        let summary = ledger.summary(None, None).rounded();
        let by_backend: f64 = summary.by_backend.values().sum();
        let by_model: f64 = summary.by_model.values().sum();
        let by_tier: f64 = summary.by_tier.values().sum();
        // sum(by-backend) == sum(by-model) == sum(by-tier) == total, within
        // rounding error of the 4-decimal snapshot
        assert!((by_backend - summary.total_cost).abs() < 1e-3);
        assert!((by_model - summary.total_cost).abs() < 1e-3);
        assert!((by_tier - summary.total_cost).abs() < 1e-3);
        assert_eq!(summary.total_requests, 3);
    }

    #[test]
    fn test_summary_window_excludes_out_of_range() {
        let ledger = test_ledger(100);
        ledger
            .record("azure", "gpt-4o", Tier::Sota, 1000, 0, Attribution::default())
            .unwrap();

        // Window entirely in the past excludes the fresh entry
        let past = Utc::now() - chrono::Duration::hours(2);
        let summary = ledger.summary(Some(past), Some(past + chrono::Duration::hours(1)));
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.total_cost, 0.0);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2025, 6, 17, 13, 45, 9).unwrap();
        let start = month_start(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }
}
