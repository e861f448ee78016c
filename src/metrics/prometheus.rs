//! Prometheus metrics for the fuzzing scheduler.
//!
//! Counters work standalone without a Registry; registration is only needed
//! for exposition (scraping).
//!
//! # Design Principles
//!
//! - **Always-on**: every round updates its counters, registry or not
//! - **Cached access**: per-action children are resolved once at creation,
//!   so the hot path never does a label lookup
//! - **Configurable prefix**: metric names use `{prefix}_` (default: "fuzzloom")
//!
//! # Usage
//!
//! ```ignore
//! let registry = prometheus::Registry::new();
//! let runtime = SchedulerBuilder::new()
//!     .prometheus_registry(registry.clone())
//!     .build()?;
//!
//! let encoder = TextEncoder::new();
//! encoder.encode(&registry.gather(), &mut buffer)?;
//! ```

use prometheus::{Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::mab::{Action, ApplyReport, ExplorationParams, NUM_ACTIONS};

/// Prometheus metrics for the scheduler and its workers.
#[derive(Clone)]
pub struct SchedMetrics {
    // === Per-action families ===
    /// Decisions by chosen action (label `action`)
    pub decisions: IntCounterVec,

    /// Current reward estimate by action (label `action`)
    pub estimates: GaugeVec,

    decision_children: [IntCounter; NUM_ACTIONS],
    estimate_children: [Gauge; NUM_ACTIONS],

    // === Counters (cumulative) ===
    /// Outcomes applied to the scheduler state
    pub rounds: IntCounter,

    /// Triage picks that found the queue already drained
    pub triage_races: IntCounter,

    /// Non-fatal collaborator failures
    pub collaborator_errors: IntCounter,

    /// Non-triage work items drained at idle
    pub background_items: IntCounter,

    // === Gauges (current values) ===
    /// Current Exp3.1 epoch
    pub epoch: IntGauge,

    /// Effective inverse temperature
    pub eta: Gauge,

    /// Effective exploration rate
    pub gamma: Gauge,
}

impl Default for SchedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedMetrics {
    /// Create metrics with default prefix "fuzzloom".
    pub fn new() -> Self {
        Self::with_prefix("fuzzloom")
    }

    /// Create metrics with a custom prefix.
    ///
    /// The prefix is sanitized to a valid Prometheus metric name: hyphens and
    /// other invalid characters become underscores.
    ///
    /// ```ignore
    /// let metrics = SchedMetrics::with_prefix("syz-fuzzer");
    /// // syz_fuzzer_decisions_total{action="splice"}, syz_fuzzer_rounds_total, ...
    /// ```
    pub fn with_prefix(prefix: &str) -> Self {
        let prefix = sanitize_prefix(prefix);

        let decisions = IntCounterVec::new(
            Opts::new(
                format!("{}_decisions_total", prefix),
                "Scheduler decisions by chosen action",
            ),
            &["action"],
        )
        .expect("metric creation should not fail");

        let estimates = GaugeVec::new(
            Opts::new(
                format!("{}_action_estimate", prefix),
                "Smoothed reward rate estimate by action",
            ),
            &["action"],
        )
        .expect("metric creation should not fail");

        let decision_children = Action::ALL.map(|a| decisions.with_label_values(&[a.name()]));
        let estimate_children = Action::ALL.map(|a| estimates.with_label_values(&[a.name()]));

        Self {
            decisions,
            estimates,
            decision_children,
            estimate_children,

            rounds: IntCounter::with_opts(Opts::new(
                format!("{}_rounds_total", prefix),
                "Outcomes applied to the scheduler",
            ))
            .expect("metric creation should not fail"),

            triage_races: IntCounter::with_opts(Opts::new(
                format!("{}_triage_races_total", prefix),
                "Triage picks skipped because the queue emptied",
            ))
            .expect("metric creation should not fail"),

            collaborator_errors: IntCounter::with_opts(Opts::new(
                format!("{}_collaborator_errors_total", prefix),
                "Non-fatal collaborator failures",
            ))
            .expect("metric creation should not fail"),

            background_items: IntCounter::with_opts(Opts::new(
                format!("{}_background_items_total", prefix),
                "Non-triage work items processed outside bandit rounds",
            ))
            .expect("metric creation should not fail"),

            epoch: IntGauge::with_opts(Opts::new(
                format!("{}_epoch", prefix),
                "Current Exp3.1 epoch",
            ))
            .expect("metric creation should not fail"),

            eta: Gauge::with_opts(Opts::new(
                format!("{}_eta", prefix),
                "Effective inverse temperature",
            ))
            .expect("metric creation should not fail"),

            gamma: Gauge::with_opts(Opts::new(
                format!("{}_gamma", prefix),
                "Effective exploration rate",
            ))
            .expect("metric creation should not fail"),
        }
    }

    /// Register all metrics with a Registry for exposition.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g., duplicate names).
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.decisions.clone()))?;
        registry.register(Box::new(self.estimates.clone()))?;
        registry.register(Box::new(self.rounds.clone()))?;
        registry.register(Box::new(self.triage_races.clone()))?;
        registry.register(Box::new(self.collaborator_errors.clone()))?;
        registry.register(Box::new(self.background_items.clone()))?;
        registry.register(Box::new(self.epoch.clone()))?;
        registry.register(Box::new(self.eta.clone()))?;
        registry.register(Box::new(self.gamma.clone()))?;
        Ok(())
    }

    /// Record a decision for `action`.
    #[inline]
    pub fn record_decision(&self, action: Action) {
        self.decision_children[action.index()].inc();
    }

    /// Decisions recorded for `action`.
    pub fn decision_count(&self, action: Action) -> u64 {
        self.decision_children[action.index()].get()
    }

    /// Record an applied outcome.
    ///
    /// Gauges take the last value written, so call this from the observer of
    /// `SchedulerState::apply_outcome_with` to keep them in apply order.
    #[inline]
    pub fn record_apply(&self, action: Action, report: &ApplyReport) {
        self.rounds.inc();
        self.estimate_children[action.index()].set(report.estimate);
        self.epoch.set(i64::from(report.epoch));
    }

    /// Publish the exploration parameters in effect.
    #[inline]
    pub fn set_params(&self, params: ExplorationParams) {
        self.eta.set(params.eta);
        self.gamma.set(params.gamma);
    }

    /// Publish a full estimate vector (after an epoch restart, for example).
    pub fn set_estimates(&self, estimates: &[f64; NUM_ACTIONS]) {
        for (gauge, value) in self.estimate_children.iter().zip(estimates) {
            gauge.set(*value);
        }
    }

    /// Current estimate gauge value for `action`.
    pub fn estimate_gauge(&self, action: Action) -> f64 {
        self.estimate_children[action.index()].get()
    }

    /// Record a triage race skip.
    #[inline]
    pub fn record_triage_race(&self) {
        self.triage_races.inc();
    }

    /// Record a collaborator failure.
    #[inline]
    pub fn record_collaborator_error(&self) {
        self.collaborator_errors.inc();
    }

    /// Record a drained non-triage item.
    #[inline]
    pub fn record_background_item(&self) {
        self.background_items.inc();
    }
}

/// Replace characters that are not valid in a Prometheus metric name.
///
/// Valid chars: `[a-zA-Z_:]` first, `[a-zA-Z0-9_:]` after.
fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let ok = if i == 0 {
                c.is_ascii_alphabetic() || c == '_' || c == ':'
            } else {
                c.is_ascii_alphanumeric() || c == '_' || c == ':'
            };
            if ok {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl std::fmt::Debug for SchedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedMetrics")
            .field("rounds", &self.rounds.get())
            .field("triage_races", &self.triage_races.get())
            .field("collaborator_errors", &self.collaborator_errors.get())
            .field("epoch", &self.epoch.get())
            .finish_non_exhaustive()
    }
}
