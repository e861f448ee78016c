//! Metrics collection for scheduler observability.
//!
//! Prometheus-compatible counters and gauges. Metrics are always collected
//! (plain atomic operations) and can optionally be exposed via a Prometheus
//! registry for scraping.
//!
//! # Available Metrics
//!
//! ## Per action (label `action`)
//!
//! - `fuzzloom_decisions_total` - Decisions by chosen action
//! - `fuzzloom_action_estimate` - Current reward rate estimate
//!
//! ## Counters (cumulative)
//!
//! - `fuzzloom_rounds_total` - Outcomes applied to the scheduler
//! - `fuzzloom_triage_races_total` - Triage picks skipped because the queue emptied
//! - `fuzzloom_collaborator_errors_total` - Non-fatal collaborator failures
//! - `fuzzloom_background_items_total` - Non-triage items processed at idle
//!
//! ## Gauges (current values)
//!
//! - `fuzzloom_epoch` - Current Exp3.1 epoch
//! - `fuzzloom_eta` - Effective inverse temperature
//! - `fuzzloom_gamma` - Effective exploration rate

mod prometheus;

pub use prometheus::SchedMetrics;
