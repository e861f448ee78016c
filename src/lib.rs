//! # fuzzloom
//!
//! **Multi-armed bandit strategy scheduling for coverage-guided fuzzers**
//!
//! Every round, each fuzzing worker asks a shared bandit which action to run
//! next: generate a fresh program, mutate a corpus entry with one of six
//! operators, or triage a pending candidate. The bandit learns from the
//! coverage each action gains per second and shifts effort toward what pays.
//!
//! ## Features
//!
//! - **Numerically safe softmax**: median-centered exponential weights,
//!   clamped to `[1e-300, 1e300]`, never `Inf` or `NaN`
//! - **Exp3.1 epochs**: optional round-indexed annealing with a pluggable schedule
//! - **Feasibility masking**: infeasible actions get zero probability but keep
//!   their learned weight
//! - **Concurrent workers**: one pinned OS thread per worker, sharing a
//!   reader/writer-locked state; per-worker seeded RNGs
//! - **Batch replay**: gated parallel execution of a fixed entry list
//! - **Flexible Configuration**: files (TOML/YAML/JSON), environment, code, CLI
//! - **Prometheus metrics**: always collected, optionally registered
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use fuzzloom::{Collaborators, SchedulerBuilder, TriageQueue};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SchedulerBuilder::new()
//!         .prefix("syz")
//!         .workers(8)
//!         .seed(42)
//!         .build()?;
//!
//!     let queue = Arc::new(TriageQueue::default());
//!     let collab = Collaborators::new(corpus, queue, ops, sandbox);
//!
//!     // Blocks until shutdown; a NoFeasibleAction error is fatal.
//!     let stats = runtime.run(collab)?;
//!     for s in stats {
//!         println!("worker {}: {} rounds", s.worker_id, s.reported);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Configuration sources are merged in order (later sources override earlier):
//!
//! 1. Default values
//! 2. Config files (via `.file()`)
//! 3. Environment variables (via `.env_prefix()`)
//! 4. Programmatic overrides
//! 5. CLI arguments (via `.with_cli_args()`)
//!
//! ### Config File Example (TOML)
//!
//! ```toml
//! prefix = "syz"
//! workers = 8
//! seed = 42
//! pin_workers = true
//! cpuset = "0-7"
//!
//! [knobs]
//! softmax_enabled = true
//! exp31_enabled = true
//! eta = 0.05
//! reward_policy = "importance_weighted"
//!
//! [batch]
//! procs = 4
//! repeat = 1
//! ```
//!
//! ### Environment Variables
//!
//! With `.env_prefix("FUZZLOOM")`:
//! - `FUZZLOOM_WORKERS=8`
//! - `FUZZLOOM_SEED=42`
//! - `FUZZLOOM_KNOBS__ETA=0.1`
//!
//! ## Using the bandit directly
//!
//! The [`mab`] module works without the runtime:
//!
//! ```ignore
//! use fuzzloom::mab::{choose, Feasibility, MabKnobs, RewardSample, SchedulerState};
//!
//! let state = SchedulerState::new(MabKnobs::default())?;
//! let decision = choose(&state.snapshot_weights(), &Feasibility::new(true, false), &mut rng)?;
//! state.apply_outcome(RewardSample::new(decision.action, elapsed, reward));
//! ```

pub mod affinity;
pub mod batch;
pub mod builder;
pub mod collab;
pub mod config;
pub mod error;
pub mod gate;
pub mod mab;
pub mod metrics;
pub mod queue;
pub mod runtime;
pub mod shutdown;
pub mod worker;

pub use batch::{BatchRunner, BatchStats};
pub use builder::{SchedulerArgs, SchedulerBuilder};
pub use collab::{Collaborators, Corpus, ExecReport, ProgramOps, Sandbox, TriageReport, WorkQueue};
pub use config::{BatchConfig, SchedulerConfig};
pub use error::{CollaboratorError, Result, SchedError};
pub use gate::{ExecutionGate, GateTicket};
pub use mab::{Action, MabKnobs, MutationOp, RewardPolicy, RewardSample, SchedulerState};
pub use metrics::SchedMetrics;
pub use queue::TriageQueue;
pub use runtime::SchedulerRuntime;
pub use shutdown::ShutdownSignal;
pub use worker::{RoundOutcome, WorkerLoop, WorkerState, WorkerStats};
