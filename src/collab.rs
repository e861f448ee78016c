//! Interfaces to the collaborators a worker drives.
//!
//! The scheduler never looks inside programs. It needs four capabilities,
//! each a trait object so the bandit stays testable without a real program
//! engine or sandbox:
//!
//! - [`Corpus`]: is there anything to mutate, and pick a seed
//! - [`WorkQueue`]: pending triage work and other queued items
//! - [`ProgramOps`]: generate, mutate, triage, process queued items
//! - [`Sandbox`]: execute a candidate and report its reward
//!
//! `P` is the program/candidate type, `T` the queued work item type.

use std::sync::Arc;

use rand::rngs::SmallRng;

use crate::error::CollaboratorError;
use crate::mab::{MutationOp, RewardSample};

/// Result of executing one candidate in the sandbox.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExecReport {
    /// Coverage-derived reward (e.g. new signal count)
    pub reward: f64,
    /// Execution time as measured by the sandbox, if it tracks one
    pub elapsed_hint: Option<f64>,
}

impl ExecReport {
    /// Report with a reward and no timing hint.
    pub fn new(reward: f64) -> Self {
        Self {
            reward,
            elapsed_hint: None,
        }
    }
}

/// Result of triaging one candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TriageReport {
    /// Coverage-derived reward attributed to the triage work
    pub reward: f64,
}

/// Corpus of interesting programs.
pub trait Corpus<P>: Send + Sync {
    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the corpus has no entries (mutation is infeasible).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick a mutation source, returning its index and a private copy.
    fn choose_entry(&self, rng: &mut SmallRng) -> Option<(usize, P)>;

    /// Credit the entry a mutation started from.
    fn credit(&self, _index: usize, _sample: &RewardSample) {}
}

/// Queue of pending work owned by the fuzzer.
pub trait WorkQueue<T>: Send + Sync {
    /// Number of candidates waiting for triage.
    fn pending_triage(&self) -> usize;

    /// Take one triage candidate. `None` if another worker got there first.
    fn dequeue_triage(&self) -> Option<T>;

    /// Take one non-triage item (externally supplied candidates, smash jobs).
    fn dequeue_other(&self) -> Option<T> {
        None
    }
}

/// Program generation, mutation and triage engines.
pub trait ProgramOps<P, T>: Send + Sync {
    /// Generate a new program.
    fn generate(&self, rng: &mut SmallRng) -> P;

    /// Mutate a copy of a corpus entry with the given operator.
    fn mutate(&self, seed: P, op: MutationOp, rng: &mut SmallRng) -> P;

    /// Triage one candidate.
    fn triage(&self, item: T) -> Result<TriageReport, CollaboratorError>;

    /// Process a non-triage work item. These are not bandit rounds.
    fn process(&self, _item: T) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Out-of-process execution sandbox.
pub trait Sandbox<P>: Send + Sync {
    /// Run a candidate and report its reward.
    fn execute(&self, program: &P) -> Result<ExecReport, CollaboratorError>;
}

/// The capability bundle injected into every worker.
pub struct Collaborators<P, T> {
    /// Corpus access
    pub corpus: Arc<dyn Corpus<P>>,
    /// Work queue access
    pub queue: Arc<dyn WorkQueue<T>>,
    /// Program engines
    pub ops: Arc<dyn ProgramOps<P, T>>,
    /// Execution sandbox
    pub sandbox: Arc<dyn Sandbox<P>>,
}

impl<P, T> Collaborators<P, T> {
    /// Bundle the four capabilities.
    pub fn new(
        corpus: Arc<dyn Corpus<P>>,
        queue: Arc<dyn WorkQueue<T>>,
        ops: Arc<dyn ProgramOps<P, T>>,
        sandbox: Arc<dyn Sandbox<P>>,
    ) -> Self {
        Self {
            corpus,
            queue,
            ops,
            sandbox,
        }
    }
}

// Manual impl: derive would require `P: Clone, T: Clone`.
impl<P, T> Clone for Collaborators<P, T> {
    fn clone(&self) -> Self {
        Self {
            corpus: Arc::clone(&self.corpus),
            queue: Arc::clone(&self.queue),
            ops: Arc::clone(&self.ops),
            sandbox: Arc::clone(&self.sandbox),
        }
    }
}

impl<P, T> std::fmt::Debug for Collaborators<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("corpus_len", &self.corpus.len())
            .field("pending_triage", &self.queue.pending_triage())
            .finish_non_exhaustive()
    }
}
