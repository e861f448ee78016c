//! Core types for the Multi-Armed Bandit (MAB) scheduler.
//!
//! This module defines the fundamental types used throughout the MAB system:
//! - `Action`: The closed set of fuzzing actions (the bandit's arms)
//! - `MutationOp`: Which mutation operator a mutation-family action applies
//! - `RewardSample`: One completed action's cost and reward
//! - `Feasibility`: Per-round mask of actions whose preconditions hold
//! - `Decision`: The chosen action plus the distribution it was drawn from
//! - `ExplorationParams`: The `gamma`/`eta` pair currently shaping weights

use std::fmt;

/// Number of actions. Fixed at compile time; arrays are indexed by
/// [`Action::index`].
pub const NUM_ACTIONS: usize = 8;

/// A fuzzing action the scheduler can pick.
///
/// The declaration order is the index order and the tie-break order of the
/// selector; do not reorder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub enum Action {
    /// Generate a fresh program.
    Generate,
    /// Apply the general mutator to a corpus entry.
    Mutate,
    /// Dequeue and triage a pending candidate.
    Triage,
    /// Remove a call from a corpus entry.
    RemoveCall,
    /// Mutate the arguments of a call.
    MutateArg,
    /// Insert a new call.
    InsertCall,
    /// Splice two corpus entries together.
    Splice,
    /// Squash a complex argument into raw data.
    SquashAny,
}

impl Action {
    /// All actions in index order.
    pub const ALL: [Action; NUM_ACTIONS] = [
        Action::Generate,
        Action::Mutate,
        Action::Triage,
        Action::RemoveCall,
        Action::MutateArg,
        Action::InsertCall,
        Action::Splice,
        Action::SquashAny,
    ];

    /// Position of this action in per-action arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up an action by index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Mutation operator for mutation-family actions, `None` otherwise.
    pub const fn mutation_op(self) -> Option<MutationOp> {
        match self {
            Action::Generate | Action::Triage => None,
            Action::Mutate => Some(MutationOp::Mutate),
            Action::RemoveCall => Some(MutationOp::RemoveCall),
            Action::MutateArg => Some(MutationOp::MutateArg),
            Action::InsertCall => Some(MutationOp::InsertCall),
            Action::Splice => Some(MutationOp::Splice),
            Action::SquashAny => Some(MutationOp::SquashAny),
        }
    }

    /// Whether this action needs a non-empty corpus.
    #[inline]
    pub const fn needs_corpus(self) -> bool {
        self.mutation_op().is_some()
    }

    /// Stable lowercase name, used for metric labels and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::Mutate => "mutate",
            Action::Triage => "triage",
            Action::RemoveCall => "remove_call",
            Action::MutateArg => "mutate_arg",
            Action::InsertCall => "insert_call",
            Action::Splice => "splice",
            Action::SquashAny => "squash_any",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutation operator handed to the program operators collaborator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MutationOp {
    /// General-purpose mutation (the operator picks a strategy itself)
    Mutate,
    /// Remove a call
    RemoveCall,
    /// Mutate call arguments
    MutateArg,
    /// Insert a call
    InsertCall,
    /// Splice with another corpus entry
    Splice,
    /// Squash a complex argument
    SquashAny,
}

/// Outcome of one completed action, fed back into the estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RewardSample {
    /// The action that was executed
    pub action: Action,
    /// Wall-clock time spent, in seconds
    pub elapsed_secs: f64,
    /// Coverage-derived reward reported by the collaborator
    pub reward: f64,
    /// Corpus entry used as mutation source, if any
    pub seed_index: Option<usize>,
    /// Probability the action was selected with; used by importance weighting
    pub propensity: Option<f64>,
}

impl RewardSample {
    /// Create a sample without seed or propensity information.
    pub fn new(action: Action, elapsed_secs: f64, reward: f64) -> Self {
        Self {
            action,
            elapsed_secs,
            reward,
            seed_index: None,
            propensity: None,
        }
    }

    /// Attach the corpus entry the action mutated.
    pub fn with_seed(mut self, seed_index: usize) -> Self {
        self.seed_index = Some(seed_index);
        self
    }

    /// Attach the selection probability.
    pub fn with_propensity(mut self, p: f64) -> Self {
        self.propensity = Some(p);
        self
    }
}

/// Per-round mask of actions whose preconditions hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Feasibility {
    mask: [bool; NUM_ACTIONS],
}

impl Feasibility {
    /// Build the mask from the two external facts the scheduler looks at.
    ///
    /// `Generate` is always feasible.
    pub fn new(corpus_nonempty: bool, triage_pending: bool) -> Self {
        let mut mask = [false; NUM_ACTIONS];
        for action in Action::ALL {
            mask[action.index()] = match action {
                Action::Generate => true,
                Action::Triage => triage_pending,
                _ => corpus_nonempty,
            };
        }
        Self { mask }
    }

    /// Every action feasible.
    pub fn all() -> Self {
        Self {
            mask: [true; NUM_ACTIONS],
        }
    }

    /// Build from an explicit mask.
    pub fn from_mask(mask: [bool; NUM_ACTIONS]) -> Self {
        Self { mask }
    }

    /// Whether `action` may be selected this round.
    #[inline]
    pub fn allows(&self, action: Action) -> bool {
        self.mask[action.index()]
    }

    /// The raw mask.
    #[inline]
    pub fn mask(&self) -> &[bool; NUM_ACTIONS] {
        &self.mask
    }
}

/// Result of one selection: the action and the distribution actually used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Chosen action
    pub action: Action,
    /// Selection probability of every action (zero for infeasible ones)
    pub probabilities: [f64; NUM_ACTIONS],
}

impl Decision {
    /// Probability the chosen action was selected with.
    pub fn propensity(&self) -> f64 {
        self.probabilities[self.action.index()]
    }
}

/// Exploration parameters shaping the weight vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExplorationParams {
    /// Exploration rate, used as the implicit-exploration term of importance weighting
    pub gamma: f64,
    /// Inverse temperature applied to estimates before exponentiation
    pub eta: f64,
}
