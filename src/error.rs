//! Error types for fuzzloom.

use thiserror::Error;

/// Errors that can occur when building or running a scheduler.
///
/// Every variant here is fatal for the campaign: the scheduler has no safe
/// default when it cannot select an action or was configured with nonsense
/// hyperparameters. Per-round failures of external collaborators are
/// reported through [`CollaboratorError`] instead and never surface here.
#[derive(Debug, Error)]
pub enum SchedError {
    /// A MAB hyperparameter is out of its valid range.
    #[error("invalid value {value} for knob `{name}`")]
    InvalidKnob {
        /// Name of the offending knob
        name: &'static str,
        /// The rejected value
        value: f64,
    },

    /// Structural configuration problem (zero workers, empty batch, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Total weight over the feasible actions collapsed to zero.
    #[error("total feasible weight is zero, no action can be selected")]
    NoFeasibleAction,

    /// Error extracting configuration from figment.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Error building the worker thread pool.
    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error setting thread affinity.
    #[error("failed to pin worker thread to core {0}")]
    AffinityFailed(usize),
}

/// Non-fatal failure reported by an external collaborator for one round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The execution sandbox failed to run a candidate.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Triage of a pending candidate failed.
    #[error("triage failed: {0}")]
    Triage(String),

    /// The corpus had no entry to mutate.
    #[error("corpus has no entries to mutate")]
    EmptyCorpus,
}

/// Result type alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_knob_message() {
        let err = SchedError::InvalidKnob {
            name: "eta",
            value: -1.0,
        };
        assert_eq!(err.to_string(), "invalid value -1 for knob `eta`");
    }

    #[test]
    fn test_collaborator_error_message() {
        let err = CollaboratorError::Execution("executor hung".to_string());
        assert_eq!(err.to_string(), "execution failed: executor hung");
    }
}
