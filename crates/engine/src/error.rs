//! Error types for the runbook engine.

use thiserror::Error;

use runbook_services::CapabilityError;

use crate::step::StepId;

/// Engine-level errors.
///
/// Validation and not-found failures are reported to the caller; the
/// state-conflict variants (`CannotDeleteOnlyStep`, `StepBusy`,
/// `StepRunning`, `RunInFlight`) reject operations that would violate the
/// sequence or run invariants. Capability failures pass through with their
/// own message.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Validation error (empty title/issue, empty step description).
    #[error("Validation error: {0}")]
    Validation(String),

    /// No step with this identity exists in the sequence.
    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    /// A sequence always keeps at least one step.
    #[error("Cannot delete the only remaining step")]
    CannotDeleteOnlyStep,

    /// The step has an assist operation in flight.
    #[error("Step {0} has an assist operation in flight")]
    StepBusy(StepId),

    /// The step is currently executing.
    #[error("Step {0} is already running")]
    StepRunning(StepId),

    /// An execution run is already active for this procedure.
    #[error("An execution run is already active")]
    RunInFlight,

    /// The step has no worker task bound and cannot be executed.
    #[error("Step {0} has no worker task bound")]
    NoTaskBound(StepId),

    /// A required parameter has no bound value and no default.
    #[error("Step {position} is missing required parameter '{name}'")]
    MissingParameter { position: usize, name: String },

    /// A capability call failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
