//! Runbook engine.
//!
//! The in-memory editing and execution core for remediation procedures:
//!
//! - **Step model**: ordered [`sequence::StepSequence`] of [`step::Step`]
//!   records, identity-keyed, never shorter than one step
//! - **Parameter policy**: [`params`] resolves bound values against declared
//!   specs and decides execution eligibility
//! - **Execution**: [`coordinator::ExecutionCoordinator`] drives single-step
//!   and whole-sequence runs with pre-flight validation and halt-on-error
//! - **AI assist**: [`assist::AssistAdapter`] wraps auto-match and
//!   auto-generate with per-step busy flags and stale-result guards
//! - **Graph view**: [`graph::WorkflowGraph`] derives the start → steps →
//!   end presentation graph
//! - **Session**: [`session::ProcedureSession`] owns the above for one
//!   procedure's lifetime
//!
//! ## Concurrency
//!
//! The sequence is shared as `Arc<tokio::sync::Mutex<StepSequence>>`; locks
//! are short and never held across a capability call. Conflicting
//! operations on the same step are rejected up front (`busy` / `Running`),
//! and every asynchronous completion re-checks its step's identity before
//! writing anything back.

pub mod assist;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod graph;
pub mod params;
pub mod sequence;
pub mod session;
pub mod step;

pub use assist::{AssistAdapter, GenerateContext};
pub use coordinator::{
    ExecutionCoordinator, ExecutionRun, RunKind, RunReport, SkipReason, StatusEvent,
};
pub use debounce::{EditDebouncer, PendingEdit, DEFAULT_QUIET_PERIOD};
pub use error::{EngineError, EngineResult};
pub use graph::{GraphEdge, GraphNode, NodeId, WorkflowGraph};
pub use sequence::{SharedSteps, StepSequence};
pub use session::{ProcedureMeta, ProcedureSession};
pub use step::{ExecutionStatus, Step, StepActivity, StepId, StepPatch, TaskPatch, TaskRef};
