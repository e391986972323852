//! Capability traits consumed by the runbook engine and session layers.
//!
//! Each trait wraps one external request/response capability. Implementations
//! live in [`crate::remote`] (HTTP-backed) and [`crate::shell`] (local
//! execution); tests supply their own mocks.

use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::types::{
    ExecutionOutcome, ExecutionRequest, GenerateTaskRequest, Generation, IncidentResolution,
    ProcedureDoc, ProcedureDraft, TaskDraft, TaskMatch, WorkerTask,
};

/// Worker-task catalog: the registry of executable action definitions.
#[async_trait]
pub trait TaskCatalog: Send + Sync {
    async fn list(&self) -> Result<Vec<WorkerTask>, CapabilityError>;

    async fn get(&self, task_id: &str) -> Result<WorkerTask, CapabilityError>;

    /// Register a new task; returns it with its assigned id.
    async fn add(&self, task: &WorkerTask) -> Result<WorkerTask, CapabilityError>;

    async fn update(&self, task: &WorkerTask) -> Result<(), CapabilityError>;

    async fn delete(&self, task_id: &str) -> Result<(), CapabilityError>;
}

/// Matches a free-text step description to a catalog task.
#[async_trait]
pub trait TaskMatcher: Send + Sync {
    /// Returns `None` when no confident match exists.
    async fn match_task(&self, description: &str) -> Result<Option<TaskMatch>, CapabilityError>;
}

/// Generates a draft worker task from procedure context.
#[async_trait]
pub trait TaskGenerator: Send + Sync {
    async fn generate_task(
        &self,
        request: &GenerateTaskRequest,
    ) -> Result<TaskDraft, CapabilityError>;
}

/// Generates a full procedure draft from raw text, possibly after a
/// clarification round-trip.
#[async_trait]
pub trait ProcedureGenerator: Send + Sync {
    async fn generate_procedure(
        &self,
        raw_text: &str,
        answers: Option<&[String]>,
    ) -> Result<Generation, CapabilityError>;
}

/// Parses an existing runbook document into a structured draft.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, raw_text: &str) -> Result<ProcedureDraft, CapabilityError>;
}

/// Looks up an incident and instantiates procedure steps against it.
#[async_trait]
pub trait IncidentResolver: Send + Sync {
    async fn resolve(&self, incident_number: &str)
        -> Result<IncidentResolution, CapabilityError>;
}

/// Executes a bound worker task with resolved parameter values.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// A capability-level failure is an `Err`; a task that ran and failed is
    /// an `Ok` outcome with error status.
    async fn execute(&self, request: &ExecutionRequest)
        -> Result<ExecutionOutcome, CapabilityError>;
}

/// Stores assembled procedures.
#[async_trait]
pub trait ProcedureStore: Send + Sync {
    /// Upload a procedure; returns the store-assigned id.
    async fn upload(&self, doc: &ProcedureDoc) -> Result<String, CapabilityError>;

    async fn delete(&self, procedure_id: &str) -> Result<(), CapabilityError>;

    async fn list(&self) -> Result<Vec<ProcedureDoc>, CapabilityError>;
}
