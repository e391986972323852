//! Shared data types for the runbook capability surface.
//!
//! Worker tasks, parameter specifications, procedure documents, incident
//! resolutions, and execution requests/outcomes. All parameter values are
//! carried as strings; `ParamKind` is advisory and enforced (if at all) by
//! the executing capability, never at this layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Advisory parameter type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    #[default]
    String,
    Int,
    Bool,
    Float,
    File,
    Enum,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamKind::String => "string",
            ParamKind::Int => "int",
            ParamKind::Bool => "bool",
            ParamKind::Float => "float",
            ParamKind::File => "file",
            ParamKind::Enum => "enum",
        };
        write!(f, "{}", s)
    }
}

/// Declared parameter of a worker task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name, unique within a task.
    pub name: String,

    /// Advisory type tag.
    #[serde(default)]
    pub kind: ParamKind,

    /// Whether a value must be resolvable before execution.
    #[serde(default)]
    pub required: bool,

    /// Fallback value used when no value is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ParamSpec {
    /// Create a required parameter with no default.
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default_value: None,
        }
    }

    /// Create an optional parameter.
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default_value: None,
        }
    }

    /// Attach a default value.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Kind of executable content a worker task carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Shell,
    Python,
    Http,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskKind::Shell => "shell",
            TaskKind::Python => "python",
            TaskKind::Http => "http",
        };
        write!(f, "{}", s)
    }
}

/// A reusable executable action definition from the task catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Executable body (e.g. shell script source).
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub param_specs: Vec<ParamSpec>,
}

/// A confident match returned by the task matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMatch {
    pub task_id: String,
    pub task_name: String,
}

/// Request for generating a new worker task from procedure context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateTaskRequest {
    pub title: String,
    pub issue: String,
    pub all_step_descriptions: Vec<String>,
    pub target_description: String,
}

/// A generated worker task awaiting explicit operator confirmation.
///
/// Drafts are never bound automatically; confirmation registers them in the
/// catalog and binds the resulting task in a separate edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub param_specs: Vec<ParamSpec>,
}

/// One step of a parsed or generated procedure draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftStep {
    pub description: String,
    /// Matched task, when the matcher was confident.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

/// A procedure draft produced by the document parser or generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDraft {
    pub title: String,
    pub issue: String,
    pub steps: Vec<DraftStep>,
}

/// Outcome of a procedure generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Generation {
    /// The generator needs answers before it can produce a draft.
    ClarificationNeeded { questions: Vec<String> },
    /// A complete draft, ready for review.
    Generated { draft: ProcedureDraft },
}

/// Incident record as surfaced by the incident resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentData {
    pub number: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
}

/// A procedure step instantiated against a specific incident.
///
/// Bound values are pre-extracted from the incident text where the resolver
/// could do so; the remainder is left to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default)]
    pub param_specs: Vec<ParamSpec>,
    #[serde(default)]
    pub bound_values: BTreeMap<String, String>,
}

/// Incident lookup result: the incident plus its resolved steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentResolution {
    pub incident: IncidentData,
    pub steps: Vec<ResolvedStep>,
}

/// Execution request handed to the executor capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub task_name: String,
    /// Effective parameter values only; missing values never reach here.
    pub parameters: BTreeMap<String, String>,
}

/// Status of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of a task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    /// Execution transcript (stdout, or the failure reason).
    pub output: String,
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            output: output.into(),
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            output: output.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One step of an assembled procedure document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default)]
    pub bound_values: BTreeMap<String, String>,
}

/// An assembled procedure, as uploaded to and listed from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDoc {
    /// Store-assigned identifier; absent on upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub issue: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<DocStep>,
}
