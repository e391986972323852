//! Step records and their state machines.
//!
//! A step's identity is a [`StepId`] assigned at creation and never reused;
//! positional indices shift under insert/delete and are derived for display
//! only. All asynchronous results are correlated by identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use runbook_services::types::ParamSpec;

/// Stable identity token for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution state of a single step.
///
/// `Idle → Running → {Success, Error}`; a settled step returns to `Idle`
/// only through an explicit update (re-arm), never automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl ExecutionStatus {
    /// True once the step has settled into a terminal state.
    pub fn is_settled(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Error)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// In-flight assist activity on a step. At most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepActivity {
    #[default]
    Idle,
    Matching,
    Generating,
}

impl StepActivity {
    pub fn is_busy(&self) -> bool {
        !matches!(self, StepActivity::Idle)
    }
}

/// Denormalized reference to a worker task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub name: String,
}

/// One entry in a procedure's ordered step sequence.
///
/// `task_ref == None` marks a manual step that is never eligible for
/// automated execution. `bound_values` keys are always a subset of the
/// declared `param_specs` names; the binding helpers below maintain that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,
    #[serde(default)]
    pub param_specs: Vec<ParamSpec>,
    #[serde(default)]
    pub bound_values: BTreeMap<String, String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub activity: StepActivity,
}

impl Step {
    /// Create a default (empty, manual) step with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: StepId::new(),
            description: String::new(),
            task_ref: None,
            param_specs: Vec::new(),
            bound_values: BTreeMap::new(),
            status: ExecutionStatus::Idle,
            output: String::new(),
            activity: StepActivity::Idle,
        }
    }

    /// Create a step with a description.
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::new()
        }
    }

    /// Bind a worker task, replacing the parameter spec set.
    ///
    /// Previously bound values are cleared: the new task's spec set may
    /// differ and stale values must not leak across bindings.
    pub fn bind_task(&mut self, task: TaskRef, param_specs: Vec<ParamSpec>) {
        self.task_ref = Some(task);
        self.param_specs = param_specs;
        self.bound_values.clear();
    }

    /// Unbind the task, returning the step to manual.
    pub fn clear_task(&mut self) {
        self.task_ref = None;
        self.param_specs.clear();
        self.bound_values.clear();
    }

    /// Merge bound values, dropping keys outside the declared spec set.
    pub fn merge_bound_values(&mut self, values: BTreeMap<String, String>) {
        for (name, value) in values {
            if self.param_specs.iter().any(|s| s.name == name) {
                self.bound_values.insert(name, value);
            }
        }
    }

    /// Return a settled step to `Idle` so it can run again.
    pub fn rearm(&mut self) {
        if self.status.is_settled() {
            self.status = ExecutionStatus::Idle;
            self.output.clear();
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial step patch applied through [`crate::sequence::StepSequence::update`].
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub description: Option<String>,
    pub task: Option<TaskPatch>,
    pub bound_values: Option<BTreeMap<String, String>>,
}

/// Task binding change carried by a patch.
#[derive(Debug, Clone)]
pub enum TaskPatch {
    Bind {
        task: TaskRef,
        param_specs: Vec<ParamSpec>,
    },
    Clear,
}

impl StepPatch {
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn bind(task: TaskRef, param_specs: Vec<ParamSpec>) -> Self {
        Self {
            task: Some(TaskPatch::Bind { task, param_specs }),
            ..Self::default()
        }
    }

    pub fn clear_task() -> Self {
        Self {
            task: Some(TaskPatch::Clear),
            ..Self::default()
        }
    }

    pub fn values(values: BTreeMap<String, String>) -> Self {
        Self {
            bound_values: Some(values),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.task.is_none() && self.bound_values.is_none()
    }
}
