//! The ordered, mutable step sequence.
//!
//! All writers go through the operations here; nothing mutates the backing
//! vector directly. Two invariants hold after every legal operation: the
//! sequence never drops below one step, and `bound_values` keys stay within
//! the step's declared parameter specs.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::step::{ExecutionStatus, Step, StepId, StepPatch, TaskPatch};

/// Step sequence shared between the editor, the assist adapter and the
/// execution coordinator. Locks are short and never held across a
/// suspension point.
pub type SharedSteps = Arc<Mutex<StepSequence>>;

/// Ordered collection of steps, length ≥ 1.
#[derive(Debug)]
pub struct StepSequence {
    steps: Vec<Step>,
}

impl StepSequence {
    /// Create a sequence seeded with one default step.
    pub fn new() -> Self {
        Self {
            steps: vec![Step::new()],
        }
    }

    /// Create a sequence from pre-built steps; an empty input still seeds
    /// one default step.
    pub fn from_steps(steps: Vec<Step>) -> Self {
        if steps.is_empty() {
            Self::new()
        } else {
            Self { steps }
        }
    }

    /// Wrap into the shared handle used by the async components.
    pub fn into_shared(self) -> SharedSteps {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// A legal sequence is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn contains(&self, id: StepId) -> bool {
        self.get(id).is_some()
    }

    /// Zero-based display position of a step.
    pub fn position_of(&self, id: StepId) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Identities in order, snapshot for iteration across suspension points.
    pub fn ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id).collect()
    }

    /// Append a default step at the tail. Always succeeds.
    pub fn append(&mut self) -> StepId {
        let step = Step::new();
        let id = step.id;
        self.steps.push(step);
        debug!(step = %id, len = self.steps.len(), "appended step");
        id
    }

    /// Insert a default step immediately after the step with identity `id`.
    pub fn insert_after(&mut self, id: StepId) -> EngineResult<StepId> {
        let position = self
            .position_of(id)
            .ok_or(EngineError::StepNotFound(id))?;
        let step = Step::new();
        let new_id = step.id;
        self.steps.insert(position + 1, step);
        debug!(after = %id, step = %new_id, "inserted step");
        Ok(new_id)
    }

    /// Remove the step with identity `id`.
    ///
    /// Rejected while the step has assist activity in flight, and always
    /// rejected on the last remaining step.
    pub fn delete(&mut self, id: StepId) -> EngineResult<()> {
        let position = self
            .position_of(id)
            .ok_or(EngineError::StepNotFound(id))?;
        if self.steps.len() == 1 {
            return Err(EngineError::CannotDeleteOnlyStep);
        }
        if self.steps[position].activity.is_busy() {
            return Err(EngineError::StepBusy(id));
        }
        self.steps.remove(position);
        debug!(step = %id, len = self.steps.len(), "deleted step");
        Ok(())
    }

    /// Merge a partial patch into the step with identity `id`.
    ///
    /// Returns `false` (no-op) when the step no longer exists; the id may
    /// have been deleted while the edit was in flight. Applying a non-empty
    /// patch re-arms a settled step; a `Running` step's status is never
    /// touched here, its in-flight completion owns the terminal transition.
    pub fn update(&mut self, id: StepId, patch: StepPatch) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == id) else {
            debug!(step = %id, "update dropped, step no longer exists");
            return false;
        };
        if patch.is_empty() {
            return true;
        }

        if let Some(description) = patch.description {
            step.description = description;
        }
        match patch.task {
            Some(TaskPatch::Bind { task, param_specs }) => step.bind_task(task, param_specs),
            Some(TaskPatch::Clear) => step.clear_task(),
            None => {}
        }
        if let Some(values) = patch.bound_values {
            step.merge_bound_values(values);
        }
        if step.status != ExecutionStatus::Running {
            step.rearm();
        }
        true
    }

    /// Clear back to a single default step.
    pub fn reset(&mut self) {
        self.steps = vec![Step::new()];
    }

    /// Replace the contents with pre-built steps (incident or draft
    /// seeding). An empty input seeds one default step.
    pub fn seed(&mut self, steps: Vec<Step>) {
        self.steps = if steps.is_empty() {
            vec![Step::new()]
        } else {
            steps
        };
    }
}

impl Default for StepSequence {
    fn default() -> Self {
        Self::new()
    }
}
