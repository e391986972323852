//! AI-assisted step operations: rematch and task generation.
//!
//! Both operations run against a step identified by its stable identity,
//! mark the step busy before dispatch, and clear the flag on every
//! completion path. Results arriving for a step that no longer exists are
//! discarded silently; the sequence may have been edited or reset while
//! the capability call was in flight.

use std::sync::Arc;

use tracing::{debug, info, warn};

use runbook_services::types::{GenerateTaskRequest, TaskDraft, WorkerTask};
use runbook_services::{TaskCatalog, TaskGenerator, TaskMatcher};

use crate::error::{EngineError, EngineResult};
use crate::sequence::SharedSteps;
use crate::step::{ExecutionStatus, StepActivity, StepId, TaskRef};

/// Context handed to task generation: the procedure header plus every step
/// description, so the generator sees the whole remediation flow.
#[derive(Debug, Clone, Default)]
pub struct GenerateContext {
    pub title: String,
    pub issue: String,
}

/// Adapter over the matcher/generator capabilities.
pub struct AssistAdapter {
    matcher: Arc<dyn TaskMatcher>,
    generator: Arc<dyn TaskGenerator>,
    catalog: Arc<dyn TaskCatalog>,
}

impl AssistAdapter {
    pub fn new(
        matcher: Arc<dyn TaskMatcher>,
        generator: Arc<dyn TaskGenerator>,
        catalog: Arc<dyn TaskCatalog>,
    ) -> Self {
        Self {
            matcher,
            generator,
            catalog,
        }
    }

    /// Mark the step busy with `activity`, rejecting conflicting operations.
    async fn begin(
        &self,
        steps: &SharedSteps,
        id: StepId,
        activity: StepActivity,
    ) -> EngineResult<()> {
        let mut seq = steps.lock().await;
        let step = seq.get_mut(id).ok_or(EngineError::StepNotFound(id))?;
        if step.activity.is_busy() {
            return Err(EngineError::StepBusy(id));
        }
        if step.status == ExecutionStatus::Running {
            return Err(EngineError::StepRunning(id));
        }
        step.activity = activity;
        Ok(())
    }

    /// Re-match the step's description against the task catalog.
    ///
    /// On a confident match the matched task (and its parameter specs,
    /// fetched from the catalog) is bound and previously bound values are
    /// cleared, since the spec set may have changed. Returns `None` when the
    /// matcher has no confident answer or the step vanished meanwhile.
    pub async fn rematch(
        &self,
        steps: &SharedSteps,
        id: StepId,
    ) -> EngineResult<Option<TaskRef>> {
        self.begin(steps, id, StepActivity::Matching).await?;

        let description = {
            let seq = steps.lock().await;
            match seq.get(id) {
                Some(step) => step.description.clone(),
                None => return Ok(None),
            }
        };

        // Suspension points: both capability calls run without the lock.
        let matched = self.matcher.match_task(&description).await;
        let resolved = match matched {
            Ok(Some(m)) => match self.catalog.get(&m.task_id).await {
                Ok(task) => Ok(Some((m, task.param_specs))),
                Err(e) => Err(e),
            },
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        // One lock scope for the completion: clear busy and apply, or
        // discard silently when the step no longer exists.
        let mut seq = steps.lock().await;
        let Some(step) = seq.get_mut(id) else {
            debug!(step = %id, "match result arrived for a removed step, discarded");
            return Ok(None);
        };
        step.activity = StepActivity::Idle;

        match resolved {
            Ok(Some((m, param_specs))) => {
                let task = TaskRef {
                    id: m.task_id,
                    name: m.task_name,
                };
                info!(step = %id, task = %task.name, "rematched step");
                step.bind_task(task.clone(), param_specs);
                step.rearm();
                Ok(Some(task))
            }
            Ok(None) => {
                debug!(step = %id, "no confident match");
                Ok(None)
            }
            Err(e) => {
                warn!(step = %id, error = %e, "rematch failed");
                Err(EngineError::Capability(e))
            }
        }
    }

    /// Generate a draft worker task for the step.
    ///
    /// The draft is returned for explicit review and confirmation; nothing
    /// is bound here.
    pub async fn generate(
        &self,
        steps: &SharedSteps,
        id: StepId,
        context: &GenerateContext,
    ) -> EngineResult<TaskDraft> {
        self.begin(steps, id, StepActivity::Generating).await?;

        let request = {
            let seq = steps.lock().await;
            let all_step_descriptions = seq.iter().map(|s| s.description.clone()).collect();
            let target_description = seq
                .get(id)
                .map(|s| s.description.clone())
                .unwrap_or_default();
            GenerateTaskRequest {
                title: context.title.clone(),
                issue: context.issue.clone(),
                all_step_descriptions,
                target_description,
            }
        };

        let result = self.generator.generate_task(&request).await;
        {
            let mut seq = steps.lock().await;
            match seq.get_mut(id) {
                Some(step) => step.activity = StepActivity::Idle,
                None => {
                    debug!(step = %id, "generation finished for a removed step");
                }
            }
        }

        match result {
            Ok(draft) => {
                info!(step = %id, task = %draft.name, "generated draft task");
                Ok(draft)
            }
            Err(e) => {
                warn!(step = %id, error = %e, "task generation failed");
                Err(EngineError::Capability(e))
            }
        }
    }

    /// Bind a confirmed draft: register it in the catalog and bind the
    /// resulting task to the step. The explicit confirmation counterpart of
    /// [`Self::generate`].
    pub async fn confirm_draft(
        &self,
        steps: &SharedSteps,
        id: StepId,
        draft: TaskDraft,
    ) -> EngineResult<TaskRef> {
        let registered = self
            .catalog
            .add(&draft_to_task(&draft))
            .await
            .map_err(EngineError::Capability)?;

        let task = TaskRef {
            id: registered.id.clone(),
            name: registered.name.clone(),
        };
        let mut seq = steps.lock().await;
        let step = seq.get_mut(id).ok_or(EngineError::StepNotFound(id))?;
        step.bind_task(task.clone(), registered.param_specs);
        step.rearm();
        Ok(task)
    }
}

fn draft_to_task(draft: &TaskDraft) -> WorkerTask {
    WorkerTask {
        id: String::new(),
        name: draft.name.clone(),
        description: String::new(),
        tags: Vec::new(),
        content: draft.content.clone(),
        kind: Default::default(),
        param_specs: draft.param_specs.clone(),
    }
}
