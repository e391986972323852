//! The owned editing session for one procedure.
//!
//! A session holds the procedure header, the shared step sequence, and the
//! execution/assist machinery around it. It is the single writer surface:
//! presentation layers call the operations here instead of reaching into
//! shared state. Sessions are transient; nothing survives the process.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use runbook_services::types::{DocStep, ProcedureDoc, ProcedureDraft, TaskDraft};
use runbook_services::{
    IncidentResolver, ProcedureStore, TaskCatalog, TaskExecutor, TaskGenerator, TaskMatcher,
};

use crate::assist::{AssistAdapter, GenerateContext};
use crate::coordinator::{ExecutionCoordinator, ExecutionRun, RunReport, StatusEvent};
use crate::debounce::{EditDebouncer, PendingEdit};
use crate::error::{EngineError, EngineResult};
use crate::graph::WorkflowGraph;
use crate::sequence::{SharedSteps, StepSequence};
use crate::step::{Step, StepId, StepPatch, TaskRef};

/// Header of the procedure under assembly.
#[derive(Debug, Clone, Default)]
pub struct ProcedureMeta {
    pub title: String,
    pub issue: String,
    pub tags: Vec<String>,
}

/// Editing and execution session for one procedure.
pub struct ProcedureSession {
    meta: ProcedureMeta,
    steps: SharedSteps,
    coordinator: ExecutionCoordinator,
    assist: AssistAdapter,
    catalog: Arc<dyn TaskCatalog>,
    debouncer: EditDebouncer,
}

impl ProcedureSession {
    /// Create a session seeded with one default step.
    pub fn new(
        matcher: Arc<dyn TaskMatcher>,
        generator: Arc<dyn TaskGenerator>,
        catalog: Arc<dyn TaskCatalog>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            meta: ProcedureMeta::default(),
            steps: StepSequence::new().into_shared(),
            coordinator: ExecutionCoordinator::new(executor),
            assist: AssistAdapter::new(matcher, generator, Arc::clone(&catalog)),
            catalog,
            debouncer: EditDebouncer::default(),
        }
    }

    pub fn meta(&self) -> &ProcedureMeta {
        &self.meta
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.meta.title = title.into();
    }

    pub fn set_issue(&mut self, issue: impl Into<String>) {
        self.meta.issue = issue.into();
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.meta.tags = tags;
    }

    /// Shared handle to the step sequence.
    pub fn steps(&self) -> &SharedSteps {
        &self.steps
    }

    pub fn active_run(&self) -> Option<ExecutionRun> {
        self.coordinator.active_run()
    }

    /// Subscribe to per-step execution status transitions.
    pub fn status_events(&self) -> tokio::sync::broadcast::Receiver<StatusEvent> {
        self.coordinator.subscribe()
    }

    /// Current graph projection of the sequence.
    pub async fn graph(&self) -> WorkflowGraph {
        let seq = self.steps.lock().await;
        WorkflowGraph::project(&seq)
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    pub async fn append_step(&self) -> StepId {
        self.steps.lock().await.append()
    }

    pub async fn insert_step_after(&self, id: StepId) -> EngineResult<StepId> {
        self.steps.lock().await.insert_after(id)
    }

    pub async fn delete_step(&mut self, id: StepId) -> EngineResult<()> {
        self.steps.lock().await.delete(id)?;
        self.debouncer.clear(id);
        Ok(())
    }

    pub async fn update_step(&self, id: StepId, patch: StepPatch) -> bool {
        self.steps.lock().await.update(id, patch)
    }

    /// Apply a description edit and note it for debounced propagation.
    ///
    /// The edit itself lands immediately; the rematch it implies fires only
    /// after the quiet period, via [`Self::propagate_edits`].
    pub async fn edit_description(
        &mut self,
        id: StepId,
        description: impl Into<String>,
        now: Instant,
    ) -> bool {
        let description = description.into();
        let applied = self
            .steps
            .lock()
            .await
            .update(id, StepPatch::description(description.clone()));
        if applied {
            self.debouncer.note(id, description, now);
        }
        applied
    }

    /// Re-match every step whose description edit has settled.
    ///
    /// Steps deleted since the edit are skipped via the usual stale guard;
    /// any other conflict (busy, running) surfaces in the per-step results.
    pub async fn propagate_edits(&mut self, now: Instant) -> Vec<(StepId, EngineResult<Option<TaskRef>>)> {
        let due: Vec<PendingEdit> = self.debouncer.drain_due(now);
        let mut results = Vec::with_capacity(due.len());
        for edit in due {
            match self.assist.rematch(&self.steps, edit.step_id).await {
                Err(EngineError::StepNotFound(_)) => {}
                result => results.push((edit.step_id, result)),
            }
        }
        results
    }

    // ------------------------------------------------------------------
    // Assist
    // ------------------------------------------------------------------

    pub async fn rematch_step(&self, id: StepId) -> EngineResult<Option<TaskRef>> {
        self.assist.rematch(&self.steps, id).await
    }

    pub async fn generate_task(&self, id: StepId) -> EngineResult<TaskDraft> {
        let context = GenerateContext {
            title: self.meta.title.clone(),
            issue: self.meta.issue.clone(),
        };
        self.assist.generate(&self.steps, id, &context).await
    }

    pub async fn confirm_draft(&self, id: StepId, draft: TaskDraft) -> EngineResult<TaskRef> {
        self.assist.confirm_draft(&self.steps, id, draft).await
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    pub async fn execute_step(&self, id: StepId) -> EngineResult<runbook_services::types::ExecutionOutcome> {
        self.coordinator.execute_step(&self.steps, id).await
    }

    pub async fn execute_all(&self) -> EngineResult<RunReport> {
        self.coordinator.execute_all(&self.steps).await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Clear back to an empty header and a single default step.
    pub async fn reset(&mut self) {
        self.meta = ProcedureMeta::default();
        self.steps.lock().await.reset();
        self.debouncer.clear_all();
    }

    /// Validate the assembled procedure for upload.
    pub async fn validate(&self) -> EngineResult<()> {
        if self.meta.title.trim().is_empty() {
            return Err(EngineError::Validation("procedure title is empty".to_string()));
        }
        if self.meta.issue.trim().is_empty() {
            return Err(EngineError::Validation(
                "procedure issue summary is empty".to_string(),
            ));
        }
        let seq = self.steps.lock().await;
        for (index, step) in seq.iter().enumerate() {
            if step.description.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "step {} has an empty description",
                    index + 1
                )));
            }
        }
        Ok(())
    }

    /// Upload the assembled procedure and reset the session on success.
    pub async fn upload(&mut self, store: &dyn ProcedureStore) -> EngineResult<String> {
        self.validate().await?;

        let doc = {
            let seq = self.steps.lock().await;
            ProcedureDoc {
                id: None,
                title: self.meta.title.clone(),
                issue: self.meta.issue.clone(),
                tags: self.meta.tags.clone(),
                steps: seq
                    .iter()
                    .map(|step| DocStep {
                        description: step.description.clone(),
                        task_id: step.task_ref.as_ref().map(|t| t.id.clone()),
                        task_name: step.task_ref.as_ref().map(|t| t.name.clone()),
                        bound_values: step.bound_values.clone(),
                    })
                    .collect(),
            }
        };

        let id = store.upload(&doc).await.map_err(EngineError::Capability)?;
        info!(procedure = %doc.title, id = %id, "uploaded procedure");
        self.reset().await;
        Ok(id)
    }

    /// Seed the session from a live incident's resolved steps.
    pub async fn load_incident(
        &mut self,
        resolver: &dyn IncidentResolver,
        incident_number: &str,
    ) -> EngineResult<()> {
        let resolution = resolver
            .resolve(incident_number)
            .await
            .map_err(EngineError::Capability)?;

        self.meta = ProcedureMeta {
            title: resolution.incident.short_description.clone(),
            issue: resolution.incident.description.clone(),
            tags: Vec::new(),
        };

        let steps = resolution
            .steps
            .into_iter()
            .map(|resolved| {
                let mut step = Step::with_description(resolved.description);
                if let (Some(id), Some(name)) = (resolved.task_id, resolved.task_name) {
                    step.bind_task(TaskRef { id, name }, resolved.param_specs);
                    step.merge_bound_values(resolved.bound_values);
                }
                step
            })
            .collect();

        self.steps.lock().await.seed(steps);
        self.debouncer.clear_all();
        info!(incident = %incident_number, "seeded session from incident");
        Ok(())
    }

    /// Seed the session from a parsed or generated procedure draft.
    ///
    /// Matched tasks carry only an id and name in the draft; parameter
    /// specs are fetched from the catalog so binding stays complete.
    pub async fn seed_from_draft(&mut self, draft: ProcedureDraft) -> EngineResult<()> {
        self.meta = ProcedureMeta {
            title: draft.title,
            issue: draft.issue,
            tags: Vec::new(),
        };

        let mut steps = Vec::with_capacity(draft.steps.len());
        for draft_step in draft.steps {
            let mut step = Step::with_description(draft_step.description);
            if let (Some(id), Some(name)) = (draft_step.task_id, draft_step.task_name) {
                let param_specs = match self.catalog.get(&id).await {
                    Ok(task) => task.param_specs,
                    // A draft can reference a task that has since been
                    // removed from the catalog; keep the step manual.
                    Err(_) => {
                        steps.push(step);
                        continue;
                    }
                };
                step.bind_task(TaskRef { id, name }, param_specs);
            }
            steps.push(step);
        }

        self.steps.lock().await.seed(steps);
        self.debouncer.clear_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runbook_services::types::{
        ExecutionOutcome, ExecutionRequest, GenerateTaskRequest, IncidentData,
        IncidentResolution, ParamKind, ParamSpec, ResolvedStep, TaskMatch, WorkerTask,
    };
    use runbook_services::CapabilityError;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct NullMatcher;

    #[async_trait]
    impl TaskMatcher for NullMatcher {
        async fn match_task(
            &self,
            description: &str,
        ) -> Result<Option<TaskMatch>, CapabilityError> {
            if description.contains("restart") {
                Ok(Some(TaskMatch {
                    task_id: "42".to_string(),
                    task_name: "restart_web_server".to_string(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    struct NullGenerator;

    #[async_trait]
    impl TaskGenerator for NullGenerator {
        async fn generate_task(
            &self,
            _request: &GenerateTaskRequest,
        ) -> Result<TaskDraft, CapabilityError> {
            Ok(TaskDraft {
                name: "draft".to_string(),
                content: "true".to_string(),
                param_specs: vec![],
            })
        }
    }

    struct OneTaskCatalog;

    #[async_trait]
    impl TaskCatalog for OneTaskCatalog {
        async fn list(&self) -> Result<Vec<WorkerTask>, CapabilityError> {
            Ok(vec![])
        }

        async fn get(&self, task_id: &str) -> Result<WorkerTask, CapabilityError> {
            if task_id == "42" {
                Ok(WorkerTask {
                    id: "42".to_string(),
                    name: "restart_web_server".to_string(),
                    description: String::new(),
                    tags: vec![],
                    content: "systemctl restart nginx".to_string(),
                    kind: Default::default(),
                    param_specs: vec![ParamSpec::required("host", ParamKind::String)],
                })
            } else {
                Err(CapabilityError::NotFound(task_id.to_string()))
            }
        }

        async fn add(&self, task: &WorkerTask) -> Result<WorkerTask, CapabilityError> {
            Ok(task.clone())
        }

        async fn update(&self, _task: &WorkerTask) -> Result<(), CapabilityError> {
            Ok(())
        }

        async fn delete(&self, _task_id: &str) -> Result<(), CapabilityError> {
            Ok(())
        }
    }

    struct OkExecutor;

    #[async_trait]
    impl TaskExecutor for OkExecutor {
        async fn execute(
            &self,
            request: &ExecutionRequest,
        ) -> Result<ExecutionOutcome, CapabilityError> {
            Ok(ExecutionOutcome::success(format!("ran {}", request.task_name)))
        }
    }

    /// Store that records uploads and can be told to fail.
    struct RecordingStore {
        uploads: StdMutex<Vec<ProcedureDoc>>,
        fail: bool,
    }

    #[async_trait]
    impl ProcedureStore for RecordingStore {
        async fn upload(&self, doc: &ProcedureDoc) -> Result<String, CapabilityError> {
            if self.fail {
                return Err(CapabilityError::Http("store unreachable".to_string()));
            }
            self.uploads
                .lock()
                .expect("test store lock")
                .push(doc.clone());
            Ok("proc-1".to_string())
        }

        async fn delete(&self, _procedure_id: &str) -> Result<(), CapabilityError> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ProcedureDoc>, CapabilityError> {
            Ok(vec![])
        }
    }

    fn session() -> ProcedureSession {
        ProcedureSession::new(
            Arc::new(NullMatcher),
            Arc::new(NullGenerator),
            Arc::new(OneTaskCatalog),
            Arc::new(OkExecutor),
        )
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_header_and_descriptions() {
        let mut s = session();
        assert!(matches!(
            s.validate().await,
            Err(EngineError::Validation(_))
        ));

        s.set_title("Web outage runbook");
        s.set_issue("nginx returns 502");
        let err = s.validate().await.unwrap_err();
        match err {
            EngineError::Validation(msg) => assert!(msg.contains("step 1")),
            other => panic!("expected Validation, got {other}"),
        }

        let id = s.steps().lock().await.ids()[0];
        s.update_step(id, StepPatch::description("restart the web server"))
            .await;
        assert!(s.validate().await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_resets_session_on_success() {
        let mut s = session();
        s.set_title("Web outage runbook");
        s.set_issue("nginx returns 502");
        let id = s.steps().lock().await.ids()[0];
        s.update_step(id, StepPatch::description("restart the web server"))
            .await;

        let store = RecordingStore {
            uploads: StdMutex::new(vec![]),
            fail: false,
        };
        let uploaded = s.upload(&store).await.unwrap();
        assert_eq!(uploaded, "proc-1");

        let uploads = store.uploads.lock().expect("test store lock");
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].steps.len(), 1);

        // Session is back to a blank single-step state.
        assert!(s.meta().title.is_empty());
        let seq = s.steps().lock().await;
        assert_eq!(seq.len(), 1);
        assert!(seq.iter().next().unwrap().description.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_session_intact() {
        let mut s = session();
        s.set_title("Web outage runbook");
        s.set_issue("nginx returns 502");
        let id = s.steps().lock().await.ids()[0];
        s.update_step(id, StepPatch::description("restart the web server"))
            .await;

        let store = RecordingStore {
            uploads: StdMutex::new(vec![]),
            fail: true,
        };
        let result = s.upload(&store).await;
        assert!(matches!(result, Err(EngineError::Capability(_))));
        assert_eq!(s.meta().title, "Web outage runbook");
        assert_eq!(s.steps().lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_edit_propagation_is_debounced() {
        let mut s = session();
        let id = s.steps().lock().await.ids()[0];
        let start = Instant::now();

        s.edit_description(id, "restart the web server", start).await;
        // Still inside the quiet period: nothing propagates.
        let results = s.propagate_edits(start + Duration::from_millis(100)).await;
        assert!(results.is_empty());
        assert!(s.steps().lock().await.get(id).unwrap().task_ref.is_none());

        // After the quiet period the rematch fires and binds.
        let results = s.propagate_edits(start + Duration::from_secs(1)).await;
        assert_eq!(results.len(), 1);
        let seq = s.steps().lock().await;
        assert_eq!(
            seq.get(id).unwrap().task_ref.as_ref().unwrap().name,
            "restart_web_server"
        );
    }

    #[tokio::test]
    async fn test_propagation_skips_deleted_steps() {
        let mut s = session();
        let id = s.steps().lock().await.ids()[0];
        s.append_step().await;
        let start = Instant::now();

        s.edit_description(id, "restart the web server", start).await;
        s.delete_step(id).await.unwrap();

        let results = s.propagate_edits(start + Duration::from_secs(1)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_load_incident_seeds_steps_and_values() {
        struct FixedResolver;

        #[async_trait]
        impl IncidentResolver for FixedResolver {
            async fn resolve(
                &self,
                incident_number: &str,
            ) -> Result<IncidentResolution, CapabilityError> {
                let mut bound = BTreeMap::new();
                bound.insert("host".to_string(), "web-01".to_string());
                Ok(IncidentResolution {
                    incident: IncidentData {
                        number: incident_number.to_string(),
                        short_description: "web tier down".to_string(),
                        description: "nginx not responding on web-01".to_string(),
                        opened_at: None,
                    },
                    steps: vec![
                        ResolvedStep {
                            description: "restart the web server".to_string(),
                            task_id: Some("42".to_string()),
                            task_name: Some("restart_web_server".to_string()),
                            param_specs: vec![ParamSpec::required("host", ParamKind::String)],
                            bound_values: bound,
                        },
                        ResolvedStep {
                            description: "notify the on-call channel".to_string(),
                            task_id: None,
                            task_name: None,
                            param_specs: vec![],
                            bound_values: BTreeMap::new(),
                        },
                    ],
                })
            }
        }

        let mut s = session();
        s.load_incident(&FixedResolver, "INC0012345").await.unwrap();

        assert_eq!(s.meta().title, "web tier down");
        let seq = s.steps().lock().await;
        assert_eq!(seq.len(), 2);
        let first = seq.iter().next().unwrap();
        assert_eq!(
            first.bound_values.get("host").map(String::as_str),
            Some("web-01")
        );
        let second = seq.iter().nth(1).unwrap();
        assert!(second.task_ref.is_none());
    }

    #[tokio::test]
    async fn test_seed_from_draft_fetches_specs() {
        use runbook_services::types::DraftStep;

        let mut s = session();
        s.seed_from_draft(ProcedureDraft {
            title: "Web outage".to_string(),
            issue: "502s".to_string(),
            steps: vec![
                DraftStep {
                    description: "restart the web server".to_string(),
                    task_id: Some("42".to_string()),
                    task_name: Some("restart_web_server".to_string()),
                },
                DraftStep {
                    description: "page networking".to_string(),
                    task_id: Some("gone".to_string()),
                    task_name: Some("page_networking".to_string()),
                },
            ],
        })
        .await
        .unwrap();

        let seq = s.steps().lock().await;
        let first = seq.iter().next().unwrap();
        assert_eq!(first.param_specs[0].name, "host");
        // The vanished catalog entry degrades to a manual step.
        let second = seq.iter().nth(1).unwrap();
        assert!(second.task_ref.is_none());
    }
}
