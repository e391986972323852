//! Procedure file loading.
//!
//! Procedures are assembled interactively in the editor, but operators also
//! keep them as YAML files. A file names its steps and, optionally, the
//! catalog task each one binds to plus any pre-filled parameter values:
//!
//! ```yaml
//! title: Web tier outage
//! issue: nginx returns 502 on the public LB
//! tags: [web, nginx]
//! steps:
//!   - description: restart the web server
//!     task: restart_web_server
//!     params:
//!       host: web-01
//!   - description: notify the on-call channel
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use runbook_engine::{ProcedureSession, StepPatch, TaskRef};
use runbook_services::TaskCatalog;

#[derive(Debug, Deserialize)]
pub struct ProcedureFile {
    pub title: String,
    pub issue: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<FileStep>,
}

#[derive(Debug, Deserialize)]
pub struct FileStep {
    pub description: String,
    /// Catalog task name to bind, if the step is automated.
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ProcedureFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read procedure file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parse procedure file {}", path.display()))
    }
}

/// Seed a session from a procedure file, resolving task names through the
/// catalog so bound steps carry their parameter specs.
pub async fn seed_session(
    session: &mut ProcedureSession,
    file: ProcedureFile,
    catalog: &dyn TaskCatalog,
) -> Result<()> {
    session.set_title(file.title);
    session.set_issue(file.issue);
    session.set_tags(file.tags);

    let tasks = catalog.list().await.context("list catalog tasks")?;

    let mut previous = None;
    for (index, file_step) in file.steps.into_iter().enumerate() {
        let id = match previous {
            // The session starts with one default step; reuse it.
            None => session.steps().lock().await.ids()[0],
            Some(last) => session
                .insert_step_after(last)
                .await
                .context("insert step")?,
        };
        previous = Some(id);

        session
            .update_step(id, StepPatch::description(file_step.description.clone()))
            .await;

        if let Some(task_name) = file_step.task {
            let task = tasks
                .iter()
                .find(|t| t.name == task_name)
                .with_context(|| {
                    format!(
                        "step {}: task '{}' not found in the catalog",
                        index + 1,
                        task_name
                    )
                })?;
            session
                .update_step(
                    id,
                    StepPatch::bind(
                        TaskRef {
                            id: task.id.clone(),
                            name: task.name.clone(),
                        },
                        task.param_specs.clone(),
                    ),
                )
                .await;
            if !file_step.params.is_empty() {
                session
                    .update_step(id, StepPatch::values(file_step.params))
                    .await;
            }
        }
    }

    Ok(())
}
