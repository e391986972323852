//! HTTP client for the remediation backend.
//!
//! One client implements every HTTP-backed capability; the backend exposes a
//! plain JSON REST surface and this module stays deliberately thin over it.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::CapabilityError;
use crate::traits::{
    DocumentParser, IncidentResolver, ProcedureGenerator, ProcedureStore, TaskCatalog,
    TaskExecutor, TaskGenerator, TaskMatcher,
};
use crate::types::{
    ExecutionOutcome, ExecutionRequest, GenerateTaskRequest, Generation, IncidentResolution,
    ProcedureDoc, ProcedureDraft, TaskDraft, TaskMatch, WorkerTask,
};

/// HTTP client for the remediation service.
#[derive(Clone, Debug)]
pub struct RemoteService {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteService {
    /// Create a client against the given base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CapabilityError> {
        let url = self.url(endpoint);
        debug!(%url, "GET");
        let res = self.http.get(&url).send().await?;
        Self::decode(res).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, CapabilityError> {
        let url = self.url(endpoint);
        debug!(%url, "POST");
        let res = self.http.post(&url).json(body).send().await?;
        Self::decode(res).await
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, CapabilityError> {
        let url = self.url(endpoint);
        debug!(%url, "PUT");
        let res = self.http.put(&url).json(body).send().await?;
        Self::decode(res).await
    }

    async fn delete_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CapabilityError> {
        let url = self.url(endpoint);
        debug!(%url, "DELETE");
        let res = self.http.delete(&url).send().await?;
        Self::decode(res).await
    }

    async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, CapabilityError> {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CapabilityError::NotFound(body));
        }
        if !status.is_success() {
            return Err(CapabilityError::Status {
                code: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| CapabilityError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct TaskListResponse {
    tasks: Vec<WorkerTask>,
}

#[derive(Deserialize)]
struct ProcedureListResponse {
    procedures: Vec<ProcedureDoc>,
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

/// Match response; both fields are null when no confident match exists.
#[derive(Deserialize)]
struct MatchResponse {
    task_id: Option<String>,
    task_name: Option<String>,
}

#[derive(Deserialize)]
struct Empty {}

#[async_trait::async_trait]
impl TaskCatalog for RemoteService {
    async fn list(&self) -> Result<Vec<WorkerTask>, CapabilityError> {
        let res: TaskListResponse = self.get_json("/api/tasks").await?;
        Ok(res.tasks)
    }

    async fn get(&self, task_id: &str) -> Result<WorkerTask, CapabilityError> {
        self.get_json(&format!("/api/tasks/{}", task_id)).await
    }

    async fn add(&self, task: &WorkerTask) -> Result<WorkerTask, CapabilityError> {
        self.post_json("/api/tasks", task).await
    }

    async fn update(&self, task: &WorkerTask) -> Result<(), CapabilityError> {
        let _: Empty = self
            .put_json(&format!("/api/tasks/{}", task.id), task)
            .await?;
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> Result<(), CapabilityError> {
        let _: Empty = self.delete_json(&format!("/api/tasks/{}", task_id)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskMatcher for RemoteService {
    async fn match_task(&self, description: &str) -> Result<Option<TaskMatch>, CapabilityError> {
        let res: MatchResponse = self
            .post_json("/api/tasks/match", &json!({ "description": description }))
            .await?;
        match (res.task_id, res.task_name) {
            (Some(task_id), Some(task_name)) => Ok(Some(TaskMatch { task_id, task_name })),
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl TaskGenerator for RemoteService {
    async fn generate_task(
        &self,
        request: &GenerateTaskRequest,
    ) -> Result<TaskDraft, CapabilityError> {
        self.post_json("/api/tasks/generate", request).await
    }
}

#[async_trait::async_trait]
impl ProcedureGenerator for RemoteService {
    async fn generate_procedure(
        &self,
        raw_text: &str,
        answers: Option<&[String]>,
    ) -> Result<Generation, CapabilityError> {
        self.post_json(
            "/api/procedures/generate",
            &json!({ "raw_text": raw_text, "answers": answers }),
        )
        .await
    }
}

#[async_trait::async_trait]
impl DocumentParser for RemoteService {
    async fn parse(&self, raw_text: &str) -> Result<ProcedureDraft, CapabilityError> {
        self.post_json("/api/procedures/parse", &json!({ "raw_text": raw_text }))
            .await
    }
}

#[async_trait::async_trait]
impl IncidentResolver for RemoteService {
    async fn resolve(
        &self,
        incident_number: &str,
    ) -> Result<IncidentResolution, CapabilityError> {
        self.get_json(&format!("/api/incidents/{}/resolution", incident_number))
            .await
    }
}

#[async_trait::async_trait]
impl TaskExecutor for RemoteService {
    async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, CapabilityError> {
        self.post_json("/api/execute", request).await
    }
}

#[async_trait::async_trait]
impl ProcedureStore for RemoteService {
    async fn upload(&self, doc: &ProcedureDoc) -> Result<String, CapabilityError> {
        let res: UploadResponse = self.post_json("/api/procedures", doc).await?;
        Ok(res.id)
    }

    async fn delete(&self, procedure_id: &str) -> Result<(), CapabilityError> {
        let _: Empty = self
            .delete_json(&format!("/api/procedures/{}", procedure_id))
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ProcedureDoc>, CapabilityError> {
        let res: ProcedureListResponse = self.get_json("/api/procedures").await?;
        Ok(res.procedures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = RemoteService::new("http://localhost:8080/", Duration::from_secs(5));
        assert_eq!(client.url("/api/tasks"), "http://localhost:8080/api/tasks");
    }

    #[test]
    fn test_match_response_absent_fields() {
        let res: MatchResponse = serde_json::from_str(r#"{"task_id":null,"task_name":null}"#)
            .expect("parse match response");
        assert!(res.task_id.is_none());
        assert!(res.task_name.is_none());
    }
}
