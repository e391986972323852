//! Service configuration loaded from environment variables.

use serde::Deserialize;

/// Capability-layer configuration.
///
/// Environment variables are prefixed with `RUNBOOK_`:
/// - `RUNBOOK_SERVICE_URL`: base URL of the remediation backend
///   (default: "http://127.0.0.1:8080")
/// - `RUNBOOK_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 120)
/// - `RUNBOOK_SHELL`: shell binary for local execution (default: "bash")
/// - `RUNBOOK_TASK_DEADLINE_SECS`: local task kill deadline (optional)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_shell")]
    pub shell: String,

    /// Kill local task processes after this many seconds.
    #[serde(default)]
    pub task_deadline_secs: Option<u64>,
}

fn default_service_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_shell() -> String {
    "bash".to_string()
}

impl ServiceConfig {
    /// Load configuration from `RUNBOOK_`-prefixed environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("RUNBOOK_").from_env::<ServiceConfig>()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            request_timeout_secs: default_request_timeout(),
            shell: default_shell(),
            task_deadline_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.service_url, "http://127.0.0.1:8080");
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.shell, "bash");
        assert!(config.task_deadline_secs.is_none());
    }
}
