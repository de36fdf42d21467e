//! Automation service HTTP client
//!
//! Thin typed wrapper over the service REST API. The session core talks to
//! it through the `AutomationBackend` trait so tests can inject a fake.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::types::{
    CancelWorkflowResponse, Project, Scenario, StartWorkflowRequest, StartWorkflowResponse,
    WorkflowStatusData,
};

/// Operations of the remote automation service used by the session core
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn start_workflow(&self, request: &StartWorkflowRequest) -> Result<StartWorkflowResponse>;
    async fn workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatusData>;
    async fn cancel_workflow(&self, workflow_id: &str) -> Result<CancelWorkflowResponse>;
}

/// HTTP client for the automation service
pub struct AutomationClient {
    /// Base URL including the API prefix (e.g. "http://localhost:3001/api")
    base_url: String,
    client: reqwest::Client,
}

impl AutomationClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// List all projects
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let url = format!("{}/projects", self.base_url);
        let value = self.get_json(&url).await?;
        let list = extract_list(value, &["projects", "data"]);
        serde_json::from_value(list).context("Failed to parse project list")
    }

    /// Fetch a single project
    pub async fn get_project(&self, project_id: u64) -> Result<Project> {
        let url = format!("{}/projects/{}", self.base_url, project_id);
        let mut value = extract_data(self.get_json(&url).await?);
        if let Some(project) = value.get_mut("project") {
            value = project.take();
        }
        serde_json::from_value(value).context("Failed to parse project")
    }

    /// List the automated scenarios of a project
    pub async fn list_scenarios(&self, project_id: u64) -> Result<Vec<Scenario>> {
        let url = format!("{}/scenarios", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("projectId", project_id.to_string()),
                ("isAutomated", "true".to_string()),
            ])
            .send()
            .await
            .context("Failed to reach the automation service")?;
        let value = Self::json_or_error(response).await?;
        let list = extract_list(value, &["scenarios", "data"]);
        let scenarios: Vec<Scenario> =
            serde_json::from_value(list).context("Failed to parse scenario list")?;
        // The service is expected to filter, but older builds return everything
        Ok(scenarios.into_iter().filter(|s| s.is_automated).collect())
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach the automation service")?;
        Self::json_or_error(response).await
    }

    async fn json_or_error(response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            anyhow::bail!("{}", Self::error_message(response).await);
        }
        response
            .json()
            .await
            .context("Failed to parse service response")
    }

    /// Pull the `error` field out of a failed response body, falling back
    /// to the HTTP status line
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(|e| e.as_str())
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("HTTP {}", status)),
            Err(_) => format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl AutomationBackend for AutomationClient {
    async fn start_workflow(&self, request: &StartWorkflowRequest) -> Result<StartWorkflowResponse> {
        let url = format!("{}/automation/start", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to reach the automation service")?;
        if !response.status().is_success() {
            anyhow::bail!("{}", Self::error_message(response).await);
        }
        response
            .json()
            .await
            .context("Failed to parse start response")
    }

    async fn workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatusData> {
        let url = format!("{}/automation/status/{}", self.base_url, workflow_id);
        let value = self.get_json(&url).await?;
        status_from_value(value)
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<CancelWorkflowResponse> {
        let url = format!("{}/automation/cancel/{}", self.base_url, workflow_id);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .context("Failed to reach the automation service")?;
        if !response.status().is_success() {
            anyhow::bail!("{}", Self::error_message(response).await);
        }
        response
            .json()
            .await
            .context("Failed to parse cancel response")
    }
}

/// Unwrap the `{success, data}` envelope; older builds return a bare object
fn extract_data(mut value: Value) -> Value {
    if let Some(data) = value.get_mut("data") {
        return data.take();
    }
    value
}

/// Pull a list out of a response that may be a bare array or wrapped
/// under one of the given keys; anything else becomes an empty list
fn extract_list(mut value: Value, keys: &[&str]) -> Value {
    if value.is_array() {
        return value;
    }
    for key in keys {
        if let Some(list) = value.get_mut(*key) {
            if list.is_array() {
                return list.take();
            }
        }
    }
    Value::Array(Vec::new())
}

fn status_from_value(value: Value) -> Result<WorkflowStatusData> {
    serde_json::from_value(extract_data(value)).context("Failed to parse workflow status")
}
