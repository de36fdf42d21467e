//! Wire types for the automation service REST API

use serde::{Deserialize, Serialize};

/// Body for POST /automation/start
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowRequest {
    pub project_id: u64,
    pub scenario_ids: Vec<u64>,
    pub run_tests: bool,
    pub skip_element_discovery: bool,
    pub skip_script_generation: bool,
    pub headless: bool,
}

/// Response for POST /automation/start
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartWorkflowResponse {
    pub success: bool,
    pub message: Option<String>,
    pub workflow_id: Option<String>,
}

/// Response for POST /automation/cancel/{workflowId}
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CancelWorkflowResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Remote workflow status vocabulary
///
/// Reported case-insensitively by the service; `ERROR` is a failure
/// spelling used by older builds. Unknown values are non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Pending,
    Analyzing,
    Discovering,
    Generating,
    Running,
    Completed,
    Failed,
    Unknown,
}

impl RemoteStatus {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "PENDING" => RemoteStatus::Pending,
            "ANALYZING" => RemoteStatus::Analyzing,
            "DISCOVERING" => RemoteStatus::Discovering,
            "GENERATING" => RemoteStatus::Generating,
            "RUNNING" => RemoteStatus::Running,
            "COMPLETED" => RemoteStatus::Completed,
            "FAILED" | "ERROR" => RemoteStatus::Failed,
            _ => RemoteStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }
}

/// Data block of GET /automation/status/{workflowId}
///
/// Older service builds report counters as `passed`/`failed`, newer ones
/// as `successCount`/`failCount`; both spellings are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStatusData {
    pub status: String,
    pub current_step: Option<String>,
    pub progress: Option<u8>,
    pub test_results: Vec<PolledStepResult>,
    #[serde(alias = "passed")]
    pub success_count: Option<u32>,
    #[serde(alias = "failed")]
    pub fail_count: Option<u32>,
    pub skipped_count: Option<u32>,
    pub error: Option<String>,
}

impl WorkflowStatusData {
    pub fn remote_status(&self) -> RemoteStatus {
        RemoteStatus::parse(&self.status)
    }
}

/// One scenario row inside a status snapshot
///
/// Shown by the one-shot status command; the live session never reads
/// these (per-scenario records come only from the push channel).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolledStepResult {
    pub scenario_id: Option<u64>,
    pub scenario_title: Option<String>,
    pub status: Option<String>,
    pub duration: Option<u64>,
}

/// Project summary from GET /projects
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Scenario summary from GET /scenarios
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub is_automated: bool,
}
