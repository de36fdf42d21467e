use serde::{Deserialize, Serialize};

use super::log::LogEntry;

/// Pipeline steps reported by the orchestrator, in order
pub const WORKFLOW_STEPS: [&str; 3] = ["init", "test", "complete"];

/// Step marker set when a workflow reaches a terminal state
pub const STEP_COMPLETE: &str = "complete";

/// Lifecycle of the tracked automation workflow
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }
}

/// Outcome of a single scenario
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed,
}

/// Per-scenario result row, keyed by scenario id
///
/// Records are kept in first-seen order and survive until the next start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    pub scenario_id: u64,
    pub title: String,
    pub outcome: TestOutcome,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

/// Mutable state of the tracked workflow session
#[derive(Debug, Clone, Default)]
pub struct WorkflowSession {
    pub workflow_id: Option<String>,
    pub status: SessionStatus,
    pub current_step: Option<String>,
    pub progress: Option<u8>,
    pub success_count: u32,
    pub fail_count: u32,
    pub skipped_count: u32,
    pub error: Option<String>,
}

impl WorkflowSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to a fresh RUNNING session for the given workflow id
    pub fn begin(&mut self, workflow_id: &str) {
        *self = Self::new();
        self.workflow_id = Some(workflow_id.to_string());
        self.status = SessionStatus::Running;
        self.current_step = Some(WORKFLOW_STEPS[0].to_string());
    }

    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed);
    }

    pub fn fail(&mut self, error: Option<String>) {
        self.error = error;
        self.finish(SessionStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.status = SessionStatus::Cancelled;
        self.current_step = None;
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.current_step = Some(STEP_COMPLETE.to_string());
    }
}

/// Read-only view of the session, published after every applied update
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub workflow_id: Option<String>,
    pub status: SessionStatus,
    pub is_running: bool,
    pub current_step: Option<String>,
    pub progress: Option<u8>,
    pub test_results: Vec<TestResultRecord>,
    pub logs: Vec<LogEntry>,
    /// Total log entries appended so far; lets consumers tail the bounded log
    #[serde(skip)]
    pub log_seq: u64,
    pub success_count: u32,
    pub fail_count: u32,
    pub skipped_count: u32,
    pub error: Option<String>,
    pub live_screenshot: Option<String>,
}
