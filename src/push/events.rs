//! Typed push events from the automation topic

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::session::log::LogKind;

/// Topic carrying all automation events
pub const AUTOMATION_TOPIC: &str = "automation";

/// Wire names of the push events the client consumes
pub const EVENT_NAMES: [&str; 8] = [
    "automation:step",
    "automation:test:pass",
    "automation:test:fail",
    "automation:completed",
    "test:run:result",
    "script:generated",
    "log:new",
    "browser:screenshot",
];

/// A push event decoded from the wire
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Pipeline step transition
    Step {
        step: String,
        message: Option<String>,
        progress: Option<u8>,
    },
    /// Scenario finished successfully
    TestPassed {
        scenario_id: u64,
        title: String,
        duration_ms: Option<u64>,
    },
    /// Scenario failed
    TestFailed {
        scenario_id: u64,
        title: String,
        duration_ms: Option<u64>,
        error: Option<String>,
    },
    /// Scenario result on the legacy event name
    RunResult {
        scenario_id: u64,
        title: String,
        passed: bool,
        duration_ms: Option<u64>,
        error: Option<String>,
    },
    /// Whole workflow reached a terminal state
    Completed {
        status: String,
        success_count: Option<u32>,
        fail_count: Option<u32>,
        skipped_count: Option<u32>,
        error: Option<String>,
    },
    /// A test script became available for a scenario
    ScriptGenerated { title: String, generated_by_ai: bool },
    /// Server-side log line forwarded to the client
    LogLine { kind: LogKind, message: String },
    /// Live browser frame, base64 encoded
    Screenshot { image: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepPayload {
    step: String,
    message: Option<String>,
    progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestPayload {
    scenario_id: u64,
    scenario_title: Option<String>,
    duration: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunResultPayload {
    scenario_id: u64,
    scenario_title: Option<String>,
    success: bool,
    duration: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletedPayload {
    status: String,
    success_count: Option<u32>,
    fail_count: Option<u32>,
    skipped_count: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptPayload {
    #[serde(rename = "scenarioTitle")]
    scenario_title: Option<String>,
    #[serde(rename = "generatedByAI", default)]
    generated_by_ai: bool,
}

#[derive(Debug, Deserialize)]
struct LogPayload {
    level: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ScreenshotPayload {
    screenshot: String,
}

impl PushEvent {
    /// Decode a named wire event
    ///
    /// Returns `Ok(None)` for event names outside the automation set and
    /// an error for payloads that do not match the expected shape.
    pub fn parse(event: &str, data: Value) -> Result<Option<PushEvent>> {
        let parsed = match event {
            "automation:step" => {
                let payload: StepPayload =
                    serde_json::from_value(data).context("Failed to parse step event")?;
                PushEvent::Step {
                    step: payload.step,
                    message: payload.message,
                    progress: payload.progress.map(clamp_progress),
                }
            }
            "automation:test:pass" => {
                let payload: TestPayload =
                    serde_json::from_value(data).context("Failed to parse test pass event")?;
                PushEvent::TestPassed {
                    scenario_id: payload.scenario_id,
                    title: scenario_title(payload.scenario_title, payload.scenario_id),
                    duration_ms: payload.duration.map(|d| d as u64),
                }
            }
            "automation:test:fail" => {
                let payload: TestPayload =
                    serde_json::from_value(data).context("Failed to parse test fail event")?;
                PushEvent::TestFailed {
                    scenario_id: payload.scenario_id,
                    title: scenario_title(payload.scenario_title, payload.scenario_id),
                    duration_ms: payload.duration.map(|d| d as u64),
                    error: payload.error,
                }
            }
            "automation:completed" => {
                let payload: CompletedPayload =
                    serde_json::from_value(data).context("Failed to parse completed event")?;
                PushEvent::Completed {
                    status: payload.status,
                    success_count: payload.success_count,
                    fail_count: payload.fail_count,
                    skipped_count: payload.skipped_count,
                    error: payload.error,
                }
            }
            "test:run:result" => {
                let payload: RunResultPayload =
                    serde_json::from_value(data).context("Failed to parse run result event")?;
                PushEvent::RunResult {
                    scenario_id: payload.scenario_id,
                    title: scenario_title(payload.scenario_title, payload.scenario_id),
                    passed: payload.success,
                    duration_ms: payload.duration.map(|d| d as u64),
                    error: payload.error,
                }
            }
            "script:generated" => {
                let payload: ScriptPayload =
                    serde_json::from_value(data).context("Failed to parse script event")?;
                PushEvent::ScriptGenerated {
                    title: payload.scenario_title.unwrap_or_default(),
                    generated_by_ai: payload.generated_by_ai,
                }
            }
            "log:new" => {
                let payload: LogPayload =
                    serde_json::from_value(data).context("Failed to parse log event")?;
                PushEvent::LogLine {
                    kind: log_kind(payload.level.as_deref()),
                    message: payload.message,
                }
            }
            "browser:screenshot" => {
                let payload: ScreenshotPayload =
                    serde_json::from_value(data).context("Failed to parse screenshot event")?;
                PushEvent::Screenshot {
                    image: payload.screenshot,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn scenario_title(title: Option<String>, scenario_id: u64) -> String {
    title.unwrap_or_else(|| format!("Senaryo {}", scenario_id))
}

/// Map server log levels onto activity log kinds; anything unexpected is info
fn log_kind(level: Option<&str>) -> LogKind {
    match level {
        Some("ERROR") => LogKind::Error,
        Some("SUCCESS") => LogKind::Success,
        Some("WARNING") => LogKind::Warning,
        _ => LogKind::Info,
    }
}

fn clamp_progress(progress: f64) -> u8 {
    progress.round().clamp(0.0, 100.0) as u8
}
