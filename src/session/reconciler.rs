//! Dual-channel reconciliation
//!
//! Merges push events and poll snapshots into one session state. All rules
//! that keep the two channels consistent live here: idempotent result
//! upserts, last-write-wins steps, and monotonic terminal transitions.

use crate::api::types::{RemoteStatus, WorkflowStatusData};
use crate::push::events::PushEvent;
use crate::session::log::{ActivityLog, LogKind};
use crate::session::state::{SessionSnapshot, TestOutcome, TestResultRecord, WorkflowSession};

/// One unit of input for the reconcile loop
#[derive(Debug)]
pub enum SessionUpdate {
    /// Typed event from the push channel
    Push(PushEvent),
    /// Status snapshot from the polling channel
    Poll(WorkflowStatusData),
    /// Free-form activity log line (poller retries, cancel task, etc.)
    Log { kind: LogKind, message: String },
    /// Push-channel connectivity transition
    Connection { connected: bool },
    /// A start request passed validation; clear the previous run's state
    Starting {
        project: String,
        scenario_count: usize,
    },
    /// The remote accepted the start request
    Started { workflow_id: String },
    /// The remote rejected the start request; back to idle
    StartFailed { message: String },
    /// Client-side cancellation; authoritative regardless of the remote
    Cancelled,
}

/// What an applied update changed, as far as the loop cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub became_terminal: bool,
}

impl Applied {
    fn terminal() -> Self {
        Self {
            became_terminal: true,
        }
    }
}

/// Full mutable session state, owned by the single reconcile loop
#[derive(Debug, Default)]
pub struct SessionState {
    pub session: WorkflowSession,
    pub results: Vec<TestResultRecord>,
    pub log: ActivityLog,
    pub live_screenshot: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear transient run state ahead of a new start; the activity log
    /// keeps its history across runs
    pub fn prepare_start(&mut self) {
        self.results.clear();
        self.live_screenshot = None;
        self.session = WorkflowSession::new();
    }

    /// Mark the session RUNNING for a freshly started workflow
    pub fn mark_started(&mut self, workflow_id: &str) {
        self.session.begin(workflow_id);
    }

    /// Apply one update and report whether the session just turned terminal
    pub fn apply(&mut self, update: SessionUpdate) -> Applied {
        match update {
            SessionUpdate::Push(event) => self.apply_push(event),
            SessionUpdate::Poll(data) => self.apply_poll(data),
            SessionUpdate::Log { kind, message } => {
                self.log.append(kind, message);
                Applied::default()
            }
            SessionUpdate::Connection { connected } => {
                if connected {
                    self.log.append(LogKind::Info, "Sunucu bağlantısı kuruldu");
                } else {
                    self.log.append(LogKind::Warning, "Sunucu bağlantısı koptu");
                }
                Applied::default()
            }
            SessionUpdate::Starting {
                project,
                scenario_count,
            } => {
                self.prepare_start();
                self.log.append(LogKind::Info, "Otomasyon başlatılıyor...");
                self.log.append(LogKind::Info, format!("Proje: {}", project));
                self.log
                    .append(LogKind::Info, format!("{} senaryo seçildi", scenario_count));
                Applied::default()
            }
            SessionUpdate::Started { workflow_id } => {
                self.mark_started(&workflow_id);
                self.log
                    .append(LogKind::Success, format!("Workflow başlatıldı: {}", workflow_id));
                Applied::default()
            }
            SessionUpdate::StartFailed { message } => {
                self.session = WorkflowSession::new();
                self.log
                    .append(LogKind::Error, format!("Başlatma hatası: {}", message));
                Applied::default()
            }
            SessionUpdate::Cancelled => {
                self.live_screenshot = None;
                if self.session.status.is_running() {
                    self.session.cancel();
                    self.log.append(LogKind::Warning, "Otomasyon iptal edildi");
                    Applied::terminal()
                } else {
                    self.session.current_step = None;
                    Applied::default()
                }
            }
        }
    }

    fn apply_push(&mut self, event: PushEvent) -> Applied {
        let running = self.session.status.is_running();
        match event {
            // Log-bearing events append regardless of session state
            PushEvent::LogLine { kind, message } => self.log.append(kind, message),
            PushEvent::ScriptGenerated {
                title,
                generated_by_ai,
            } => {
                let origin = if generated_by_ai { "AI" } else { "Template" };
                self.log
                    .append(LogKind::Info, format!("Script hazır: {} ({})", title, origin));
            }

            PushEvent::Step {
                step,
                message,
                progress,
            } if running => {
                self.session.current_step = Some(step);
                if let Some(progress) = progress {
                    self.session.progress = Some(progress);
                }
                if let Some(message) = message {
                    self.log.append(LogKind::Info, message);
                }
            }
            PushEvent::TestPassed {
                scenario_id,
                title,
                duration_ms,
            } if running => {
                self.upsert_result(scenario_id, &title, TestOutcome::Passed, duration_ms, None);
                self.log.append(
                    LogKind::Success,
                    format!("✓ {} - PASSED ({}ms)", title, duration_ms.unwrap_or(0)),
                );
            }
            PushEvent::TestFailed {
                scenario_id,
                title,
                duration_ms,
                error,
            } if running => {
                self.upsert_result(scenario_id, &title, TestOutcome::Failed, duration_ms, error);
                self.log.append(
                    LogKind::Error,
                    format!("✗ {} - FAILED ({}ms)", title, duration_ms.unwrap_or(0)),
                );
            }
            PushEvent::RunResult {
                scenario_id,
                title,
                passed,
                duration_ms,
                error,
            } if running => {
                let outcome = if passed {
                    TestOutcome::Passed
                } else {
                    TestOutcome::Failed
                };
                self.upsert_result(scenario_id, &title, outcome, duration_ms, error);
                let (kind, verdict) = if passed {
                    (LogKind::Success, "PASSED")
                } else {
                    (LogKind::Error, "FAILED")
                };
                self.log
                    .append(kind, format!("Test {}: {}", verdict, title));
            }
            PushEvent::Completed {
                status,
                success_count,
                fail_count,
                skipped_count,
                error,
            } if running => {
                return match RemoteStatus::parse(&status) {
                    RemoteStatus::Completed => {
                        self.finish_completed(success_count, fail_count, skipped_count)
                    }
                    _ => self.finish_failed(error),
                };
            }
            PushEvent::Screenshot { image } if running => {
                self.live_screenshot = Some(image);
            }

            // Session-mutating events outside a running session are stale
            _ => {}
        }
        Applied::default()
    }

    fn apply_poll(&mut self, data: WorkflowStatusData) -> Applied {
        // A late in-flight response must not resurrect a finished session
        if !self.session.status.is_running() {
            return Applied::default();
        }
        match data.remote_status() {
            RemoteStatus::Completed => {
                self.finish_completed(data.success_count, data.fail_count, data.skipped_count)
            }
            RemoteStatus::Failed => self.finish_failed(data.error),
            _ => {
                if let Some(step) = data.current_step {
                    self.session.current_step = Some(step);
                }
                if let Some(progress) = data.progress {
                    self.session.progress = Some(progress);
                }
                if let Some(n) = data.success_count {
                    self.session.success_count = n;
                }
                if let Some(n) = data.fail_count {
                    self.session.fail_count = n;
                }
                if let Some(n) = data.skipped_count {
                    self.session.skipped_count = n;
                }
                // data.test_results is deliberately not read: scenario
                // records come only from the push channel while running,
                // and a poll snapshot may be stale
                Applied::default()
            }
        }
    }

    /// Update-or-insert keyed by scenario id; the first-seen title wins
    fn upsert_result(
        &mut self,
        scenario_id: u64,
        title: &str,
        outcome: TestOutcome,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) {
        if let Some(existing) = self
            .results
            .iter_mut()
            .find(|r| r.scenario_id == scenario_id)
        {
            existing.outcome = outcome;
            existing.duration_ms = duration_ms;
            existing.error = error;
        } else {
            self.results.push(TestResultRecord {
                scenario_id,
                title: title.to_string(),
                outcome,
                duration_ms,
                error,
            });
        }
    }

    fn finish_completed(
        &mut self,
        success: Option<u32>,
        fail: Option<u32>,
        skipped: Option<u32>,
    ) -> Applied {
        let success = success.unwrap_or_else(|| self.count_outcome(TestOutcome::Passed));
        let fail = fail.unwrap_or_else(|| self.count_outcome(TestOutcome::Failed));
        let skipped = skipped.unwrap_or(self.session.skipped_count);
        self.session.success_count = success;
        self.session.fail_count = fail;
        self.session.skipped_count = skipped;
        self.session.complete();

        let mut line = format!(
            "Otomasyon tamamlandı! Başarılı: {}, Başarısız: {}",
            success, fail
        );
        if skipped > 0 {
            line.push_str(&format!(", Atlanan: {}", skipped));
        }
        self.log.append(LogKind::Success, line);
        Applied::terminal()
    }

    fn finish_failed(&mut self, error: Option<String>) -> Applied {
        self.log.append(
            LogKind::Error,
            format!("Hata: {}", error.as_deref().unwrap_or("Bilinmeyen hata")),
        );
        self.session.fail(error);
        Applied::terminal()
    }

    fn count_outcome(&self, outcome: TestOutcome) -> u32 {
        self.results.iter().filter(|r| r.outcome == outcome).count() as u32
    }

    /// Build the read-only view published to consumers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            workflow_id: self.session.workflow_id.clone(),
            status: self.session.status,
            is_running: self.session.status.is_running(),
            current_step: self.session.current_step.clone(),
            progress: self.session.progress,
            test_results: self.results.clone(),
            logs: self.log.to_vec(),
            log_seq: self.log.appended(),
            success_count: self.session.success_count,
            fail_count: self.session.fail_count,
            skipped_count: self.session.skipped_count,
            error: self.session.error.clone(),
            live_screenshot: self.live_screenshot.clone(),
        }
    }
}
