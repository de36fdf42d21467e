//! Terminal rendering
//!
//! Live view of the session snapshot: activity log lines as they arrive,
//! a spinner carrying the current pipeline step, and the final result
//! table once the workflow is terminal.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

use crate::api::types::{Project, Scenario, WorkflowStatusData};
use crate::session::log::{LogEntry, LogKind};
use crate::session::state::{SessionSnapshot, SessionStatus, TestOutcome};

/// Incremental console view over a stream of snapshots
pub struct ConsoleRenderer {
    spinner: ProgressBar,
    seen_logs: u64,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        let spinner = if std::io::stdout().is_terminal() {
            ProgressBar::new_spinner()
        } else {
            // Piped output: no spinner escape codes, log lines only
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self {
            spinner,
            seen_logs: 0,
        }
    }

    /// Print the log entries this snapshot added and refresh the spinner
    pub fn render(&mut self, snapshot: &SessionSnapshot) {
        let new_entries = snapshot.log_seq.saturating_sub(self.seen_logs) as usize;
        if new_entries > 0 {
            let skip = snapshot.logs.len().saturating_sub(new_entries);
            for entry in snapshot.logs.iter().skip(skip) {
                self.spinner.println(format_entry(entry));
            }
            self.seen_logs = snapshot.log_seq;
        }
        self.spinner.set_message(spinner_message(snapshot));
    }

    /// Stop the live view and print the result table plus the summary
    pub fn finish(&mut self, snapshot: &SessionSnapshot) {
        self.render(snapshot);
        self.spinner.finish_and_clear();

        if !snapshot.test_results.is_empty() {
            println!("\n{}", "Test sonuçları:".bold());
            for result in &snapshot.test_results {
                let verdict = match result.outcome {
                    TestOutcome::Passed => "PASSED".green().bold(),
                    TestOutcome::Failed => "FAILED".red().bold(),
                };
                let duration = result
                    .duration_ms
                    .map(|d| format!("{}ms", d))
                    .unwrap_or_else(|| "-".to_string());
                println!("  [{}] {} ({})", verdict, result.title, duration);
                if let Some(ref error) = result.error {
                    println!("      {}", error.red());
                }
            }
        }
        println!("\n{}", summary_line(snapshot));
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_message(snapshot: &SessionSnapshot) -> String {
    let step = snapshot.current_step.as_deref().unwrap_or("-");
    match snapshot.progress {
        Some(progress) => format!("Adım: {} ({}%)", step, progress),
        None => format!("Adım: {}", step),
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let message = match entry.kind {
        LogKind::Success => entry.message.green().to_string(),
        LogKind::Warning => entry.message.yellow().to_string(),
        LogKind::Error => entry.message.red().to_string(),
        LogKind::Info => entry.message.clone(),
    };
    format!("{} {}", format!("[{}]", entry.time).dimmed(), message)
}

fn summary_line(snapshot: &SessionSnapshot) -> String {
    let verdict = match snapshot.status {
        SessionStatus::Completed => "✅ Tamamlandı".green().bold().to_string(),
        SessionStatus::Failed => "❌ Başarısız".red().bold().to_string(),
        SessionStatus::Cancelled => "⏹ İptal edildi".yellow().bold().to_string(),
        SessionStatus::Running => "▶ Çalışıyor".cyan().to_string(),
        SessionStatus::Idle => "Boşta".to_string(),
    };
    format!(
        "{} — {} başarılı, {} başarısız, {} atlanan",
        verdict, snapshot.success_count, snapshot.fail_count, snapshot.skipped_count
    )
}

/// One-shot status print for the `status` command
pub fn print_status(workflow_id: &str, data: &WorkflowStatusData) {
    println!("Workflow: {}", workflow_id.cyan());
    println!("Durum: {}", data.status);
    if let Some(ref step) = data.current_step {
        println!("Adım: {}", step);
    }
    if let Some(progress) = data.progress {
        println!("İlerleme: {}%", progress);
    }
    if let (Some(success), Some(fail)) = (data.success_count, data.fail_count) {
        println!(
            "Sonuçlar: {} başarılı, {} başarısız, {} atlanan",
            success.to_string().green(),
            fail.to_string().red(),
            data.skipped_count.unwrap_or(0)
        );
    }
    if let Some(ref error) = data.error {
        println!("Hata: {}", error.red());
    }
}

pub fn print_projects(projects: &[Project]) {
    if projects.is_empty() {
        println!("Hiç proje yok");
        return;
    }
    for project in projects {
        match project.description {
            Some(ref description) => {
                println!("  {} {} — {}", project.id, project.name.bold(), description)
            }
            None => println!("  {} {}", project.id, project.name.bold()),
        }
    }
}

pub fn print_scenarios(scenarios: &[Scenario]) {
    if scenarios.is_empty() {
        println!("Bu projede otomatize senaryo yok");
        return;
    }
    for scenario in scenarios {
        println!("  {} {}", scenario.id, scenario.title);
    }
}
