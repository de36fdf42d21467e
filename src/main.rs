use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumi_console::api::client::{AutomationBackend, AutomationClient};
use lumi_console::config::Config;
use lumi_console::push::{ConnectionSupervisor, WsTransport};
use lumi_console::render::{self, ConsoleRenderer};
use lumi_console::session::{ProjectRef, RunOptions, SessionManager, SessionStatus, StartRequest};

#[derive(Parser)]
#[command(name = "lumi-console")]
#[command(author = "NL Team")]
#[command(version = "0.1.2")]
#[command(about = "Terminal dashboard for the Lumi automation service", long_about = None)]
struct Cli {
    /// Base URL of the automation REST API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// WebSocket endpoint for push events
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a workflow and follow it live
    Run {
        /// Project id
        #[arg(short, long)]
        project: u64,

        /// Scenario id(s). Can be specified multiple times.
        #[arg(short, long)]
        scenario: Vec<u64>,

        /// Run the remote browser headless
        #[arg(long, default_value = "false")]
        headless: bool,

        /// Generate scripts only, skip test execution
        #[arg(long, default_value = "false")]
        no_tests: bool,

        /// Skip the element discovery phase
        #[arg(long, default_value = "false")]
        skip_discovery: bool,

        /// Skip script generation
        #[arg(long, default_value = "false")]
        skip_generation: bool,

        /// Save the final browser frame to this file (PNG)
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },

    /// Show the status of a workflow
    Status {
        /// Workflow id
        #[arg(short, long)]
        workflow: String,
    },

    /// Cancel a running workflow
    Cancel {
        /// Workflow id
        #[arg(short, long)]
        workflow: String,
    },

    /// List projects
    Projects,

    /// List the automated scenarios of a project
    Scenarios {
        /// Project id
        #[arg(short, long)]
        project: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if let Some(url) = cli.ws_url {
        config.ws_url = url;
    }

    let client = Arc::new(AutomationClient::new(&config.api_url));

    match cli.command {
        Commands::Run {
            project,
            scenario,
            headless,
            no_tests,
            skip_discovery,
            skip_generation,
            screenshot,
        } => {
            println!("{}", "🚀 Lumi Console".cyan().bold());

            let project_info = client.get_project(project).await?;
            let options = RunOptions {
                run_tests: !no_tests,
                skip_element_discovery: skip_discovery,
                skip_script_generation: skip_generation,
                headless,
            };
            let request = StartRequest {
                project: Some(ProjectRef {
                    id: project_info.id,
                    name: project_info.name.clone(),
                }),
                scenario_ids: scenario,
                options,
            };

            let transport = Arc::new(WsTransport::new(&config.ws_url));
            let supervisor = Arc::new(ConnectionSupervisor::new(transport));
            let manager = Arc::new(SessionManager::new(client.clone(), supervisor));

            let interrupted = Arc::new(AtomicBool::new(false));
            {
                let flag = interrupted.clone();
                ctrlc::set_handler(move || {
                    flag.store(true, Ordering::SeqCst);
                })?;
            }

            if let Err(e) = manager.start(request).await {
                eprintln!("{} {}", "✗".red().bold(), e);
                std::process::exit(1);
            }

            let final_snapshot = follow(&manager, &interrupted).await;
            if let Some(path) = screenshot {
                save_screenshot(&final_snapshot.live_screenshot, &path);
            }
            if final_snapshot.status != SessionStatus::Completed {
                std::process::exit(1);
            }
        }

        Commands::Status { workflow } => {
            let data = client.workflow_status(&workflow).await?;
            render::print_status(&workflow, &data);
        }

        Commands::Cancel { workflow } => {
            let response = client.cancel_workflow(&workflow).await?;
            let message = response
                .message
                .unwrap_or_else(|| "İptal isteği gönderildi".to_string());
            println!("{} {}", "⏹".yellow(), message);
        }

        Commands::Projects => {
            let projects = client.list_projects().await?;
            println!("{}", "Projeler:".bold());
            render::print_projects(&projects);
        }

        Commands::Scenarios { project } => {
            let scenarios = client.list_scenarios(project).await?;
            println!("{}", "Otomatize senaryolar:".bold());
            render::print_scenarios(&scenarios);
        }
    }

    Ok(())
}

/// Render snapshots until the session reaches a terminal state
///
/// Ctrl+C triggers a client-side cancel; the loop then keeps following
/// until the cancellation shows up in the snapshot.
async fn follow(
    manager: &SessionManager,
    interrupted: &AtomicBool,
) -> lumi_console::session::SessionSnapshot {
    let mut rx = manager.subscribe();
    let mut renderer = ConsoleRenderer::new();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if snapshot.status.is_terminal() {
            renderer.finish(&snapshot);
            return snapshot;
        }
        renderer.render(&snapshot);

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    let snapshot = rx.borrow().clone();
                    renderer.finish(&snapshot);
                    return snapshot;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if interrupted.swap(false, Ordering::SeqCst) {
                    println!("\n{} İptal ediliyor...", "⏹".yellow());
                    manager.cancel();
                }
            }
        }
    }
}

fn save_screenshot(frame: &Option<String>, path: &std::path::Path) {
    use base64::Engine;

    let Some(frame) = frame else {
        println!("Kaydedilecek ekran görüntüsü yok");
        return;
    };
    match base64::engine::general_purpose::STANDARD.decode(frame) {
        Ok(bytes) => match std::fs::write(path, bytes) {
            Ok(()) => println!("Ekran görüntüsü kaydedildi: {}", path.display()),
            Err(e) => eprintln!("Ekran görüntüsü yazılamadı: {}", e),
        },
        Err(e) => eprintln!("Ekran görüntüsü çözülemedi: {}", e),
    }
}
