//! Workflow session manager
//!
//! Public API of the synchronization core: `start`, `cancel` and the
//! read-only snapshot. All session state lives in one reconcile task; the
//! push handlers, the poller and the user operations only produce
//! `SessionUpdate` messages, so no two call sites ever mutate the session
//! concurrently.

use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::api::client::AutomationBackend;
use crate::api::types::StartWorkflowRequest;
use crate::push::events::{PushEvent, AUTOMATION_TOPIC, EVENT_NAMES};
use crate::push::supervisor::ConnectionSupervisor;
use crate::session::log::LogKind;
use crate::session::poller::PollingScheduler;
use crate::session::reconciler::{SessionState, SessionUpdate};
use crate::session::state::SessionSnapshot;

/// Failures surfaced to the caller of `start`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Start request rejected before reaching the service
    #[error("{0}")]
    InvalidInput(String),
    /// A session is already RUNNING; terminal or idle sessions admit a new start
    #[error("Bir otomasyon zaten çalışıyor")]
    AlreadyRunning,
    /// The service rejected the start request
    #[error("{0}")]
    StartFailed(String),
}

/// Project the workflow runs against
#[derive(Debug, Clone)]
pub struct ProjectRef {
    pub id: u64,
    pub name: String,
}

/// Remote-side run options forwarded with the start request
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub run_tests: bool,
    pub skip_element_discovery: bool,
    pub skip_script_generation: bool,
    pub headless: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_tests: true,
            skip_element_discovery: false,
            skip_script_generation: false,
            headless: false,
        }
    }
}

/// Input to `SessionManager::start`
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub project: Option<ProjectRef>,
    pub scenario_ids: Vec<u64>,
    pub options: RunOptions,
}

/// Owns the session lifecycle and wires both update channels together
pub struct SessionManager {
    backend: Arc<dyn AutomationBackend>,
    supervisor: Arc<ConnectionSupervisor>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    running_tx: Arc<watch::Sender<bool>>,
    poller: Arc<Mutex<Option<PollingScheduler>>>,
    workflow_id: Mutex<Option<String>>,
    handlers_registered: AtomicBool,
    /// Claimed for the duration of a start call; together with the running
    /// flag this keeps a second start out while the first is awaiting the
    /// remote response
    start_guard: AtomicBool,
}

impl SessionManager {
    /// Spawns the reconcile loop; must be called inside a tokio runtime
    pub fn new(backend: Arc<dyn AutomationBackend>, supervisor: Arc<ConnectionSupervisor>) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (running_tx, _) = watch::channel(false);
        let running_tx = Arc::new(running_tx);
        let poller: Arc<Mutex<Option<PollingScheduler>>> = Arc::new(Mutex::new(None));

        tokio::spawn(reconcile_loop(
            updates_rx,
            snapshot_tx,
            running_tx.clone(),
            poller.clone(),
        ));
        spawn_connection_watcher(
            supervisor.clone(),
            updates_tx.clone(),
            running_tx.subscribe(),
        );

        Self {
            backend,
            supervisor,
            updates_tx,
            snapshot_rx,
            running_tx,
            poller,
            workflow_id: Mutex::new(None),
            handlers_registered: AtomicBool::new(false),
            start_guard: AtomicBool::new(false),
        }
    }

    /// Start a workflow and begin following it over both channels
    pub async fn start(&self, request: StartRequest) -> Result<String, SessionError> {
        let project = match request.project {
            Some(project) => project,
            None => return Err(self.invalid_input("Lütfen bir proje seçin")),
        };
        if request.scenario_ids.is_empty() {
            return Err(self.invalid_input("Lütfen en az bir senaryo seçin"));
        }
        if *self.running_tx.borrow()
            || self
                .start_guard
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }

        self.send(SessionUpdate::Starting {
            project: project.name.clone(),
            scenario_count: request.scenario_ids.len(),
        });
        self.ensure_push_wiring();

        let wire = StartWorkflowRequest {
            project_id: project.id,
            scenario_ids: request.scenario_ids,
            run_tests: request.options.run_tests,
            skip_element_discovery: request.options.skip_element_discovery,
            skip_script_generation: request.options.skip_script_generation,
            headless: request.options.headless,
        };
        let response = match self.backend.start_workflow(&wire).await {
            Ok(response) => response,
            Err(e) => return Err(self.start_failed(format!("{:#}", e))),
        };
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "Bilinmeyen hata".to_string());
            return Err(self.start_failed(message));
        }
        let workflow_id = match response.workflow_id {
            Some(id) => id,
            None => return Err(self.start_failed("Sunucu workflow kimliği döndürmedi".to_string())),
        };

        *self.workflow_id.lock().unwrap() = Some(workflow_id.clone());
        let _ = self.running_tx.send(true);
        self.start_guard.store(false, Ordering::SeqCst);
        self.send(SessionUpdate::Started {
            workflow_id: workflow_id.clone(),
        });
        *self.poller.lock().unwrap() = Some(PollingScheduler::start(
            self.backend.clone(),
            workflow_id.clone(),
            self.updates_tx.clone(),
            self.running_tx.subscribe(),
        ));
        Ok(workflow_id)
    }

    /// Cancel the current workflow
    ///
    /// Client-authoritative: the pending poll is cleared and the running
    /// flag drops synchronously; the remote cancel request is fired in the
    /// background and its failure only produces a warning log line.
    pub fn cancel(&self) {
        if let Some(mut poller) = self.poller.lock().unwrap().take() {
            poller.cancel();
        }
        let was_running = *self.running_tx.borrow();
        let _ = self.running_tx.send(false);

        if was_running {
            if let Some(workflow_id) = self.workflow_id.lock().unwrap().take() {
                let backend = self.backend.clone();
                let updates = self.updates_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = backend.cancel_workflow(&workflow_id).await {
                        let _ = updates.send(SessionUpdate::Log {
                            kind: LogKind::Warning,
                            message: format!("İptal isteği sunucuya iletilemedi: {:#}", e),
                        });
                    }
                });
            }
        }
        self.send(SessionUpdate::Cancelled);
    }

    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Current read-only view of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch snapshot changes; one value per applied update
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    fn invalid_input(&self, message: &str) -> SessionError {
        self.send(SessionUpdate::Log {
            kind: LogKind::Error,
            message: message.to_string(),
        });
        SessionError::InvalidInput(message.to_string())
    }

    fn start_failed(&self, message: String) -> SessionError {
        self.start_guard.store(false, Ordering::SeqCst);
        self.send(SessionUpdate::StartFailed {
            message: message.clone(),
        });
        SessionError::StartFailed(message)
    }

    /// Register the push handlers once and make sure the shared connection
    /// is up and subscribed to the automation topic
    fn ensure_push_wiring(&self) {
        if !self.handlers_registered.swap(true, Ordering::SeqCst) {
            for event in EVENT_NAMES {
                let updates = self.updates_tx.clone();
                let name = event.to_string();
                self.supervisor.on(
                    event,
                    Box::new(move |data| match PushEvent::parse(&name, data) {
                        Ok(Some(event)) => {
                            let _ = updates.send(SessionUpdate::Push(event));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("malformed push event {}: {:#}", name, e);
                            let _ = updates.send(SessionUpdate::Log {
                                kind: LogKind::Warning,
                                message: format!("Geçersiz {} olayı yok sayıldı", name),
                            });
                        }
                    }),
                );
            }
        }
        self.supervisor.connect();
        self.supervisor.subscribe(AUTOMATION_TOPIC);
    }

    fn send(&self, update: SessionUpdate) {
        let _ = self.updates_tx.send(update);
    }
}

/// Single consumer of all session updates
async fn reconcile_loop(
    mut updates_rx: mpsc::UnboundedReceiver<SessionUpdate>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    running_tx: Arc<watch::Sender<bool>>,
    poller: Arc<Mutex<Option<PollingScheduler>>>,
) {
    let mut state = SessionState::new();
    while let Some(update) = updates_rx.recv().await {
        let applied = state.apply(update);
        if applied.became_terminal {
            let _ = running_tx.send(false);
            if let Some(mut poller) = poller.lock().unwrap().take() {
                poller.cancel();
            }
        }
        let _ = snapshot_tx.send(state.snapshot());
    }
}

/// Forward connectivity transitions into the reconcile loop and renew the
/// automation subscription whenever the channel comes back while a
/// session is running
fn spawn_connection_watcher(
    supervisor: Arc<ConnectionSupervisor>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    running_rx: watch::Receiver<bool>,
) {
    let mut connected_rx = supervisor.connected();
    tokio::spawn(async move {
        while connected_rx.changed().await.is_ok() {
            let connected = *connected_rx.borrow();
            if updates_tx
                .send(SessionUpdate::Connection { connected })
                .is_err()
            {
                break;
            }
            if connected && *running_rx.borrow() {
                supervisor.subscribe(AUTOMATION_TOPIC);
            }
        }
    });
}
