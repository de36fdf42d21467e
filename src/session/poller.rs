//! Status polling scheduler
//!
//! Fallback channel next to the push events: periodically fetches the
//! workflow status over HTTP and feeds each snapshot to the reconcile
//! loop. Never runs two requests in flight; stops on its own once the
//! remote reports a terminal status or the session is no longer running.

use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::client::AutomationBackend;
use crate::session::log::LogKind;
use crate::session::reconciler::SessionUpdate;

/// Delay before the first status request after start
const FIRST_POLL_DELAY: Duration = Duration::from_millis(1500);

/// Delay between successful polls while the workflow is in flight
const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Delay before retrying after a transient request failure
const RETRY_INTERVAL: Duration = Duration::from_millis(3000);

/// Handle to a running poll task
pub struct PollingScheduler {
    handle: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    /// Begin polling the given workflow
    ///
    /// Snapshots and retry warnings are delivered as `SessionUpdate`s on
    /// `updates`; `running` mirrors the session's running flag and gates
    /// every request.
    pub fn start(
        backend: Arc<dyn AutomationBackend>,
        workflow_id: String,
        updates: mpsc::UnboundedSender<SessionUpdate>,
        running: watch::Receiver<bool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            poll_loop(backend, workflow_id, updates, running).await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Drop any pending scheduled poll
    ///
    /// No-op once the task has already stopped after a terminal status.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_loop(
    backend: Arc<dyn AutomationBackend>,
    workflow_id: String,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    running: watch::Receiver<bool>,
) {
    let mut delay = FIRST_POLL_DELAY;
    loop {
        tokio::time::sleep(delay).await;
        if !*running.borrow() {
            break;
        }
        match backend.workflow_status(&workflow_id).await {
            Ok(data) => {
                let terminal = data.remote_status().is_terminal();
                if updates.send(SessionUpdate::Poll(data)).is_err() || terminal {
                    break;
                }
                delay = POLL_INTERVAL;
            }
            Err(e) => {
                debug!("status poll failed for {}: {:#}", workflow_id, e);
                // The session may have been cancelled while the request
                // was in flight; retrying then would leave a zombie poller
                if !*running.borrow() {
                    break;
                }
                let warned = updates.send(SessionUpdate::Log {
                    kind: LogKind::Warning,
                    message: "Durum kontrolü başarısız, tekrar deneniyor...".to_string(),
                });
                if warned.is_err() {
                    break;
                }
                delay = RETRY_INTERVAL;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::WorkflowStatusData;
    use crate::testutil::{completed_status, running_status, FakeBackend};
    use tokio::time::advance;

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    async fn settle() {
        // Let the poll task observe the advanced clock
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn poll_statuses(updates: &[SessionUpdate]) -> Vec<String> {
        updates
            .iter()
            .filter_map(|u| match u {
                SessionUpdate::Poll(data) => Some(data.status.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_terminal_then_stops() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_status(Ok(running_status("test")));
        backend.push_status(Ok(running_status("test")));
        backend.push_status(Ok(completed_status(2, 0, 0)));
        backend.push_status(Ok(running_status("test")));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (running_tx, running_rx) = watch::channel(true);
        let _poller = PollingScheduler::start(backend.clone(), "w-1".to_string(), tx, running_rx);
        settle().await;

        advance(FIRST_POLL_DELAY).await;
        settle().await;
        assert_eq!(backend.status_requests(), 1);

        advance(POLL_INTERVAL).await;
        settle().await;
        advance(POLL_INTERVAL).await;
        settle().await;
        assert_eq!(backend.status_requests(), 3);

        // Terminal snapshot delivered; nothing further is requested
        advance(POLL_INTERVAL * 5).await;
        settle().await;
        assert_eq!(backend.status_requests(), 3);

        let statuses = poll_statuses(&drain(&mut rx));
        assert_eq!(statuses, vec!["RUNNING", "RUNNING", "COMPLETED"]);
        drop(running_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_warns_and_retries() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_status(Err(anyhow::anyhow!("connection refused")));
        backend.push_status(Ok(completed_status(1, 0, 0)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_running_tx, running_rx) = watch::channel(true);
        let _poller = PollingScheduler::start(backend.clone(), "w-1".to_string(), tx, running_rx);
        settle().await;

        advance(FIRST_POLL_DELAY).await;
        settle().await;
        assert_eq!(backend.status_requests(), 1);

        let updates = drain(&mut rx);
        assert!(updates.iter().any(|u| matches!(
            u,
            SessionUpdate::Log { kind: LogKind::Warning, message }
                if message == "Durum kontrolü başarısız, tekrar deneniyor..."
        )));

        // Retry uses the longer interval
        advance(POLL_INTERVAL).await;
        settle().await;
        assert_eq!(backend.status_requests(), 1);
        advance(RETRY_INTERVAL - POLL_INTERVAL).await;
        settle().await;
        assert_eq!(backend.status_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_retry_once_not_running() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_status(Err(anyhow::anyhow!("connection refused")));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (running_tx, running_rx) = watch::channel(true);
        let _poller = PollingScheduler::start(backend.clone(), "w-1".to_string(), tx, running_rx);

        running_tx.send(false).unwrap();
        settle().await;
        advance(FIRST_POLL_DELAY + RETRY_INTERVAL * 5).await;
        settle().await;
        assert_eq!(backend.status_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_the_pending_poll() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_status(Ok(running_status("test")));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (_running_tx, running_rx) = watch::channel(true);
        let mut poller = PollingScheduler::start(backend.clone(), "w-1".to_string(), tx, running_rx);

        poller.cancel();
        settle().await;
        advance(FIRST_POLL_DELAY * 3).await;
        settle().await;
        assert_eq!(backend.status_requests(), 0);

        // Cancelling again is harmless
        poller.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling() {
        let backend = Arc::new(FakeBackend::new());
        let mut analyzing = WorkflowStatusData::default();
        analyzing.status = "ANALYZING".to_string();
        backend.push_status(Ok(analyzing));
        backend.push_status(Ok(completed_status(1, 0, 0)));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (_running_tx, running_rx) = watch::channel(true);
        let _poller = PollingScheduler::start(backend.clone(), "w-1".to_string(), tx, running_rx);
        settle().await;

        advance(FIRST_POLL_DELAY).await;
        settle().await;
        advance(POLL_INTERVAL).await;
        settle().await;
        assert_eq!(backend.status_requests(), 2);
    }
}
