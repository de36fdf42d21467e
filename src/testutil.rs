//! Shared test fixtures: scripted fakes for the automation backend and
//! the push transport, plus status snapshot builders.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::api::client::AutomationBackend;
use crate::api::types::{
    CancelWorkflowResponse, PolledStepResult, StartWorkflowRequest, StartWorkflowResponse,
    WorkflowStatusData,
};
use crate::push::transport::{PushChannel, PushFrame, PushTransport};

/// A RUNNING poll snapshot at the given step, carrying one stale result row
pub fn running_status(step: &str) -> WorkflowStatusData {
    WorkflowStatusData {
        status: "RUNNING".to_string(),
        current_step: Some(step.to_string()),
        test_results: vec![PolledStepResult {
            scenario_id: Some(999),
            scenario_title: Some("Sunucu tarafı kayıt".to_string()),
            status: Some("passed".to_string()),
            duration: Some(1),
        }],
        ..Default::default()
    }
}

pub fn completed_status(success: u32, fail: u32, skipped: u32) -> WorkflowStatusData {
    WorkflowStatusData {
        status: "COMPLETED".to_string(),
        current_step: Some("complete".to_string()),
        success_count: Some(success),
        fail_count: Some(fail),
        skipped_count: Some(skipped),
        ..Default::default()
    }
}

pub fn failed_status(error: Option<&str>) -> WorkflowStatusData {
    WorkflowStatusData {
        status: "FAILED".to_string(),
        error: error.map(|e| e.to_string()),
        ..Default::default()
    }
}

/// Scripted automation backend
///
/// Responses are consumed in push order; an exhausted queue behaves like a
/// network failure.
#[derive(Default)]
pub struct FakeBackend {
    start_responses: Mutex<VecDeque<Result<StartWorkflowResponse>>>,
    status_responses: Mutex<VecDeque<Result<WorkflowStatusData>>>,
    cancel_responses: Mutex<VecDeque<Result<CancelWorkflowResponse>>>,
    start_requests: Mutex<Vec<StartWorkflowRequest>>,
    status_count: AtomicUsize,
    cancel_count: AtomicUsize,
    yield_on_start: std::sync::atomic::AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_start(&self, response: Result<StartWorkflowResponse>) {
        self.start_responses.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, response: Result<WorkflowStatusData>) {
        self.status_responses.lock().unwrap().push_back(response);
    }

    pub fn push_cancel(&self, response: Result<CancelWorkflowResponse>) {
        self.cancel_responses.lock().unwrap().push_back(response);
    }

    pub fn status_requests(&self) -> usize {
        self.status_count.load(Ordering::SeqCst)
    }

    pub fn cancel_requests(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn start_requests(&self) -> Vec<StartWorkflowRequest> {
        self.start_requests.lock().unwrap().clone()
    }

    /// Make `start_workflow` yield to the scheduler before responding,
    /// exposing interleavings around the start suspension point
    pub fn yield_on_start(&self) {
        self.yield_on_start.store(true, Ordering::SeqCst);
    }

    /// Shorthand for a successful start handing out the given workflow id
    pub fn accept_start(&self, workflow_id: &str) {
        self.push_start(Ok(StartWorkflowResponse {
            success: true,
            message: None,
            workflow_id: Some(workflow_id.to_string()),
        }));
    }
}

#[async_trait]
impl AutomationBackend for FakeBackend {
    async fn start_workflow(&self, request: &StartWorkflowRequest) -> Result<StartWorkflowResponse> {
        if self.yield_on_start.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.start_requests.lock().unwrap().push(request.clone());
        self.start_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted start response")))
    }

    async fn workflow_status(&self, _workflow_id: &str) -> Result<WorkflowStatusData> {
        self.status_count.fetch_add(1, Ordering::SeqCst);
        self.status_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted status response")))
    }

    async fn cancel_workflow(&self, _workflow_id: &str) -> Result<CancelWorkflowResponse> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        self.cancel_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted cancel response")))
    }
}

/// Test-side handle to one scripted push connection
pub struct ChannelScript {
    /// Frames the "server" pushes to the client
    pub inbound: mpsc::UnboundedSender<Result<PushFrame>>,
    /// Frames the client sent to the "server"
    pub sent: mpsc::UnboundedReceiver<PushFrame>,
}

impl ChannelScript {
    /// Simulate the server dropping the connection
    pub fn close(&mut self) {
        let (closed, _) = mpsc::unbounded_channel();
        self.inbound = closed;
    }
}

struct ScriptedChannel {
    inbound: mpsc::UnboundedReceiver<Result<PushFrame>>,
    sent: mpsc::UnboundedSender<PushFrame>,
}

#[async_trait]
impl PushChannel for ScriptedChannel {
    async fn recv(&mut self) -> Option<Result<PushFrame>> {
        self.inbound.recv().await
    }

    async fn send(&mut self, frame: PushFrame) -> Result<()> {
        self.sent
            .send(frame)
            .map_err(|_| anyhow::anyhow!("scripted channel closed"))
    }
}

/// Push transport handing out a fixed sequence of scripted connections
pub struct FakeTransport {
    channels: Mutex<VecDeque<ScriptedChannel>>,
    connects: AtomicUsize,
}

impl FakeTransport {
    /// Prepare `count` connections; each successful `connect` consumes one
    pub fn with_channels(count: usize) -> (Self, Vec<ChannelScript>) {
        let mut channels = VecDeque::new();
        let mut scripts = Vec::new();
        for _ in 0..count {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            channels.push_back(ScriptedChannel {
                inbound: inbound_rx,
                sent: sent_tx,
            });
            scripts.push(ChannelScript {
                inbound: inbound_tx,
                sent: sent_rx,
            });
        }
        (
            Self {
                channels: Mutex::new(channels),
                connects: AtomicUsize::new(0),
            },
            scripts,
        )
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self) -> Result<Box<dyn PushChannel>> {
        match self.channels.lock().unwrap().pop_front() {
            Some(channel) => {
                self.connects.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(channel))
            }
            None => Err(anyhow::anyhow!("no scripted connection left")),
        }
    }
}
