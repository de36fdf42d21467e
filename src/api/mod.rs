pub mod client;
pub mod types;

pub use client::{AutomationBackend, AutomationClient};
pub use types::{RemoteStatus, StartWorkflowRequest, WorkflowStatusData};
