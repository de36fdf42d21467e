pub mod api;
pub mod config;
pub mod push;
pub mod render;
pub mod session;

#[cfg(test)]
pub mod testutil;

// Re-export common items
pub use api::client::{AutomationBackend, AutomationClient};
pub use config::Config;
pub use push::{ConnectionSupervisor, WsTransport};
pub use session::{SessionManager, StartRequest};
