pub mod log;
pub mod manager;
pub mod poller;
pub mod reconciler;
pub mod state;

pub use manager::{ProjectRef, RunOptions, SessionError, SessionManager, StartRequest};
pub use state::{SessionSnapshot, SessionStatus};
