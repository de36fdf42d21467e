pub mod events;
pub mod supervisor;
pub mod transport;

pub use events::{PushEvent, AUTOMATION_TOPIC};
pub use supervisor::ConnectionSupervisor;
pub use transport::{PushFrame, PushTransport, WsTransport};
