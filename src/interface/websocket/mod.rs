//! Sidecar session runtime connection

pub mod handler;
pub mod protocol;
pub mod session;

pub use handler::agent_ws_handler;
pub use protocol::{AgentMessage, RuntimeMessage};
pub use session::WsConversationSession;
