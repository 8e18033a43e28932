//! Application layer - Use cases and application services
//!
//! Orchestrates the call domain against the ports to the room server and
//! the speech session runtime:
//! - Call lifecycle (farewell, transfer, hang-up)
//! - Session assembly per job
//! - Outbound dispatch and dialing

pub mod lifecycle;
pub mod outbound;
pub mod ports;
pub mod session;

pub use lifecycle::{CallLifecycleController, LifecycleSettings, TeardownOutcome, TeardownStrategy, TransferOutcome};
pub use outbound::{DispatchError, DispatchTicket, OutboundDispatcher};
pub use ports::{AgentDispatch, CallControl, ControlError, ConversationSession, SessionError, SipDialRequest};
pub use session::{AgentRuntime, JobRequest, PipelineMetrics, SessionEvent, ToolCall};
