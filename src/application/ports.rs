//! Ports to the collaborators the call agent drives
//!
//! The control plane (room deletion, SIP transfer, dialing, dispatch) and the
//! speech session runtime are external. These traits are the only surface the
//! application layer sees; adapters live in `infrastructure` and `interface`.

use crate::config::PipelineConfig;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the call-control plane
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Control plane rejected request ({code}): {message}")]
    Rejected {
        code: String,
        message: String,
        sip_status_code: Option<String>,
        sip_status: Option<String>,
    },

    #[error("Room service error: {0}")]
    RoomService(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Access token error: {0}")]
    Token(String),

    #[error("No participant to act on in room {0}")]
    NoParticipant(String),
}

impl ControlError {
    /// SIP status code and phrase attached by the SIP bridge, if any
    pub fn sip_status(&self) -> Option<(&str, &str)> {
        match self {
            ControlError::Rejected {
                sip_status_code: Some(code),
                sip_status,
                ..
            } => Some((code.as_str(), sip_status.as_deref().unwrap_or(""))),
            _ => None,
        }
    }
}

/// Request to dial a phone number into a room through a SIP trunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipDialRequest {
    pub room_name: String,
    pub trunk_id: String,
    pub call_to: String,
    pub participant_identity: String,
    /// Block until the callee answers or the dial fails
    pub wait_until_answered: bool,
}

/// Call-control operations against the real-time room server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Delete the room, disconnecting every participant
    async fn delete_room(&self, room_name: &str) -> Result<(), ControlError>;

    /// Move a SIP participant to another destination (`tel:` or `sip:` URI)
    async fn transfer_participant(
        &self,
        room_name: &str,
        participant_identity: &str,
        destination: &str,
    ) -> Result<(), ControlError>;

    /// Place an outbound SIP call into a room
    async fn create_sip_participant(&self, request: &SipDialRequest) -> Result<(), ControlError>;
}

/// Asks the room server to hand a new job to a named agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentDispatch: Send + Sync {
    /// Returns the dispatch id
    async fn create_dispatch(
        &self,
        agent_name: &str,
        room_name: &str,
        metadata: &str,
    ) -> Result<String, ControlError>;
}

/// Failure reported by the speech session runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session runtime rejected command: {0}")]
    Rejected(String),

    #[error("Session command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session runtime disconnected")]
    Disconnected,
}

/// The conversation session: STT, LLM and TTS bound to one room
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationSession: Send + Sync {
    /// Start the pipeline with the given system instructions
    async fn start(&self, instructions: &str, pipeline: &PipelineConfig) -> Result<(), SessionError>;

    /// Prime the LLM's prompt cache with a throwaway exchange
    async fn warmup(&self, instructions: &str, user_text: &str) -> Result<(), SessionError>;

    /// Speak fixed text; resolves once it has been spoken
    async fn say(&self, text: &str) -> Result<(), SessionError>;

    /// Let the LLM produce and speak a reply; resolves once it has been spoken
    async fn generate_reply(&self, instructions: &str) -> Result<(), SessionError>;

    /// Resolves when any in-flight speech has finished playing out
    async fn wait_for_playout(&self) -> Result<(), SessionError>;

    /// Close the job and leave the room
    async fn close(&self) -> Result<(), SessionError>;
}
