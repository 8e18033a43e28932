//! Sidecar session protocol
//!
//! JSON text frames tagged by `type`. The session runtime owns the audio
//! pipeline and reports what happens in the room; the agent answers with
//! commands. Every command carrying an `id` is acknowledged by a `reply`.

use crate::application::session::{JobRequest, PipelineMetrics, ToolCall};
use crate::config::PipelineConfig;
use crate::domain::call::SpeakerRole;
use serde::{Deserialize, Serialize};

/// Runtime → agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    /// Always the first frame on a connection
    Job(JobRequest),
    ParticipantJoined {
        identity: String,
    },
    ParticipantLeft {
        identity: String,
    },
    UtteranceCommitted {
        role: SpeakerRole,
        text: String,
    },
    ToolCall {
        call_id: String,
        tool: ToolCall,
    },
    Metrics {
        metrics: PipelineMetrics,
    },
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Agent → runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    StartSession {
        id: u64,
        instructions: String,
        pipeline: PipelineConfig,
    },
    Warmup {
        id: u64,
        instructions: String,
        user_text: String,
    },
    Say {
        id: u64,
        text: String,
    },
    GenerateReply {
        id: u64,
        instructions: String,
    },
    WaitForPlayout {
        id: u64,
    },
    Close {
        id: u64,
    },
    ToolResult {
        call_id: String,
        output: String,
    },
}

impl AgentMessage {
    /// Id of the reply this message expects, if any
    pub fn id(&self) -> Option<u64> {
        match self {
            AgentMessage::StartSession { id, .. }
            | AgentMessage::Warmup { id, .. }
            | AgentMessage::Say { id, .. }
            | AgentMessage::GenerateReply { id, .. }
            | AgentMessage::WaitForPlayout { id }
            | AgentMessage::Close { id } => Some(*id),
            AgentMessage::ToolResult { .. } => None,
        }
    }
}
