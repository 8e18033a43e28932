//! Call value objects

use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::PhoneNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Caller dialed into the agent through the SIP trunk
    Inbound,
    /// Agent dialed out to the callee
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

/// Call state
///
/// `ACTIVE -> ENDED` is the only transition. The ending step is guarded by
/// the call's compare-and-set flag and is never observable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    Active,
    Ended(EndReason),
}

impl CallState {
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Active)
    }
}

/// Who spoke a committed utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    User,
    Agent,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::User => "user",
            SpeakerRole::Agent => "agent",
        }
    }
}

/// Reason for call ending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Farewell phrase detected in a committed utterance
    Farewell(SpeakerRole),
    /// Remote participant left the room
    ParticipantLeft,
    /// The end-call tool was invoked
    EndCallRequested,
    /// Voicemail answered instead of a person
    AnsweringMachine,
    /// SIP transfer was rejected by the control plane
    TransferFailed,
    /// Outbound dial never connected
    DialFailed,
    /// The conversation session could not be started
    SessionFailed,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Farewell(SpeakerRole::User) => "user_farewell",
            EndReason::Farewell(SpeakerRole::Agent) => "agent_farewell",
            EndReason::ParticipantLeft => "participant_left",
            EndReason::EndCallRequested => "end_call_requested",
            EndReason::AnsweringMachine => "answering_machine",
            EndReason::TransferFailed => "transfer_failed",
            EndReason::DialFailed => "dial_failed",
            EndReason::SessionFailed => "session_failed",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound dialing request carried in the job metadata
///
/// `transfer_to` is an opaque destination (a number, or a `tel:`/`sip:`
/// URI) handed to the transfer as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialInfo {
    pub phone_number: PhoneNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to: Option<String>,
}

#[derive(Deserialize)]
struct RawDialInfo {
    phone_number: String,
    #[serde(default)]
    transfer_to: Option<serde_json::Value>,
}

fn transfer_target(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl DialInfo {
    pub fn new(phone_number: PhoneNumber, transfer_to: Option<&str>) -> Self {
        Self {
            phone_number,
            transfer_to: transfer_target(transfer_to),
        }
    }

    /// Parse `{"phone_number": "...", "transfer_to": "..."}`.
    ///
    /// Only `phone_number` is required to be valid. An empty or unusable
    /// `transfer_to` means the call cannot be transferred.
    pub fn from_metadata(metadata: &str) -> Result<Self> {
        let raw: RawDialInfo = serde_json::from_str(metadata)
            .map_err(|e| DomainError::InvalidDialInfo(e.to_string()))?;

        let phone_number = PhoneNumber::parse(&raw.phone_number)?;
        let transfer_to = match raw.transfer_to {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(target)) => transfer_target(Some(&target)),
            Some(other) => {
                warn!("Ignoring unusable transfer_to in dial info: {}", other);
                None
            }
        };

        Ok(Self {
            phone_number,
            transfer_to,
        })
    }

    pub fn to_metadata(&self) -> String {
        serde_json::json!({
            "phone_number": self.phone_number.as_str(),
            "transfer_to": self.transfer_to.as_deref().unwrap_or(""),
        })
        .to_string()
    }
}
