//! Outbound calling
//!
//! An outbound call starts as an agent dispatch into a fresh room with the
//! dial info as job metadata. Once the job is running, the agent dials the
//! callee into that room over the outbound SIP trunk.

use crate::application::ports::{AgentDispatch, CallControl, ControlError, SipDialRequest};
use crate::domain::call::{Call, DialInfo};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::PhoneNumber;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidRequest(#[from] DomainError),

    #[error("Dispatch failed: {0}")]
    Control(#[from] ControlError),
}

/// Accepted outbound call request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchTicket {
    pub dispatch_id: String,
    pub room_name: String,
    pub agent_name: String,
}

/// Room name for an outbound call: `outbound_<digits>_<short id>`
pub fn outbound_room_name(phone_number: &PhoneNumber) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("outbound_{}_{}", phone_number.digits(), &id[..8])
}

pub struct OutboundDispatcher {
    dispatch: Arc<dyn AgentDispatch>,
    agent_name: String,
}

impl OutboundDispatcher {
    pub fn new(dispatch: Arc<dyn AgentDispatch>, agent_name: impl Into<String>) -> Self {
        Self {
            dispatch,
            agent_name: agent_name.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Validate the callee number and ask the room server to start an
    /// outbound job. The transfer target is passed through untouched.
    pub async fn dispatch(
        &self,
        phone_number: &str,
        transfer_to: Option<&str>,
    ) -> Result<DispatchTicket, DispatchError> {
        let phone_number = PhoneNumber::parse(phone_number)?;
        let room_name = outbound_room_name(&phone_number);
        let metadata = DialInfo::new(phone_number, transfer_to).to_metadata();

        info!(
            "Dispatching {} to room {} for an outbound call",
            self.agent_name, room_name
        );
        let dispatch_id = self
            .dispatch
            .create_dispatch(&self.agent_name, &room_name, &metadata)
            .await?;
        info!("Dispatch {} created for room {}", dispatch_id, room_name);

        Ok(DispatchTicket {
            dispatch_id,
            room_name,
            agent_name: self.agent_name.clone(),
        })
    }
}

/// Dial the callee of an outbound call and block until they answer.
///
/// The participant identity is the dialed number itself, so it resolves back
/// to the same caller when the participant joins.
pub async fn dial(control: &dyn CallControl, call: &Call, trunk_id: &str) -> Result<(), ControlError> {
    let Some(dial_info) = call.dial_info() else {
        return Err(ControlError::NoParticipant(call.room_name().to_string()));
    };

    let request = SipDialRequest {
        room_name: call.room_name().to_string(),
        trunk_id: trunk_id.to_string(),
        call_to: dial_info.phone_number.as_str().to_string(),
        participant_identity: dial_info.phone_number.as_str().to_string(),
        wait_until_answered: true,
    };

    info!("Dialing {} into room {}", request.call_to, request.room_name);
    match control.create_sip_participant(&request).await {
        Ok(()) => {
            info!("Call {} answered", call.id());
            Ok(())
        }
        Err(e) => {
            match e.sip_status() {
                Some((code, status)) => error!(
                    "Error creating SIP participant for call {}: {}, SIP status: {} {}",
                    call.id(),
                    e,
                    code,
                    status
                ),
                None => error!("Error creating SIP participant for call {}: {}", call.id(), e),
            }
            Err(e)
        }
    }
}
