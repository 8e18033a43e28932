//! LiveKit adapter for the call-control and dispatch ports
//!
//! Room deletion and agent dispatch use the `livekit-api` service clients.
//! SIP transfer and SIP dialing go through [`TwirpClient`]: the crate's SIP
//! client has no transfer call, and its error type drops the `meta` that
//! carries the SIP status of a failed dial.

use super::twirp::TwirpClient;
use crate::application::ports::{AgentDispatch, CallControl, ControlError, SipDialRequest};
use crate::config::LiveKitConfig;
use async_trait::async_trait;
use livekit_api::access_token::{AccessToken, SIPGrants, VideoGrants};
use livekit_api::services::agent_dispatch::AgentDispatchClient;
use livekit_api::services::room::RoomClient;
use livekit_api::services::{ServiceError, TwirpError};
use livekit_protocol as proto;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const SIP_SERVICE: &str = "livekit.SIP";

/// Lifetime of the tokens minted for single API calls
const TOKEN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
struct TransferSipParticipantRequest<'a> {
    room_name: &'a str,
    participant_identity: &'a str,
    transfer_to: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateSipParticipantRequest<'a> {
    sip_trunk_id: &'a str,
    sip_call_to: &'a str,
    room_name: &'a str,
    participant_identity: &'a str,
    wait_until_answered: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

/// Map a `livekit-api` service failure onto the port's error
fn control_error(error: ServiceError) -> ControlError {
    match error {
        ServiceError::Twirp(TwirpError::Twirp(rejection)) => ControlError::Rejected {
            code: rejection.code,
            message: rejection.msg,
            sip_status_code: None,
            sip_status: None,
        },
        ServiceError::AccessToken(e) => ControlError::Token(e.to_string()),
        other => ControlError::Transport(other.to_string()),
    }
}

pub struct LiveKitControl {
    config: LiveKitConfig,
    room_client: RoomClient,
    dispatch_client: AgentDispatchClient,
    twirp: TwirpClient,
}

impl LiveKitControl {
    pub fn new(config: LiveKitConfig, request_timeout: Duration) -> Result<Self, ControlError> {
        let twirp = TwirpClient::new(&config.url, request_timeout)?;
        let room_client = RoomClient::with_api_key(twirp.base_url(), &config.api_key, &config.api_secret);
        let dispatch_client =
            AgentDispatchClient::with_api_key(twirp.base_url(), &config.api_key, &config.api_secret);

        Ok(Self {
            config,
            room_client,
            dispatch_client,
            twirp,
        })
    }

    /// Token for server-side calls scoped to one room
    fn admin_token(&self, room_name: &str, sip_call: bool) -> Result<String, ControlError> {
        let mut token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_grants(VideoGrants {
                room_admin: true,
                room: room_name.to_string(),
                ..Default::default()
            })
            .with_ttl(TOKEN_TTL);

        if sip_call {
            token = token.with_sip_grants(SIPGrants {
                call: true,
                ..Default::default()
            });
        }

        token.to_jwt().map_err(|e| ControlError::Token(e.to_string()))
    }
}

#[async_trait]
impl CallControl for LiveKitControl {
    async fn delete_room(&self, room_name: &str) -> Result<(), ControlError> {
        info!("Deleting room {}", room_name);
        self.room_client
            .delete_room(room_name)
            .await
            .map_err(|e| ControlError::RoomService(e.to_string()))
    }

    async fn transfer_participant(
        &self,
        room_name: &str,
        participant_identity: &str,
        destination: &str,
    ) -> Result<(), ControlError> {
        let token = self.admin_token(room_name, true)?;
        let request = TransferSipParticipantRequest {
            room_name,
            participant_identity,
            transfer_to: destination,
        };

        let _: Empty = self
            .twirp
            .call(SIP_SERVICE, "TransferSIPParticipant", &token, &request)
            .await?;
        Ok(())
    }

    async fn create_sip_participant(&self, request: &SipDialRequest) -> Result<(), ControlError> {
        let token = self.admin_token(&request.room_name, true)?;
        let body = CreateSipParticipantRequest {
            sip_trunk_id: &request.trunk_id,
            sip_call_to: &request.call_to,
            room_name: &request.room_name,
            participant_identity: &request.participant_identity,
            wait_until_answered: request.wait_until_answered,
        };

        let _: serde_json::Value = self
            .twirp
            .call(SIP_SERVICE, "CreateSIPParticipant", &token, &body)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AgentDispatch for LiveKitControl {
    async fn create_dispatch(
        &self,
        agent_name: &str,
        room_name: &str,
        metadata: &str,
    ) -> Result<String, ControlError> {
        info!("Creating dispatch of {} into room {}", agent_name, room_name);
        let dispatch = self
            .dispatch_client
            .create_dispatch(proto::CreateAgentDispatchRequest {
                agent_name: agent_name.to_string(),
                room: room_name.to_string(),
                metadata: metadata.to_string(),
                ..Default::default()
            })
            .await
            .map_err(control_error)?;
        Ok(dispatch.id)
    }
}
