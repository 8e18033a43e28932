//! Hand-written fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use callbot::application::ports::{
    AgentDispatch, CallControl, ControlError, ConversationSession, SessionError, SipDialRequest,
};
use callbot::application::outbound::OutboundDispatcher;
use callbot::application::session::AgentRuntime;
use callbot::config::{Config, PipelineConfig};
use callbot::interface::api::AppState;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub fn rejected(message: &str) -> ControlError {
    ControlError::Rejected {
        code: "unavailable".to_string(),
        message: message.to_string(),
        sip_status_code: Some("486".to_string()),
        sip_status: Some("Busy Here".to_string()),
    }
}

/// Records every control-plane request; each operation can be set to fail
#[derive(Default)]
pub struct FakeControl {
    pub deleted_rooms: Mutex<Vec<String>>,
    pub transfers: Mutex<Vec<(String, String, String)>>,
    pub dials: Mutex<Vec<SipDialRequest>>,
    pub dispatches: Mutex<Vec<(String, String, String)>>,
    pub fail_delete: AtomicBool,
    pub fail_transfer: AtomicBool,
    pub fail_dial: AtomicBool,
}

impl FakeControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn delete_count(&self) -> usize {
        self.deleted_rooms.lock().await.len()
    }
}

#[async_trait]
impl CallControl for FakeControl {
    async fn delete_room(&self, room_name: &str) -> Result<(), ControlError> {
        self.deleted_rooms.lock().await.push(room_name.to_string());
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ControlError::RoomService("room not found".to_string()));
        }
        Ok(())
    }

    async fn transfer_participant(
        &self,
        room_name: &str,
        participant_identity: &str,
        destination: &str,
    ) -> Result<(), ControlError> {
        self.transfers.lock().await.push((
            room_name.to_string(),
            participant_identity.to_string(),
            destination.to_string(),
        ));
        if self.fail_transfer.load(Ordering::SeqCst) {
            return Err(rejected("transfer rejected"));
        }
        Ok(())
    }

    async fn create_sip_participant(&self, request: &SipDialRequest) -> Result<(), ControlError> {
        self.dials.lock().await.push(request.clone());
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(rejected("callee busy"));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentDispatch for FakeControl {
    async fn create_dispatch(
        &self,
        agent_name: &str,
        room_name: &str,
        metadata: &str,
    ) -> Result<String, ControlError> {
        self.dispatches.lock().await.push((
            agent_name.to_string(),
            room_name.to_string(),
            metadata.to_string(),
        ));
        Ok("AD_test".to_string())
    }
}

/// Command observed by [`FakeSession`]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Warmup(String),
    Start(String),
    Say(String),
    GenerateReply(String),
    WaitForPlayout,
    Close,
}

/// Session that accepts every command immediately, unless told otherwise
#[derive(Default)]
pub struct FakeSession {
    pub commands: Mutex<Vec<Command>>,
    pub fail_start: AtomicBool,
    pub fail_playout: AtomicBool,
}

impl FakeSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn commands(&self) -> Vec<Command> {
        self.commands.lock().await.clone()
    }
}

#[async_trait]
impl ConversationSession for FakeSession {
    async fn start(&self, instructions: &str, _pipeline: &PipelineConfig) -> Result<(), SessionError> {
        self.commands.lock().await.push(Command::Start(instructions.to_string()));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(SessionError::Rejected("no speech runtime".to_string()));
        }
        Ok(())
    }

    async fn warmup(&self, instructions: &str, _user_text: &str) -> Result<(), SessionError> {
        self.commands.lock().await.push(Command::Warmup(instructions.to_string()));
        Ok(())
    }

    async fn say(&self, text: &str) -> Result<(), SessionError> {
        self.commands.lock().await.push(Command::Say(text.to_string()));
        Ok(())
    }

    async fn generate_reply(&self, instructions: &str) -> Result<(), SessionError> {
        self.commands
            .lock()
            .await
            .push(Command::GenerateReply(instructions.to_string()));
        Ok(())
    }

    async fn wait_for_playout(&self) -> Result<(), SessionError> {
        self.commands.lock().await.push(Command::WaitForPlayout);
        if self.fail_playout.load(Ordering::SeqCst) {
            return Err(SessionError::Disconnected);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.commands.lock().await.push(Command::Close);
        Ok(())
    }
}

/// Defaults with short timings so tests do not wait on real delays
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.call.agent_farewell_delay_ms = 10;
    config.call.teardown_timeout_ms = 500;
    config.call.playout_timeout_ms = 500;
    config.session.command_timeout_ms = 2000;
    config.sip.outbound_trunk_id = "ST_test".to_string();
    config
}

/// Router state wired to `control` for both calls and dispatches
pub fn app_state(control: Arc<FakeControl>) -> AppState {
    app_state_with(control, test_config())
}

pub fn app_state_with(control: Arc<FakeControl>, config: Config) -> AppState {
    AppState {
        runtime: Arc::new(AgentRuntime::from_config(&config, control.clone())),
        dispatcher: Arc::new(OutboundDispatcher::new(
            control,
            config.agent.outbound_agent_name.clone(),
        )),
        session: config.session.clone(),
    }
}

/// Handle on a recorder that is never installed globally
pub fn prometheus_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Poll `check` until it holds or the deadline passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
