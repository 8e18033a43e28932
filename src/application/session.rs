//! Session assembly
//!
//! Binds one job to a call: resolves the caller, composes the instructions,
//! starts the conversation session and feeds every session event into the
//! lifecycle controller until the event stream closes.

use crate::application::lifecycle::{CallLifecycleController, LifecycleSettings, TeardownOutcome};
use crate::application::outbound;
use crate::application::ports::{CallControl, ConversationSession};
use crate::config::{Config, PipelineConfig};
use crate::domain::call::{Call, CallDirection, DialInfo, EndReason, SpeakerRole};
use crate::domain::farewell::FarewellPhraseSet;
use crate::domain::identity::PhoneDirectory;
use crate::domain::prompt::{PromptComposer, CLIENT_NAME_PLACEHOLDER};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Tool invoked by the LLM during the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ToolCall {
    TransferCall {
        #[serde(default)]
        transfer_to: Option<String>,
    },
    EndCall,
    DetectedAnsweringMachine,
}

/// Pipeline metrics reported by the session runtime, durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineMetrics {
    EndOfUtterance { end_of_utterance_delay: f64 },
    Stt { duration: f64 },
    Llm { ttft: f64, duration: f64 },
    Tts { ttfb: f64 },
}

impl PipelineMetrics {
    pub fn record(&self) {
        match self {
            PipelineMetrics::EndOfUtterance { end_of_utterance_delay } => {
                info!("End of utterance delay: {:.3}s", end_of_utterance_delay);
                histogram!("callbot_end_of_utterance_delay_seconds").record(*end_of_utterance_delay);
            }
            PipelineMetrics::Stt { duration } => {
                info!("STT duration: {:.3}s", duration);
                histogram!("callbot_stt_duration_seconds").record(*duration);
            }
            PipelineMetrics::Llm { ttft, duration } => {
                info!("LLM ttft: {:.3}s, duration: {:.3}s", ttft, duration);
                histogram!("callbot_llm_ttft_seconds").record(*ttft);
                histogram!("callbot_llm_duration_seconds").record(*duration);
            }
            PipelineMetrics::Tts { ttfb } => {
                info!("TTS ttfb: {:.3}s", ttfb);
                histogram!("callbot_tts_ttfb_seconds").record(*ttfb);
            }
        }
    }
}

/// Notification delivered by the conversation session
#[derive(Debug)]
pub enum SessionEvent {
    ParticipantJoined { identity: String },
    ParticipantLeft { identity: String },
    UtteranceCommitted { role: SpeakerRole, text: String },
    /// The tool result is sent back through `reply`
    ToolInvoked {
        tool: ToolCall,
        reply: oneshot::Sender<String>,
    },
    Metrics(PipelineMetrics),
}

/// A job handed to the agent by the room server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub room_name: String,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
}

const END_CALL_OUTPUT: &str = "call ended";

/// Everything needed to run calls, built once at startup
pub struct AgentRuntime {
    directory: Arc<PhoneDirectory>,
    farewells: Arc<FarewellPhraseSet>,
    inbound_prompt: PromptComposer,
    outbound_prompt: PromptComposer,
    pipeline: PipelineConfig,
    lifecycle: LifecycleSettings,
    greeting: String,
    outbound_greeting: String,
    warmup_user_text: Option<String>,
    inbound_agent_name: String,
    outbound_agent_name: String,
    outbound_trunk_id: String,
    control: Arc<dyn CallControl>,
}

impl AgentRuntime {
    pub fn from_config(config: &Config, control: Arc<dyn CallControl>) -> Self {
        let agent = &config.agent;
        let heading = agent.prompt_heading.as_deref();

        let inbound_prompt = match &agent.prompt_path {
            Some(path) => PromptComposer::load(path, heading, agent.fallback_persona.clone()),
            None => PromptComposer::new(None, agent.fallback_persona.clone()),
        };
        let outbound_prompt = match &agent.outbound_prompt_path {
            Some(path) => PromptComposer::load(path, heading, agent.fallback_persona.clone()),
            None => inbound_prompt.clone(),
        };

        let farewells = FarewellPhraseSet::new(&agent.farewell_phrases)
            .with_end_tolerance(agent.farewell_end_tolerance);
        info!("Loaded {} farewell phrases", farewells.len());

        let directory = PhoneDirectory::new(agent.directory.clone(), agent.default_client_name.clone());
        if directory.is_empty() {
            warn!("Phone directory is empty, every caller is greeted as {}", directory.default_name());
        } else {
            info!("Loaded {} phone directory entries", directory.len());
        }

        Self {
            directory: Arc::new(directory),
            farewells: Arc::new(farewells),
            inbound_prompt,
            outbound_prompt,
            pipeline: config.pipeline.clone(),
            lifecycle: LifecycleSettings {
                teardown_timeout: config.call.teardown_timeout(),
                playout_timeout: config.call.playout_timeout(),
                agent_farewell_delay: config.call.agent_farewell_delay(),
                transfer_notice: config.call.transfer_notice.clone(),
                transfer_error_notice: config.call.transfer_error_notice.clone(),
            },
            greeting: agent.greeting.clone(),
            outbound_greeting: agent.outbound_greeting.clone(),
            warmup_user_text: agent.warmup_enabled.then(|| agent.warmup_user_text.clone()),
            inbound_agent_name: agent.inbound_agent_name.clone(),
            outbound_agent_name: agent.outbound_agent_name.clone(),
            outbound_trunk_id: config.sip.outbound_trunk_id.clone(),
            control,
        }
    }

    pub fn directory(&self) -> &PhoneDirectory {
        &self.directory
    }

    /// Build the call for a job. Outbound jobs carry dial info in their
    /// metadata; unreadable dial info, an unknown agent name or no agent
    /// name at all is treated as an inbound call.
    pub fn create_call(&self, job: &JobRequest) -> Call {
        match job.agent_name.as_deref() {
            Some(name) if name == self.outbound_agent_name => {
                match job.metadata.as_deref().map(DialInfo::from_metadata) {
                    Some(Ok(dial_info)) => {
                        return Call::outbound(job.room_name.clone(), dial_info, &self.directory);
                    }
                    Some(Err(e)) => warn!("Outbound job for {} has no usable dial info: {}", job.room_name, e),
                    None => warn!("Outbound job for {} has no metadata", job.room_name),
                }
            }
            Some(name) if name != self.inbound_agent_name => {
                warn!("Job for {} names unknown agent {}, handling it as inbound", job.room_name, name);
            }
            _ => {}
        }
        Call::inbound(job.room_name.clone(), job.metadata.clone(), &self.directory)
    }

    /// Run one call to completion. Returns once the event stream has closed
    /// and every scheduled teardown has finished.
    pub async fn run_job(
        &self,
        job: JobRequest,
        session: Arc<dyn ConversationSession>,
        mut events: mpsc::Receiver<SessionEvent>,
    ) -> Arc<Call> {
        let call = Arc::new(self.create_call(&job));
        counter!("callbot_calls_started_total", "direction" => call.direction().as_str()).increment(1);
        info!(
            "Starting {} call {} in room {}",
            call.direction().as_str(),
            call.id(),
            call.room_name()
        );

        let controller = Arc::new(CallLifecycleController::new(
            call.clone(),
            self.control.clone(),
            session.clone(),
            self.farewells.clone(),
            self.lifecycle.clone(),
        ));

        // Scheduled teardowns, and tool/dial tasks that may end the call
        let mut pending: Vec<JoinHandle<TeardownOutcome>> = Vec::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Err(e) = self.start_session(&call, session.as_ref()).await {
            error!("Could not start session for call {}: {}", call.id(), e);
            let controller = controller.clone();
            pending.push(tokio::spawn(async move {
                controller.trigger_end_call(EndReason::SessionFailed).await
            }));
        } else if call.direction() == CallDirection::Outbound {
            // The dial blocks until answered; events keep flowing meanwhile
            let controller = controller.clone();
            let control = self.control.clone();
            let trunk_id = self.outbound_trunk_id.clone();
            tasks.push(tokio::spawn(async move {
                if outbound::dial(control.as_ref(), controller.call(), &trunk_id)
                    .await
                    .is_err()
                {
                    controller.abandon_dial().await;
                }
            }));
        }

        while let Some(event) = events.recv().await {
            pending.retain(|handle| !handle.is_finished());
            tasks.retain(|handle| !handle.is_finished());

            match event {
                SessionEvent::ParticipantJoined { identity } => {
                    let caller = call.participant_joined(&identity, &self.directory).await;
                    info!(
                        "Participant {} joined call {} ({}, {})",
                        identity,
                        call.id(),
                        caller.phone_number,
                        caller.client_name
                    );
                    self.greet(&call, &session, &caller.client_name);
                }
                SessionEvent::ParticipantLeft { identity } => {
                    pending.extend(controller.on_participant_left(&identity));
                }
                SessionEvent::UtteranceCommitted { role, text } => {
                    pending.extend(controller.on_utterance_committed(role, &text));
                }
                SessionEvent::ToolInvoked { tool, reply } => {
                    tasks.push(self.spawn_tool(&controller, tool, reply));
                }
                SessionEvent::Metrics(metrics) => metrics.record(),
            }
        }

        info!("Session events closed for call {}", call.id());
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                error!("Task for call {} failed: {}", call.id(), e);
            }
        }
        for result in futures::future::join_all(pending).await {
            if let Err(e) = result {
                error!("Teardown task for call {} failed: {}", call.id(), e);
            }
        }

        call
    }

    async fn start_session(
        &self,
        call: &Call,
        session: &dyn ConversationSession,
    ) -> Result<(), crate::application::ports::SessionError> {
        let caller = call.identity().await;
        let composer = match call.direction() {
            CallDirection::Inbound => &self.inbound_prompt,
            CallDirection::Outbound => &self.outbound_prompt,
        };
        let instructions = composer.compose(&caller.phone_number, &caller.client_name);

        if let Some(user_text) = &self.warmup_user_text {
            match session.warmup(&instructions, user_text).await {
                Ok(()) => info!("LLM warmed up for call {}", call.id()),
                Err(e) => warn!("LLM warmup failed for call {}: {}", call.id(), e),
            }
        }

        session.start(&instructions, &self.pipeline).await
    }

    /// Greet the caller without holding up event delivery
    fn greet(&self, call: &Arc<Call>, session: &Arc<dyn ConversationSession>, client_name: &str) {
        let template = match call.direction() {
            CallDirection::Inbound => &self.greeting,
            CallDirection::Outbound => &self.outbound_greeting,
        };
        if template.trim().is_empty() {
            return;
        }

        let text = template.replace(CLIENT_NAME_PLACEHOLDER, client_name);
        let call = call.clone();
        let session = session.clone();
        tokio::spawn(async move {
            if call.is_ended() {
                return;
            }
            if let Err(e) = session.say(&text).await {
                warn!("Greeting failed on call {}: {}", call.id(), e);
            }
        });
    }

    fn spawn_tool(
        &self,
        controller: &Arc<CallLifecycleController>,
        tool: ToolCall,
        reply: oneshot::Sender<String>,
    ) -> JoinHandle<()> {
        info!("Tool {:?} invoked on call {}", tool, controller.call().id());

        let controller = controller.clone();
        let fallback_transfer = controller
            .call()
            .dial_info()
            .and_then(|dial| dial.transfer_to.clone());

        tokio::spawn(async move {
            let output = match tool {
                ToolCall::TransferCall { transfer_to } => {
                    let destination = transfer_to
                        .filter(|t| !t.trim().is_empty())
                        .or(fallback_transfer)
                        .unwrap_or_default();
                    controller.transfer_call(&destination).await.tool_output()
                }
                ToolCall::EndCall => {
                    controller.end_call_requested().await;
                    END_CALL_OUTPUT
                }
                ToolCall::DetectedAnsweringMachine => {
                    controller.detected_answering_machine().await;
                    END_CALL_OUTPUT
                }
            };

            // The runtime may have gone away; nothing left to tell it
            let _ = reply.send(output.to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockCallControl;

    fn runtime() -> AgentRuntime {
        AgentRuntime::from_config(&Config::default(), Arc::new(MockCallControl::new()))
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let tool: ToolCall = serde_json::from_str(r#"{"name":"transfer_call","transfer_to":"+15550001111"}"#).unwrap();
        assert_eq!(
            tool,
            ToolCall::TransferCall {
                transfer_to: Some("+15550001111".to_string())
            }
        );

        let tool: ToolCall = serde_json::from_str(r#"{"name":"transfer_call"}"#).unwrap();
        assert_eq!(tool, ToolCall::TransferCall { transfer_to: None });

        let tool: ToolCall = serde_json::from_str(r#"{"name":"detected_answering_machine"}"#).unwrap();
        assert_eq!(tool, ToolCall::DetectedAnsweringMachine);

        assert!(serde_json::from_str::<ToolCall>(r#"{"name":"look_up_availability"}"#).is_err());
    }

    #[test]
    fn test_pipeline_metrics_are_tagged() {
        let metrics: PipelineMetrics =
            serde_json::from_str(r#"{"kind":"llm","ttft":0.25,"duration":1.5}"#).unwrap();
        assert_eq!(
            metrics,
            PipelineMetrics::Llm {
                ttft: 0.25,
                duration: 1.5
            }
        );
        // Recording without an installed recorder is a no-op
        metrics.record();
    }

    #[test]
    fn test_create_call_direction() {
        let runtime = runtime();

        let inbound = runtime.create_call(&JobRequest {
            room_name: "call_79137296699_x".to_string(),
            metadata: None,
            agent_name: Some("elaina-inbound-mango".to_string()),
        });
        assert_eq!(inbound.direction(), CallDirection::Inbound);

        let outbound = runtime.create_call(&JobRequest {
            room_name: "outbound_79137296699_1".to_string(),
            metadata: Some(r#"{"phone_number":"79137296699","transfer_to":""}"#.to_string()),
            agent_name: Some("elaina-outbound-caller".to_string()),
        });
        assert_eq!(outbound.direction(), CallDirection::Outbound);

        // URI transfer targets keep the job outbound
        for target in ["tel:+79991112233", "sip:operator@pbx.local"] {
            let call = runtime.create_call(&JobRequest {
                room_name: "outbound_79137296699_2".to_string(),
                metadata: Some(format!(
                    r#"{{"phone_number":"79137296699","transfer_to":"{}"}}"#,
                    target
                )),
                agent_name: Some("elaina-outbound-caller".to_string()),
            });
            assert_eq!(call.direction(), CallDirection::Outbound);
            assert_eq!(
                call.dial_info().and_then(|d| d.transfer_to.as_deref()),
                Some(target)
            );
        }

        let unknown = runtime.create_call(&JobRequest {
            room_name: "call_79137296699_y".to_string(),
            metadata: Some(r#"{"phone_number":"79137296699"}"#.to_string()),
            agent_name: Some("some-other-agent".to_string()),
        });
        assert_eq!(unknown.direction(), CallDirection::Inbound);

        // Unusable dial info downgrades to an inbound call
        let broken = runtime.create_call(&JobRequest {
            room_name: "outbound_x".to_string(),
            metadata: Some("{}".to_string()),
            agent_name: Some("elaina-outbound-caller".to_string()),
        });
        assert_eq!(broken.direction(), CallDirection::Inbound);
    }

    #[tokio::test]
    async fn test_outbound_caller_name_from_directory() {
        let runtime = runtime();
        let call = runtime.create_call(&JobRequest {
            room_name: "outbound_79137296699_1".to_string(),
            metadata: Some(r#"{"phone_number":"79137296699"}"#.to_string()),
            agent_name: Some("elaina-outbound-caller".to_string()),
        });

        assert_eq!(call.identity().await.client_name, "Павел");
        assert_eq!(runtime.directory().default_name(), "Иван");
        assert_eq!(runtime.directory().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_directory_greets_by_default_name() {
        let mut config = Config::default();
        config.agent.directory.clear();
        let runtime = AgentRuntime::from_config(&config, Arc::new(MockCallControl::new()));
        assert!(runtime.directory().is_empty());

        let call = runtime.create_call(&JobRequest {
            room_name: "call_79137296699_abc".to_string(),
            metadata: None,
            agent_name: Some("elaina-inbound-mango".to_string()),
        });
        assert_eq!(call.identity().await.client_name, "Иван");
    }
}
