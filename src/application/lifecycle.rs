//! Call lifecycle controller
//!
//! Coordinates everything that can end or move a call: farewell phrases from
//! either side, the remote participant leaving, and the transfer / end-call /
//! answering-machine tools. Any number of these may race; the call's
//! compare-and-set flag lets exactly one of them perform the teardown.

use crate::application::ports::{CallControl, ConversationSession};
use crate::domain::call::{Call, EndReason, SpeakerRole};
use crate::domain::farewell::FarewellPhraseSet;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Timing and wording knobs for the controller
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Upper bound on each teardown attempt
    pub teardown_timeout: Duration,
    /// Upper bound on waiting for speech to finish before ending
    pub playout_timeout: Duration,
    /// Pause after an agent-spoken farewell so trailing audio is not cut
    pub agent_farewell_delay: Duration,
    /// Instructions for the reply announcing a transfer
    pub transfer_notice: String,
    /// Instructions for the reply apologising for a failed transfer
    pub transfer_error_notice: String,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_secs(5),
            playout_timeout: Duration::from_secs(10),
            agent_farewell_delay: Duration::from_millis(500),
            transfer_notice: "Сообщите пользователю, что вы собираетесь их перевести.".to_string(),
            transfer_error_notice: "Сообщите пользователю, что при переводе звонка произошла ошибка."
                .to_string(),
        }
    }
}

/// Ways of terminating a call, tried in [`TeardownStrategy::ORDER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStrategy {
    /// Delete the room through the control plane
    DeleteRoom,
    /// Close the job's session
    CloseSession,
}

impl TeardownStrategy {
    pub const ORDER: [TeardownStrategy; 2] =
        [TeardownStrategy::DeleteRoom, TeardownStrategy::CloseSession];

    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownStrategy::DeleteRoom => "delete_room",
            TeardownStrategy::CloseSession => "close_session",
        }
    }
}

/// Result of a teardown request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// Another trigger already ended the call; nothing was done
    AlreadyEnded,
    /// The call was torn down with the given strategy
    Completed(TeardownStrategy),
    /// Every strategy failed; the errors are in attempt order
    Failed(Vec<(TeardownStrategy, String)>),
}

/// Result of a transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// No destination was given; nothing was done
    NoDestination,
    /// The call had already ended; nothing was done
    CallEnded,
    Transferred,
    /// The transfer failed and the call was ended instead
    FailedAndEnded,
}

impl TransferOutcome {
    /// Text handed back to the LLM as the tool result
    pub fn tool_output(&self) -> &'static str {
        match self {
            TransferOutcome::NoDestination | TransferOutcome::CallEnded => "cannot transfer call",
            TransferOutcome::Transferred => "transferred",
            TransferOutcome::FailedAndEnded => "transfer failed, call ended",
        }
    }
}

pub struct CallLifecycleController {
    call: Arc<Call>,
    control: Arc<dyn CallControl>,
    session: Arc<dyn ConversationSession>,
    farewells: Arc<FarewellPhraseSet>,
    settings: LifecycleSettings,
}

impl CallLifecycleController {
    pub fn new(
        call: Arc<Call>,
        control: Arc<dyn CallControl>,
        session: Arc<dyn ConversationSession>,
        farewells: Arc<FarewellPhraseSet>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            call,
            control,
            session,
            farewells,
            settings,
        }
    }

    pub fn call(&self) -> &Arc<Call> {
        &self.call
    }

    /// End the call. Idempotent and safe to call concurrently: the flag is
    /// set before any I/O, so only the first caller tears anything down.
    /// Failures are logged and reported in the outcome, never raised.
    pub async fn trigger_end_call(&self, reason: EndReason) -> TeardownOutcome {
        self.end_with(reason, &TeardownStrategy::ORDER).await
    }

    /// End an outbound call whose dial never connected. The room was created
    /// for this call alone and holds no caller, so only the session is closed.
    pub async fn abandon_dial(&self) -> TeardownOutcome {
        self.end_with(EndReason::DialFailed, &[TeardownStrategy::CloseSession])
            .await
    }

    async fn end_with(&self, reason: EndReason, strategies: &[TeardownStrategy]) -> TeardownOutcome {
        if !self.call.try_end(reason).await {
            info!("Call {} already ended, skipping duplicate ({})", self.call.id(), reason);
            return TeardownOutcome::AlreadyEnded;
        }

        counter!("callbot_calls_ended_total", "reason" => reason.as_str()).increment(1);
        info!(
            "Ending call {} in room {} after {}s ({})",
            self.call.id(),
            self.call.room_name(),
            self.call.elapsed().num_seconds(),
            reason
        );

        let mut failures = Vec::new();
        for &strategy in strategies {
            match self.attempt_teardown(strategy).await {
                Ok(()) => {
                    info!("Call {} torn down via {}", self.call.id(), strategy.as_str());
                    return TeardownOutcome::Completed(strategy);
                }
                Err(e) => {
                    error!(
                        "Teardown of call {} via {} failed: {}",
                        self.call.id(),
                        strategy.as_str(),
                        e
                    );
                    failures.push((strategy, e));
                }
            }
        }

        counter!("callbot_teardown_failures_total").increment(1);
        warn!(
            "All teardown strategies failed for call {}; leaving room {} to the server's session timeout",
            self.call.id(),
            self.call.room_name()
        );
        TeardownOutcome::Failed(failures)
    }

    async fn attempt_teardown(&self, strategy: TeardownStrategy) -> Result<(), String> {
        let attempt = async {
            match strategy {
                TeardownStrategy::DeleteRoom => self
                    .control
                    .delete_room(self.call.room_name())
                    .await
                    .map_err(|e| e.to_string()),
                TeardownStrategy::CloseSession => {
                    self.session.close().await.map_err(|e| e.to_string())
                }
            }
        };

        match tokio::time::timeout(self.settings.teardown_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {:?}", self.settings.teardown_timeout)),
        }
    }

    /// Transfer the caller to `transfer_to`. A failed transfer always ends
    /// the call rather than leaving it hanging.
    pub async fn transfer_call(&self, transfer_to: &str) -> TransferOutcome {
        let transfer_to = transfer_to.trim();
        if transfer_to.is_empty() {
            warn!("Cannot transfer call {}: no destination", self.call.id());
            return TransferOutcome::NoDestination;
        }
        if self.call.is_ended() {
            warn!("Cannot transfer call {}: already ended", self.call.id());
            return TransferOutcome::CallEnded;
        }

        info!("Transferring call {} to {}", self.call.id(), transfer_to);

        if let Err(e) = self.session.generate_reply(&self.settings.transfer_notice).await {
            warn!("Could not announce transfer on call {}: {}", self.call.id(), e);
        }

        let destination = if transfer_to.starts_with("tel:") || transfer_to.starts_with("sip:") {
            transfer_to.to_string()
        } else {
            format!("tel:{}", transfer_to)
        };

        let result = match self.call.participant_identity().await {
            Some(identity) => {
                self.control
                    .transfer_participant(self.call.room_name(), &identity, &destination)
                    .await
            }
            None => Err(crate::application::ports::ControlError::NoParticipant(
                self.call.room_name().to_string(),
            )),
        };

        match result {
            Ok(()) => {
                counter!("callbot_transfers_total", "result" => "ok").increment(1);
                info!("Transferred call {} to {}", self.call.id(), destination);
                TransferOutcome::Transferred
            }
            Err(e) => {
                counter!("callbot_transfers_total", "result" => "failed").increment(1);
                error!("Error transferring call {}: {}", self.call.id(), e);

                if let Err(e) = self.session.generate_reply(&self.settings.transfer_error_notice).await {
                    warn!("Could not announce transfer failure on call {}: {}", self.call.id(), e);
                }
                self.trigger_end_call(EndReason::TransferFailed).await;
                TransferOutcome::FailedAndEnded
            }
        }
    }

    /// Voicemail picked up; hang up unconditionally.
    pub async fn detected_answering_machine(&self) -> TeardownOutcome {
        info!("Detected answering machine on call {}", self.call.id());
        self.trigger_end_call(EndReason::AnsweringMachine).await
    }

    /// The caller asked to end the call. Lets the closing remark play out
    /// first; a failed or slow playout wait does not prevent the hang-up.
    pub async fn end_call_requested(&self) -> TeardownOutcome {
        info!("End of call {} requested", self.call.id());

        match tokio::time::timeout(self.settings.playout_timeout, self.session.wait_for_playout()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Error waiting for speech playout on call {}: {}", self.call.id(), e),
            Err(_) => warn!(
                "Speech playout on call {} did not finish within {:?}",
                self.call.id(),
                self.settings.playout_timeout
            ),
        }

        self.trigger_end_call(EndReason::EndCallRequested).await
    }

    /// Check a committed utterance for a farewell and, if one is found,
    /// schedule the teardown without blocking the caller.
    pub fn on_utterance_committed(
        self: &Arc<Self>,
        role: SpeakerRole,
        text: &str,
    ) -> Option<JoinHandle<TeardownOutcome>> {
        info!("[{}] {}", role.as_str(), text);

        if self.call.is_ended() {
            return None;
        }

        let phrase = self.farewells.matching_phrase(text)?;
        info!(
            "Farewell \"{}\" from {} on call {}, ending",
            phrase,
            role.as_str(),
            self.call.id()
        );
        counter!("callbot_farewells_detected_total", "speaker" => role.as_str()).increment(1);

        let delay = match role {
            SpeakerRole::Agent => self.settings.agent_farewell_delay,
            SpeakerRole::User => Duration::ZERO,
        };

        let controller = Arc::clone(self);
        Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            controller.trigger_end_call(EndReason::Farewell(role)).await
        }))
    }

    /// A participant left the room; schedule the teardown unless already ended.
    pub fn on_participant_left(self: &Arc<Self>, identity: &str) -> Option<JoinHandle<TeardownOutcome>> {
        info!("Participant {} left call {}", identity, self.call.id());

        if self.call.is_ended() {
            return None;
        }

        let controller = Arc::clone(self);
        Some(tokio::spawn(async move {
            controller.trigger_end_call(EndReason::ParticipantLeft).await
        }))
    }
}
