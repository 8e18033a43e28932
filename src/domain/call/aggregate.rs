//! Call aggregate root

use crate::domain::call::value_object::{CallDirection, CallState, DialInfo, EndReason};
use crate::domain::identity::{resolve_caller, CallerIdentity, PhoneDirectory};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// One active telephony session bound to a room.
///
/// Shared between every event handler of the call behind an `Arc`. The
/// `ended` flag only ever moves from `false` to `true`, and the first caller
/// of [`Call::try_end`] is the only one that wins it. The flag and the end
/// reason change under the same lock, so `is_ended()` never disagrees with
/// `state()`.
#[derive(Debug)]
pub struct Call {
    id: CallId,
    room_name: String,
    direction: CallDirection,
    /// Raw job metadata, kept for re-resolution after the participant joins
    metadata: Option<String>,
    dial_info: Option<DialInfo>,
    started_at: DateTime<Utc>,
    identity: RwLock<CallerIdentity>,
    participant_identity: RwLock<Option<String>>,
    ended: AtomicBool,
    end_state: RwLock<CallState>,
}

impl Call {
    /// Create an inbound call, resolving the caller from metadata and room name.
    pub fn inbound(room_name: impl Into<String>, metadata: Option<String>, directory: &PhoneDirectory) -> Self {
        let room_name = room_name.into();
        let identity = resolve_caller(metadata.as_deref(), &room_name, None, directory);
        Self::build(room_name, CallDirection::Inbound, metadata, None, identity)
    }

    /// Create an outbound call towards `dial_info.phone_number`.
    pub fn outbound(room_name: impl Into<String>, dial_info: DialInfo, directory: &PhoneDirectory) -> Self {
        let phone_number = dial_info.phone_number.as_str().to_string();
        let identity = CallerIdentity {
            client_name: directory.lookup(&phone_number).to_string(),
            phone_number,
        };
        Self::build(
            room_name.into(),
            CallDirection::Outbound,
            Some(dial_info.to_metadata()),
            Some(dial_info),
            identity,
        )
    }

    fn build(
        room_name: String,
        direction: CallDirection,
        metadata: Option<String>,
        dial_info: Option<DialInfo>,
        identity: CallerIdentity,
    ) -> Self {
        Self {
            id: CallId::new(),
            room_name,
            direction,
            metadata,
            dial_info,
            started_at: Utc::now(),
            identity: RwLock::new(identity),
            participant_identity: RwLock::new(None),
            ended: AtomicBool::new(false),
            end_state: RwLock::new(CallState::Active),
        }
    }

    /// Record the joined participant. Re-resolves the caller only if the
    /// phone number is still unknown; an already resolved number is kept.
    pub async fn participant_joined(&self, participant_identity: &str, directory: &PhoneDirectory) -> CallerIdentity {
        *self.participant_identity.write().await = Some(participant_identity.to_string());

        let mut identity = self.identity.write().await;
        if !identity.is_resolved() {
            *identity = resolve_caller(
                self.metadata.as_deref(),
                &self.room_name,
                Some(participant_identity),
                directory,
            );
        }
        identity.clone()
    }

    /// Mark the call ended with `reason`. Returns `true` for exactly one
    /// caller; later reasons are discarded.
    pub async fn try_end(&self, reason: EndReason) -> bool {
        let mut state = self.end_state.write().await;
        if !state.is_active() {
            return false;
        }
        *state = CallState::Ended(reason);
        self.ended.store(true, Ordering::Release);
        true
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    // Getters
    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn dial_info(&self) -> Option<&DialInfo> {
        self.dial_info.as_ref()
    }

    /// Time since the call was created
    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    pub async fn identity(&self) -> CallerIdentity {
        self.identity.read().await.clone()
    }

    pub async fn participant_identity(&self) -> Option<String> {
        self.participant_identity.read().await.clone()
    }

    pub async fn state(&self) -> CallState {
        self.end_state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::UNKNOWN_PHONE_NUMBER;
    use crate::domain::shared::value_objects::PhoneNumber;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn directory() -> PhoneDirectory {
        let mut entries = HashMap::new();
        entries.insert("79991112233".to_string(), "Павел".to_string());
        PhoneDirectory::new(entries, "Иван")
    }

    #[tokio::test]
    async fn test_inbound_resolves_from_room_name() {
        let call = Call::inbound("call_79991112233_abc", None, &directory());
        let identity = call.identity().await;

        assert_eq!(call.direction(), CallDirection::Inbound);
        assert_eq!(identity.phone_number, "79991112233");
        assert_eq!(identity.client_name, "Павел");
    }

    #[tokio::test]
    async fn test_participant_join_resolves_unknown() {
        let call = Call::inbound("room", Some("garbage".to_string()), &directory());
        assert_eq!(call.identity().await.phone_number, UNKNOWN_PHONE_NUMBER);

        let identity = call.participant_joined("sip_79991112233", &directory()).await;
        assert_eq!(identity.phone_number, "79991112233");
        assert_eq!(identity.client_name, "Павел");
        assert_eq!(call.participant_identity().await.as_deref(), Some("sip_79991112233"));
    }

    #[tokio::test]
    async fn test_participant_join_keeps_resolved_number() {
        let call = Call::inbound(
            "room",
            Some(r#"{"sip_from_user":"79991112233"}"#.to_string()),
            &directory(),
        );

        let identity = call.participant_joined("sip_70000000000", &directory()).await;
        assert_eq!(identity.phone_number, "79991112233");
    }

    #[tokio::test]
    async fn test_outbound_uses_dial_info() {
        let dial = DialInfo::new(PhoneNumber::parse("79991112233").unwrap(), None);
        let call = Call::outbound("outbound_79991112233_1", dial, &directory());

        assert_eq!(call.direction(), CallDirection::Outbound);
        assert_eq!(call.identity().await.client_name, "Павел");
        assert!(call.dial_info().is_some());
    }

    #[tokio::test]
    async fn test_try_end_single_winner() {
        let call = Arc::new(Call::inbound("room", None, &directory()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let call = call.clone();
                tokio::spawn(async move { call.try_end(EndReason::ParticipantLeft).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(call.is_ended());
    }

    #[tokio::test]
    async fn test_first_end_reason_sticks() {
        let call = Call::inbound("room", None, &directory());
        assert!(call.state().await.is_active());

        assert!(call.try_end(EndReason::ParticipantLeft).await);
        assert!(!call.try_end(EndReason::AnsweringMachine).await);

        assert_eq!(call.state().await, CallState::Ended(EndReason::ParticipantLeft));
    }

    #[tokio::test]
    async fn test_ended_flag_and_reason_agree() {
        let call = Arc::new(Call::inbound("room", None, &directory()));

        let ender = {
            let call = call.clone();
            tokio::spawn(async move { call.try_end(EndReason::EndCallRequested).await })
        };
        // Whenever the flag is visible the reason must be too
        for _ in 0..100 {
            if call.is_ended() {
                assert_eq!(call.state().await, CallState::Ended(EndReason::EndCallRequested));
            }
            tokio::task::yield_now().await;
        }
        assert!(ender.await.unwrap());

        assert!(call.is_ended());
        assert_eq!(call.state().await, CallState::Ended(EndReason::EndCallRequested));
    }

    #[tokio::test]
    async fn test_elapsed_is_measured_from_creation() {
        let call = Call::inbound("room", None, &directory());
        let elapsed = call.elapsed();
        assert!(elapsed >= chrono::Duration::zero());
        assert!(elapsed < chrono::Duration::seconds(5));
    }
}
