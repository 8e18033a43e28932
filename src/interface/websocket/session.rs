//! Conversation session backed by a sidecar WebSocket connection

use super::protocol::AgentMessage;
use crate::application::ports::{ConversationSession, SessionError};
use crate::config::PipelineConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>>;

/// Sends commands to the session runtime and waits for their replies.
///
/// Replies are matched by id. Dropping the outbound receiver or calling
/// [`WsConversationSession::disconnect`] fails every waiting command.
pub struct WsConversationSession {
    outbound: mpsc::UnboundedSender<AgentMessage>,
    pending: PendingReplies,
    next_id: AtomicU64,
    command_timeout: Duration,
    closed: AtomicBool,
}

impl WsConversationSession {
    pub fn new(outbound: mpsc::UnboundedSender<AgentMessage>, command_timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            command_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Complete the command with the given id
    pub async fn resolve(&self, id: u64, error: Option<String>) {
        match self.pending.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(error.map_or(Ok(()), Err));
            }
            None => debug!("Reply {} matches no pending command", id),
        }
    }

    /// Fail every command still waiting for a reply, and any sent later
    pub async fn disconnect(&self) {
        let mut pending = self.pending.lock().await;
        self.closed.store(true, Ordering::Release);
        if !pending.is_empty() {
            warn!("Session runtime gone with {} commands pending", pending.len());
        }
        pending.clear();
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn command(&self, build: impl FnOnce(u64) -> AgentMessage) -> Result<(), SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::Acquire) {
                return Err(SessionError::Disconnected);
            }
            pending.insert(id, tx);
        }

        if self.outbound.send(build(id)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(SessionError::Disconnected);
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(SessionError::Rejected(message)),
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SessionError::Timeout(self.command_timeout))
            }
        }
    }
}

#[async_trait]
impl ConversationSession for WsConversationSession {
    async fn start(&self, instructions: &str, pipeline: &PipelineConfig) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::StartSession {
            id,
            instructions: instructions.to_string(),
            pipeline: pipeline.clone(),
        })
        .await
    }

    async fn warmup(&self, instructions: &str, user_text: &str) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::Warmup {
            id,
            instructions: instructions.to_string(),
            user_text: user_text.to_string(),
        })
        .await
    }

    async fn say(&self, text: &str) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::Say {
            id,
            text: text.to_string(),
        })
        .await
    }

    async fn generate_reply(&self, instructions: &str) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::GenerateReply {
            id,
            instructions: instructions.to_string(),
        })
        .await
    }

    async fn wait_for_playout(&self) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::WaitForPlayout { id }).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.command(|id| AgentMessage::Close { id }).await
    }
}
