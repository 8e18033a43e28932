//! WebSocket endpoint for the session runtime
//!
//! One connection carries one job. Frames from the runtime are turned into
//! session events for the job's event loop; replies complete the commands
//! the agent sent.

use super::protocol::{AgentMessage, RuntimeMessage};
use super::session::WsConversationSession;
use crate::application::ports::ConversationSession;
use crate::application::session::{JobRequest, SessionEvent};
use crate::interface::api::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// WebSocket handler
pub async fn agent_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one session runtime connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    info!("Session runtime connected");

    let Some(job) = wait_for_job(&mut receiver).await else {
        warn!("Session runtime disconnected before sending a job");
        return;
    };
    info!("Received job for room {}", job.room_name);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<AgentMessage>();

    // Spawn a task to send commands to the runtime
    let send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("Failed to send command to session runtime");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize command: {}", e);
                }
            }
        }
    });

    let session = Arc::new(WsConversationSession::new(
        out_tx.clone(),
        state.session.command_timeout(),
    ));
    let (events_tx, events_rx) = mpsc::channel(state.session.event_buffer);

    // The reader never waits on the job: replies must get through while the
    // job is blocked on a command and its event buffer is full
    let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let forward_task = tokio::spawn(async move {
        while let Some(event) = inbox_rx.recv().await {
            if events_tx.send(event).await.is_err() {
                debug!("Job event loop gone, dropping events");
                break;
            }
        }
    });

    let runtime = state.runtime.clone();
    let job_session: Arc<dyn ConversationSession> = session.clone();
    let job_task = tokio::spawn(async move { runtime.run_job(job, job_session, events_rx).await });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<RuntimeMessage>(&text) {
                Ok(message) => {
                    if !route(message, &session, &inbox_tx, &out_tx).await {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed frame from session runtime: {}", e),
            },
            Message::Close(_) => {
                debug!("Received close message");
                break;
            }
            _ => {}
        }
    }

    // Closing the event stream ends the job's event loop once the queued
    // events are delivered
    drop(inbox_tx);
    session.disconnect().await;

    match job_task.await {
        Ok(call) => info!("Call {} finished: {:?}", call.id(), call.state().await),
        Err(e) => error!("Job task failed: {}", e),
    }
    forward_task.abort();
    send_task.abort();

    info!("Session runtime disconnected");
}

/// Read frames until the job arrives. Anything else first is a protocol error.
async fn wait_for_job(receiver: &mut SplitStream<WebSocket>) -> Option<JobRequest> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                return match serde_json::from_str::<RuntimeMessage>(&text) {
                    Ok(RuntimeMessage::Job(job)) => Some(job),
                    Ok(other) => {
                        warn!("Expected a job frame, got {:?}", other);
                        None
                    }
                    Err(e) => {
                        warn!("Malformed job frame: {}", e);
                        None
                    }
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Deliver one runtime frame. Returns `false` once the job's event loop is gone.
async fn route(
    message: RuntimeMessage,
    session: &WsConversationSession,
    events: &mpsc::UnboundedSender<SessionEvent>,
    outbound: &mpsc::UnboundedSender<AgentMessage>,
) -> bool {
    let event = match message {
        RuntimeMessage::Reply { id, error } => {
            session.resolve(id, error).await;
            return true;
        }
        RuntimeMessage::Job(job) => {
            warn!("Ignoring repeated job frame for room {}", job.room_name);
            return true;
        }
        RuntimeMessage::ParticipantJoined { identity } => SessionEvent::ParticipantJoined { identity },
        RuntimeMessage::ParticipantLeft { identity } => SessionEvent::ParticipantLeft { identity },
        RuntimeMessage::UtteranceCommitted { role, text } => SessionEvent::UtteranceCommitted { role, text },
        RuntimeMessage::Metrics { metrics } => SessionEvent::Metrics(metrics),
        RuntimeMessage::ToolCall { call_id, tool } => {
            let (reply_tx, reply_rx) = oneshot::channel();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                if let Ok(output) = reply_rx.await {
                    let _ = outbound.send(AgentMessage::ToolResult { call_id, output });
                }
            });
            SessionEvent::ToolInvoked {
                tool,
                reply: reply_tx,
            }
        }
    };

    events.send(event).is_ok()
}
