//! Interface layer - External interfaces (API, WebSocket)
//!
//! This layer handles:
//! - REST API endpoints
//! - The session runtime's WebSocket connection
//! - Request/response formatting

pub mod api;
pub mod websocket;
