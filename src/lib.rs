//! Callbot - voice call agent for LiveKit SIP rooms
//!
//! Resolves who is calling, composes the agent's instructions, and drives
//! each call's lifecycle (farewell detection, transfer, hang-up) against the
//! LiveKit control plane. The speech pipeline itself runs in a session
//! runtime that connects over WebSocket.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
