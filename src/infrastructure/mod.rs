//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The LiveKit control-plane adapter (rooms, SIP, agent dispatch)

pub mod livekit;
