//! LiveKit server API adapter
//!
//! Room deletion and agent dispatch go through `livekit-api`'s service
//! clients. SIP transfer and outbound SIP participants go through the
//! server's Twirp JSON endpoints with a short-lived admin token.

pub mod control;
pub mod twirp;

pub use control::LiveKitControl;
pub use twirp::{decode_error, http_base_url, TwirpClient};
