//! Call bounded context - the lifecycle of one voice call

pub mod aggregate;
pub mod value_object;

pub use aggregate::Call;
pub use value_object::{CallDirection, CallState, DialInfo, EndReason, SpeakerRole};
