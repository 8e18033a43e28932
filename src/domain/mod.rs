//! Domain layer - Core call model and rules
//!
//! This layer contains:
//! - The call aggregate and its value objects
//! - Caller identity resolution
//! - Prompt templating
//! - Farewell phrase detection
//!
//! Nothing in here performs I/O against the control plane or the speech
//! runtime; those are ports defined by the application layer.

pub mod call;
pub mod farewell;
pub mod identity;
pub mod prompt;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
