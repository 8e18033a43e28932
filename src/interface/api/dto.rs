//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

/// Generic API response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Outbound call request
#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    pub phone_number: String,
    #[serde(default)]
    pub transfer_to: Option<String>,
}

/// Outbound call accepted
#[derive(Debug, Serialize, Deserialize)]
pub struct OutboundCallResponse {
    pub dispatch_id: String,
    pub room_name: String,
    pub agent_name: String,
}
