//! Call API handlers

use super::dto::{ApiResponse, OutboundCallRequest, OutboundCallResponse};
use super::router::AppState;
use crate::application::outbound::DispatchError;
use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info, warn};

/// Health check
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

/// Start an outbound call
pub async fn originate_call(
    State(state): State<AppState>,
    Json(request): Json<OutboundCallRequest>,
) -> (StatusCode, Json<ApiResponse<OutboundCallResponse>>) {
    info!("API: Originating outbound call to {}", request.phone_number);

    match state
        .dispatcher
        .dispatch(&request.phone_number, request.transfer_to.as_deref())
        .await
    {
        Ok(ticket) => (
            StatusCode::OK,
            Json(ApiResponse::success(OutboundCallResponse {
                dispatch_id: ticket.dispatch_id,
                room_name: ticket.room_name,
                agent_name: ticket.agent_name,
            })),
        ),
        Err(DispatchError::InvalidRequest(e)) => {
            warn!("API: Rejected outbound call request: {}", e);
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
        }
        Err(e) => {
            error!("API: Failed to originate call: {}", e);
            (StatusCode::BAD_GATEWAY, Json(ApiResponse::error(e.to_string())))
        }
    }
}
