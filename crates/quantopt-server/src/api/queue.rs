use crate::api::{ApiError, ApiResponse, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
};
use quantopt_core::{QueueAction, QueueStatus};

pub async fn get_status(State(core): State<AppState>) -> Json<ApiResponse<QueueStatus>> {
    Json(ApiResponse::ok(core.queue.status()))
}

pub async fn control_queue(
    State(core): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<ApiResponse<QueueStatus>>, ApiError> {
    let action: QueueAction = action.parse()?;
    Ok(Json(ApiResponse::ok(core.queue.control(action))))
}
