use crate::api::{ApiError, ApiResponse, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use quantopt_core::{
    CreateTaskRequest, TaskCommand, TaskResult, TaskSnapshot, TaskStatus, TaskSummary, TraceEntry,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

pub async fn create_task(
    State(core): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateTaskResponse>>), ApiError> {
    let task = core.create_task(request)?;
    info!(task_id = %task.id(), name = %task.name(), "Task created via API");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CreateTaskResponse {
            task_id: task.id().to_string(),
            status: task.status(),
        })),
    ))
}

pub async fn list_tasks(State(core): State<AppState>) -> Json<ApiResponse<Vec<TaskSummary>>> {
    Json(ApiResponse::ok(core.queue.list()))
}

pub async fn get_task(
    State(core): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskSnapshot>>, ApiError> {
    Ok(Json(ApiResponse::ok(core.queue.snapshot(&task_id)?)))
}

pub async fn get_trace(
    State(core): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TraceEntry>>>, ApiError> {
    let task = core.queue.get(&task_id)?;
    Ok(Json(ApiResponse::ok(task.trace())))
}

pub async fn get_result(
    State(core): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskResult>>, ApiError> {
    let snapshot = core.queue.snapshot(&task_id)?;
    let status = snapshot.status;
    snapshot
        .result()
        .map(|result| Json(ApiResponse::ok(result)))
        .ok_or_else(|| ApiError::conflict(format!("Task is {status}, no result available")))
}

pub async fn control_task(
    State(core): State<AppState>,
    Path((task_id, action)): Path<(String, String)>,
) -> Result<Json<ApiResponse<TaskSummary>>, ApiError> {
    let command: TaskCommand = action.parse()?;
    let summary = core.queue.control_task(&task_id, command)?;
    Ok(Json(ApiResponse::ok_with_message(
        summary,
        format!("Task {command} accepted"),
    )))
}
