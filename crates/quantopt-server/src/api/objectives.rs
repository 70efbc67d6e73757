use crate::api::{ApiResponse, state::AppState};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ObjectiveCatalog {
    pub builtin: Vec<String>,
    pub command_enabled: bool,
}

pub async fn list_objectives(State(core): State<AppState>) -> Json<ApiResponse<ObjectiveCatalog>> {
    Json(ApiResponse::ok(ObjectiveCatalog {
        builtin: core.objectives.names(),
        command_enabled: core.objectives.allows_command(),
    }))
}
