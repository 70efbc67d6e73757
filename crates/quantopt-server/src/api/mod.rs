pub mod error;
pub mod objectives;
pub mod queue;
pub mod response;
pub mod state;
pub mod tasks;

pub use error::ApiError;
pub use response::ApiResponse;
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};

/// Routes mounted under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .route("/tasks/{task_id}/trace", get(tasks::get_trace))
        .route("/tasks/{task_id}/result", get(tasks::get_result))
        .route("/tasks/{task_id}/{action}", post(tasks::control_task))
        .route("/queue", get(queue::get_status))
        .route("/queue/{action}", post(queue::control_queue))
        .route("/objectives", get(objectives::list_objectives))
}
