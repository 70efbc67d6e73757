use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quantopt_core::OptimizationError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<OptimizationError> for ApiError {
    fn from(err: OptimizationError) -> Self {
        match &err {
            OptimizationError::Validation(_) => Self::bad_request(err.to_string()),
            OptimizationError::TaskNotFound(id) => Self::not_found(&format!("Task {id}")),
            OptimizationError::InvalidTransition { .. } | OptimizationError::QueueBusy(_) => {
                Self::conflict(err.to_string())
            }
            OptimizationError::Evaluation { .. } | OptimizationError::TaskTimeout(_) => {
                tracing::error!(error = %err, "API error");
                Self::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantopt_core::{TaskCommand, TaskStatus};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (OptimizationError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                OptimizationError::TaskNotFound("t".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                OptimizationError::InvalidTransition {
                    from: TaskStatus::Completed,
                    command: TaskCommand::Start,
                },
                StatusCode::CONFLICT,
            ),
            (OptimizationError::QueueBusy("t".into()), StatusCode::CONFLICT),
            (
                OptimizationError::TaskTimeout(1.0),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
