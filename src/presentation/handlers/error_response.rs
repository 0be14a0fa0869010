use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::services::{ModelContainerError, SessionError};
use crate::domain::SessionId;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(uuid: Option<&SessionId>, error: impl ToString) -> Self {
        Self {
            status: "error".to_string(),
            uuid: uuid.map(|id| id.as_str().to_string()),
            error: error.to_string(),
        }
    }
}

pub fn session_error_response(id: &SessionId, error: &SessionError) -> Response {
    let status = match error {
        SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::SessionLimitReached(_) | SessionError::EngineInit(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, Json(ErrorResponse::new(Some(id), error))).into_response()
}

pub fn model_error_response(error: &ModelContainerError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new(None, error)),
    )
        .into_response()
}
