//! HTTP error handling and response utilities

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::types::PayGuardError;

/// HTTP error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorResponse {
    pub success: bool,
    pub error: HttpError,
    pub request_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// HTTP error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
}

impl IntoResponse for PayGuardError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            PayGuardError::Validation { .. } => StatusCode::BAD_REQUEST,
            PayGuardError::NotFound { .. } => StatusCode::NOT_FOUND,
            PayGuardError::AccountLocked { .. } => StatusCode::LOCKED,
            PayGuardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PayGuardError::Pipeline { .. }
            | PayGuardError::Persistence { .. }
            | PayGuardError::Serialization { .. }
            | PayGuardError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.is_server_error() {
            error!("Request failed with server error: {}", self);
        }

        let field = match &self {
            PayGuardError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = HttpErrorResponse {
            success: false,
            error: HttpError {
                code: self.code().to_string(),
                message: self.to_string(),
                field,
            },
            request_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        };

        (status_code, Json(body)).into_response()
    }
}
