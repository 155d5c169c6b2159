//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fibertrack_core::error::{ErrorCode, ServiceError};
use serde::Serialize;
use thiserror::Error;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "setupRequired", skip_serializing_if = "std::ops::Not::not")]
    pub setup_required: bool,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Service(error) => match error {
                ServiceError::Validation(_) | ServiceError::BulkLimit { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::Conflict(_) => StatusCode::CONFLICT,
                ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ServiceError::Configuration { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Service(error) => error.code(),
            Self::BadRequest(_) => ErrorCode::ValidationFailed,
            Self::Internal(_) => ErrorCode::InternalUnexpected,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        if status.is_server_error() {
            tracing::error!(code = %code, error = %self, "request failed");
        }

        let body = match self {
            Self::Service(ServiceError::Configuration { message, details }) => ErrorResponse {
                error: message,
                code: code.code().to_string(),
                details,
                setup_required: true,
            },
            other => ErrorResponse {
                error: other.to_string(),
                code: code.code().to_string(),
                details: code.hint().map(str::to_string),
                setup_required: false,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
