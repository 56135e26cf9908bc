use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use homescreen_store::StoreError;
use homescreen_types::ValidationError;

pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const MALFORMED_RECORD: &str = "MALFORMED_RECORD";
    pub const BACKEND_UNAVAILABLE: &str = "BACKEND_UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Store(StoreError::Invalid(err))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(e) => match e {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Invalid(_) | StoreError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                StoreError::Malformed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                StoreError::Backend { .. } | StoreError::Status { .. } => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => codes::UNAUTHORIZED,
            ApiError::BadRequest(_) => codes::BAD_REQUEST,
            ApiError::Internal(_) => codes::INTERNAL_ERROR,
            ApiError::Store(e) => match e {
                StoreError::NotFound(_) => codes::NOT_FOUND,
                StoreError::Invalid(_) => codes::VALIDATION_ERROR,
                StoreError::InvalidKey(_) => codes::BAD_REQUEST,
                StoreError::Forbidden(_) => codes::FORBIDDEN,
                StoreError::Malformed { .. } => codes::MALFORMED_RECORD,
                StoreError::Backend { .. } | StoreError::Status { .. } => codes::BACKEND_UNAVAILABLE,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

/// Body of every non-2xx response outside the validation endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{} ({}): {}", status, self.error_code(), self);
        }
        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
