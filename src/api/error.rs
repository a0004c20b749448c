//! HTTP mapping for [`OrderError`]

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::OrderError;

impl OrderError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSelection { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InsufficientStock { .. } => StatusCode::CONFLICT,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Something went wrong".to_string()
            }
            other => other.to_string(),
        };
        (self.status_code(), Json(json!({ "error": self.kind(), "message": message }))).into_response()
    }
}

impl From<JsonRejection> for OrderError {
    fn from(rejection: JsonRejection) -> Self {
        OrderError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for OrderError {
    fn from(rejection: PathRejection) -> Self {
        OrderError::Validation(rejection.body_text())
    }
}
