//! Gateway error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use qzwhatnext_runtime::RuntimeError;

/// API-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Runtime(e) => {
                let code = e.code();
                let status = match code {
                    "NOT_FOUND" => StatusCode::NOT_FOUND,
                    "CALENDAR_AUTH_REVOKED" => StatusCode::UNAUTHORIZED,
                    "CALENDAR_NOT_CONNECTED" | "NO_TASKS" | "VALIDATION"
                    | "DUPLICATE_RECURRENCE" => StatusCode::BAD_REQUEST,
                    code if code.starts_with("PARSE_") => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, code)
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use qzwhatnext_foundation::calendar::CalendarError;
    use qzwhatnext_kernel::error::ParseError;

    #[test]
    fn runtime_errors_map_to_spec_statuses() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (RuntimeError::NoTasks.into(), StatusCode::BAD_REQUEST),
            (
                RuntimeError::from(ParseError::InvalidTime).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                RuntimeError::from(CalendarError::NotConnected).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                RuntimeError::from(CalendarError::AuthRevoked).into(),
                StatusCode::UNAUTHORIZED,
            ),
            (
                RuntimeError::NotFound("task".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];
        for (error, expected) in cases {
            let (status, _) = error.status_and_code();
            assert_eq!(status, expected, "{error}");
        }
    }
}
