//! Error handling for the HTTP server
//!
//! Registry and serving errors keep their machine-readable code; the HTTP
//! status is derived from it. Internal failures are logged in full but
//! reported to clients without backend detail.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use featureloom_core::Error;
use serde::Serialize;
use std::fmt;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    /// Malformed request body or query string (400)
    BadRequest(String),

    /// Server-side failure outside the core library (500)
    Internal(String),

    /// Error from the registry or serving engine
    Core(Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Core(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// HTTP status and machine-readable code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            AppError::Core(err) => {
                let status = match err {
                    Error::NotFound { .. } => StatusCode::NOT_FOUND,
                    Error::IncompatibleSchema(_) => StatusCode::CONFLICT,
                    Error::UnknownEntity { .. }
                    | Error::DuplicateFeature { .. }
                    | Error::MissingSource(_)
                    | Error::UnknownFeature(_)
                    | Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                    Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                    Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    Error::VersionConflict { .. }
                    | Error::Storage(_)
                    | Error::Serialization(_)
                    | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

/// ## Error Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "NOT_FOUND",
///     "message": "FeatureTable 'driver_stats' not found in project 'default'"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use featureloom_core::ObjectKind;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                Error::not_found(ObjectKind::Entity, "default", "driver_id"),
                StatusCode::NOT_FOUND,
            ),
            (Error::incompatible("entities changed"), StatusCode::CONFLICT),
            (
                Error::MissingSource("driver_stats".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Unauthenticated("no token".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (Error::timeout("registry"), StatusCode::GATEWAY_TIMEOUT),
            (Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, _) = AppError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_core_code_preserved() {
        let err = AppError::from(Error::UnknownFeature("driver_stats:nope".to_string()));
        assert_eq!(err.status_and_code().1, "UNKNOWN_FEATURE");

        let err = AppError::from(Error::Storage(anyhow::anyhow!("disk full")));
        assert_eq!(err.status_and_code().1, "INTERNAL");
    }

    #[tokio::test]
    async fn test_internal_detail_hidden() {
        let response = AppError::from(Error::Storage(anyhow::anyhow!("disk full"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "internal error");
    }
}
