//! Mapping of library errors onto HTTP responses.
//!
//! Every error body has the shape `{"error": {"code": ..., "message": ...}}`.
//! Storage and queue failures are logged with their diagnostic and reported
//! to the client with a generic message.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reportflow::db::DatabaseError;
use reportflow::queue::QueueError;
use reportflow::AdmissionError;
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn internal(diagnostic: &dyn std::fmt::Display) -> Self {
        error!(error = %diagnostic, "Request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "The request could not be completed",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match &err {
            AdmissionError::Invalid(_) => Self::bad_request(err.to_string()),
            AdmissionError::UnknownSection(_) => {
                Self::new(StatusCode::NOT_FOUND, "unknown_section", err.to_string())
            }
            AdmissionError::Backpressure { .. } => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "too_many_jobs", err.to_string())
            }
            AdmissionError::NotFound(_) => Self::not_found(err.to_string()),
            AdmissionError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "conflict", err.to_string())
            }
            AdmissionError::Store(_) | AdmissionError::Queue(_) => Self::internal(&err),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        Self::internal(&err)
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::internal(&err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use reportflow::model::InputError;

    #[test]
    fn test_admission_error_status_codes() {
        let cases = [
            (
                AdmissionError::Invalid(InputError::MissingTheme),
                StatusCode::BAD_REQUEST,
            ),
            (
                AdmissionError::Backpressure {
                    running: 5,
                    limit: 5,
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AdmissionError::NotFound("r1".into()), StatusCode::NOT_FOUND),
            (AdmissionError::UnknownSection(9), StatusCode::NOT_FOUND),
            (AdmissionError::Conflict("busy".into()), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_error_hides_diagnostic() {
        let err = ApiError::from(DatabaseError::Migration {
            version: 7,
            reason: "disk I/O error at page 7".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("page 7"));
    }
}
