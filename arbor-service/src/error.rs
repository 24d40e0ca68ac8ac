use arbor_core::ArborError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: String,
}

impl ErrorEnvelope {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }
}

pub struct AppError {
    pub status: StatusCode,
    pub body: ErrorEnvelope,
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorEnvelope::new(
                "not_found",
                format!("{what} not found"),
                "Check the identifier and try again",
            ),
        }
    }

    pub fn bad_request(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorEnvelope::new(
                "invalid_input",
                msg.to_string(),
                "Fix the request payload and retry",
            ),
        }
    }

    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorEnvelope::new(
                "internal_error",
                msg.to_string(),
                "Check service logs for details",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}

impl From<ArborError> for AppError {
    fn from(err: ArborError) -> Self {
        match &err {
            ArborError::NodeNotFound(_)
            | ArborError::ObservationNotFound(_)
            | ArborError::FileNotFound(_) => AppError {
                status: StatusCode::NOT_FOUND,
                body: ErrorEnvelope::new("not_found", err.to_string(), "Check the identifier"),
            },
            ArborError::InvalidInput(_) => AppError::bad_request(err),
            ArborError::Parse(_) => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: ErrorEnvelope::new(
                    "parse_error",
                    err.to_string(),
                    "The file could not be parsed as Python source",
                ),
            },
            _ => AppError::internal(err),
        }
    }
}
