//! Uniform response envelope.
//!
//! Every JSON response has the shape
//! `{success, data, error: {code, message, details}, timestamp}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use emot_core::{Error, ErrorKind};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Successful response carrying `data`.
#[derive(Debug)]
pub struct ApiResponse<T>(pub T);

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            data: Some(self.0),
            error: None,
            timestamp: now_rfc3339(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Failed response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidInput => Self::invalid_input(err.to_string()),
            ErrorKind::NotFound => match &err {
                Error::NotFound { entity, id } if entity == "Session" => Self::new(
                    StatusCode::NOT_FOUND,
                    "SESSION_NOT_FOUND",
                    "Session not found",
                )
                .with_details(serde_json::json!({ "session_id": id })),
                _ => Self::not_found(err.to_string()),
            },
            ErrorKind::StorageDegraded => {
                error!(error = %err, "Storage unavailable");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_UNAVAILABLE",
                    "Storage is temporarily unavailable",
                )
            }
            ErrorKind::ProviderFailure => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROVIDER_ERROR",
                err.to_string(),
            ),
            ErrorKind::Internal => {
                error!(error = %err, "Internal error");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input("Invalid JSON body")
            .with_details(Value::String(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.code,
                message: self.message,
                details: self.details,
            }),
            timestamp: now_rfc3339(),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
