//! Error-to-HTTP plumbing shared by every handler.
//!
//! All endpoints answer with the same envelope: `{success, data?, error?,
//! message?}`. Domain errors implement [`IntoErrorResponse`] to pick their
//! status code, machine-readable code and log severity.

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

/// Uniform response envelope for the REST surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Machine-readable error code (e.g. "unknown_game")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        reply::with_status(reply::json(&self), status).into_response()
    }
}

impl ApiEnvelope<serde_json::Value> {
    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: Some(message.into()),
        }
    }
}

/// Success response with a JSON body and the given status.
pub fn ok_response<T: Serialize>(status: StatusCode, data: T) -> Response {
    ApiEnvelope::ok(data).into_response(status)
}

/// Error classification used to pick the log level at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Client errors (4xx), expected during normal operation
    Client,
    /// Server errors (5xx), unexpected
    Server,
    /// System integrity at risk
    Critical,
}

/// Converts a domain error into an HTTP response, logging by severity.
pub trait IntoErrorResponse {
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error code string
    fn error_code(&self) -> &'static str;

    fn error_message(&self) -> String;

    fn severity(&self) -> ErrorSeverity {
        if self.status_code().is_server_error() {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn into_http_response(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.error_message();

        match self.severity() {
            ErrorSeverity::Client => {
                tracing::info!(error = code, message = %message, "request rejected")
            }
            ErrorSeverity::Server => {
                tracing::error!(error = code, message = %message, "request failed")
            }
            ErrorSeverity::Critical => {
                tracing::error!(error = code, message = %message, "critical failure")
            }
        }

        ApiEnvelope::failure(code, message).into_response(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error_fields() {
        let envelope = ApiEnvelope::ok(serde_json::json!({"n": 1}));
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["n"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_envelope_carries_code_and_message() {
        let envelope = ApiEnvelope::failure("unknown_game", "no such match");
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "unknown_game");
        assert_eq!(json["message"], "no such match");
    }
}
