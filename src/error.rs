// Error response module for the Discount API
// Provides the JSON error body shared by every module's error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

/// Consistent error response structure
///
/// Every error leaving the API is rendered with this shape: a machine-readable
/// `kind` and a human-readable `message`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error kind (e.g. "ERROR_CUPON", "NOT_FOUND")
    #[schema(example = "ERROR_CUPON")]
    pub kind: String,

    /// Human-readable error message
    #[schema(example = "Invalid coupon: exhausted")]
    pub message: String,

    /// Optional additional details (e.g. field-level validation errors)
    /// Omitted from JSON when None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Pair the body with a status code into an axum response
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_omits_empty_details() {
        let body = ErrorResponse::new("ERROR_DATOS", "Sale S-1 not found");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["kind"], "ERROR_DATOS");
        assert_eq!(json["message"], "Sale S-1 not found");
        assert!(json.get("details").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_response_with_details() {
        let body = ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
            .with_details(serde_json::json!({"count": ["range"]}));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["details"]["count"][0], "range");
    }

    #[test]
    fn test_into_response_sets_status() {
        let response = ErrorResponse::new("CONFLICT", "duplicate")
            .into_response_with(StatusCode::CONFLICT);
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
