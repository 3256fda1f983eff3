/// Type definitions for the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use camgate_core::{DiscoveredDevice, ErrorEnvelope, RawInput, ValidationReport};
use serde::{Deserialize, Serialize};

/// Response for GET /api/discovery/onvif-devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<DiscoveredDevice>,
}

/// Response for GET /api/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub const BODY_FIELD: &str = "_body";
pub const BODY_NOT_OBJECT: &str = "Request body must be a JSON object";

/// Failure response: the envelope as JSON, with its own status code
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError(pub ErrorEnvelope);

impl From<ErrorEnvelope> for ApiError {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self(envelope)
    }
}

impl From<ValidationReport> for ApiError {
    fn from(report: ValidationReport) -> Self {
        Self(ErrorEnvelope::validation(report))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Decode a request body into the raw field map the validator works on
pub fn parse_body(body: &[u8]) -> Result<RawInput, ValidationReport> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(ValidationReport::single(BODY_FIELD, BODY_NOT_OBJECT)),
    }
}
