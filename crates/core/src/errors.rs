//! Error taxonomy and the classifier that turns raw device diagnostics
//! into a status-carrying envelope.
//!
//! Classification is substring matching against the fault text a device
//! returns. Rules are evaluated top-down and the first match wins.

use crate::validation::ValidationReport;
use serde::{Deserialize, Serialize};

/// Where a device-protocol failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Opening the session, before any typed operation ran
    Connect,
    /// A typed remote operation on an open session
    Operation,
}

/// A failed device-protocol call, carrying the raw diagnostic text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{diagnostic}")]
pub struct DeviceError {
    pub stage: FailureStage,
    pub diagnostic: String,
}

impl DeviceError {
    pub fn connect(diagnostic: impl Into<String>) -> Self {
        Self {
            stage: FailureStage::Connect,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn operation(diagnostic: impl Into<String>) -> Self {
        Self {
            stage: FailureStage::Operation,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Error categories surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    BadCredentials,
    Forbidden,
    ProfileNotFound,
    Upstream,
    DiscoveryUnavailable,
}

impl ErrorKind {
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::BadCredentials => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::ProfileNotFound => 404,
            ErrorKind::Upstream | ErrorKind::DiscoveryUnavailable => 500,
        }
    }
}

/// Structured failure returned for every non-success path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationReport>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: kind.status(),
            errors: None,
        }
    }

    pub fn validation(report: ValidationReport) -> Self {
        Self {
            errors: Some(report),
            ..Self::new(ErrorKind::Validation, "Request validation failed")
        }
    }

    pub fn discovery_unavailable() -> Self {
        Self::new(ErrorKind::DiscoveryUnavailable, "Failed to fetch ONVIF devices")
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.status, self.kind, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}

pub const NOT_AUTHORIZED: &str = "Sender not Authorized";
pub const INVALID_LOGIN: &str = "Invalid username or password";
pub const UNKNOWN_PROFILE: &str = "Profile token does not exist";

/// One row of the classification table. `message: None` echoes the diagnostic.
struct Rule {
    matches: fn(&str) -> bool,
    kind: ErrorKind,
    message: Option<&'static str>,
}

const RULES: &[Rule] = &[
    Rule {
        matches: |d: &str| d.contains(NOT_AUTHORIZED) && d.contains(INVALID_LOGIN),
        kind: ErrorKind::BadCredentials,
        message: Some("Invalid username or password. Please check your credentials."),
    },
    Rule {
        matches: |d: &str| d.contains(NOT_AUTHORIZED),
        kind: ErrorKind::Forbidden,
        message: Some("Authorization failure. Please check your access rights."),
    },
    Rule {
        matches: |d: &str| d.contains(UNKNOWN_PROFILE),
        kind: ErrorKind::ProfileNotFound,
        message: Some("The provided profile token does not exist. Please verify the token."),
    },
    Rule {
        matches: |_: &str| true,
        kind: ErrorKind::Upstream,
        message: None,
    },
];

/// Classify the diagnostic of a failed device operation.
pub fn classify(diagnostic: &str) -> ErrorEnvelope {
    RULES
        .iter()
        .find(|rule| (rule.matches)(diagnostic))
        .map(|rule| ErrorEnvelope::new(rule.kind, rule.message.unwrap_or(diagnostic)))
        .unwrap_or_else(|| ErrorEnvelope::new(ErrorKind::Upstream, diagnostic))
}

/// Classify a failure raised while opening the device session.
///
/// Transport-level rejections arrive here before any SOAP fault exists, so
/// "Unauthorized"/"401" is checked first and everything else falls through
/// to [`classify`].
pub fn classify_connect(diagnostic: &str) -> ErrorEnvelope {
    if diagnostic.contains("Unauthorized") || diagnostic.contains("401") {
        return ErrorEnvelope::new(ErrorKind::BadCredentials, "Incorrect username or password");
    }
    classify(diagnostic)
}

pub fn classify_device_error(error: &DeviceError) -> ErrorEnvelope {
    match error.stage {
        FailureStage::Connect => classify_connect(&error.diagnostic),
        FailureStage::Operation => classify(&error.diagnostic),
    }
}

impl From<DeviceError> for ErrorEnvelope {
    fn from(error: DeviceError) -> Self {
        classify_device_error(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_login_beats_forbidden() {
        let env =
            classify("ter:NotAuthorized: Sender not Authorized: Invalid username or password");
        assert_eq!(env.kind, ErrorKind::BadCredentials);
        assert_eq!(env.status, 401);
        assert_eq!(env.message, "Invalid username or password. Please check your credentials.");
    }

    #[test]
    fn test_sender_not_authorized_alone_is_forbidden() {
        let env = classify("Sender not Authorized");
        assert_eq!(env.kind, ErrorKind::Forbidden);
        assert_eq!(env.status, 403);
    }

    #[test]
    fn test_unknown_profile_token() {
        let env = classify("ter:InvalidArgVal: ter:NoProfile: Profile token does not exist");
        assert_eq!(env.kind, ErrorKind::ProfileNotFound);
        assert_eq!(env.status, 404);
    }

    #[test]
    fn test_fallback_keeps_raw_text() {
        let raw = "HTTP 500 Internal Server Error: device busy";
        let env = classify(raw);
        assert_eq!(env.kind, ErrorKind::Upstream);
        assert_eq!(env.status, 500);
        assert_eq!(env.message, raw);
    }

    #[test]
    fn test_connect_stage_unauthorized() {
        let env = classify_connect("HTTP 401 Unauthorized: ");
        assert_eq!(env.kind, ErrorKind::BadCredentials);
        assert_eq!(env.status, 401);
        assert_eq!(env.message, "Incorrect username or password");
    }

    #[test]
    fn test_connect_stage_falls_through() {
        let env = classify_device_error(&DeviceError::connect("Sender not Authorized"));
        assert_eq!(env.kind, ErrorKind::Forbidden);

        let env = classify_device_error(&DeviceError::connect("connection refused"));
        assert_eq!(env.kind, ErrorKind::Upstream);
        assert_eq!(env.message, "connection refused");
    }

    #[test]
    fn test_operation_stage_ignores_connect_rule() {
        let env: ErrorEnvelope = DeviceError::operation("HTTP 401 Unauthorized").into();
        assert_eq!(env.kind, ErrorKind::Upstream);
    }

    #[test]
    fn test_envelope_serialization() {
        let env = ErrorEnvelope::new(ErrorKind::ProfileNotFound, "missing");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["kind"], "profile_not_found");
        assert_eq!(json["status"], 404);
        assert!(json.get("errors").is_none());
    }
}
