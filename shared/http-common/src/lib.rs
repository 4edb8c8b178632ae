//! Shared HTTP utilities for the durable links workspace.
//!
//! Framework-agnostic: maps domain errors onto HTTP status codes and builds
//! the JSON error envelope
//! `{"error": {"code": <http status>, "message": "...", "status": "<STATUS>"}}`.

use domain::{CoreError, ValidationErrors};

pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const INTERNAL: &str = "INTERNAL";

// ============================================================================
// JSON Response Helpers
// ============================================================================

/// Create a structured error JSON with a default message for the status.
///
/// Returns: `{"error": {"code": <code>, "message": "<default>", "status": "<status>"}}`
pub fn json_err(code: u16, status: &str) -> serde_json::Value {
    let message = match status {
        NOT_FOUND => "Resource not found",
        INVALID_ARGUMENT => "Bad request",
        PERMISSION_DENIED => "Access denied",
        INTERNAL => "Internal server error",
        _ => status, // Fallback to status as message for unknown statuses
    };
    json_error_with_message(code, status, message)
}

/// Create a structured error JSON with a custom message.
pub fn json_error_with_message(code: u16, status: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message, "status": status}})
}

/// Error envelope carrying per-field validation failures under `details`.
pub fn json_validation_error(errors: &ValidationErrors) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": 400,
            "message": errors.to_string(),
            "status": INVALID_ARGUMENT,
            "details": errors.errors,
        }
    })
}

// ============================================================================
// Domain error mapping
// ============================================================================

/// HTTP status code and canonical status name for a domain error.
pub fn status_for(err: &CoreError) -> (u16, &'static str) {
    match err {
        CoreError::MissingHost
        | CoreError::MissingLink
        | CoreError::InvalidHost(_)
        | CoreError::InvalidUrlFormat(_)
        | CoreError::InvalidScheme(_)
        | CoreError::InvalidAppStoreId
        | CoreError::InvalidTenantId(_)
        | CoreError::InvalidPathFormat
        | CoreError::InvalidRequestedLink
        | CoreError::Validation(_) => (400, INVALID_ARGUMENT),
        CoreError::DomainNotAllowed => (403, PERMISSION_DENIED),
        CoreError::LinkNotFound => (404, NOT_FOUND),
        CoreError::Storage { .. } => (500, INTERNAL),
    }
}

/// Status code and JSON body for a domain error. Storage failures get the
/// generic internal message; the cause is logged by the service.
pub fn error_response(err: &CoreError) -> (u16, serde_json::Value) {
    let (code, status) = status_for(err);
    let body = match err {
        CoreError::Validation(errors) => json_validation_error(errors),
        CoreError::Storage { .. } => json_err(code, status),
        other => json_error_with_message(code, status, &other.to_string()),
    };
    (code, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{StoreError, ValidationError};

    #[test]
    fn test_json_err() {
        let err = json_err(404, NOT_FOUND);
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": 404, "message": "Resource not found", "status": "NOT_FOUND"}})
        );

        // Unknown status falls back to status as message
        let err = json_err(418, "TEAPOT");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": 418, "message": "TEAPOT", "status": "TEAPOT"}})
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&CoreError::MissingHost), (400, INVALID_ARGUMENT));
        assert_eq!(status_for(&CoreError::InvalidHost("x".into())), (400, INVALID_ARGUMENT));
        assert_eq!(status_for(&CoreError::InvalidScheme("ftp".into())), (400, INVALID_ARGUMENT));
        assert_eq!(status_for(&CoreError::InvalidPathFormat), (400, INVALID_ARGUMENT));
        assert_eq!(status_for(&CoreError::InvalidRequestedLink), (400, INVALID_ARGUMENT));
        assert_eq!(status_for(&CoreError::DomainNotAllowed), (403, PERMISSION_DENIED));
        assert_eq!(status_for(&CoreError::LinkNotFound), (404, NOT_FOUND));
        let storage = CoreError::Storage {
            operation: "store link",
            source: StoreError::Backend("disk full".into()),
        };
        assert_eq!(status_for(&storage), (500, INTERNAL));
    }

    #[test]
    fn test_error_response_bodies() {
        let (code, body) = error_response(&CoreError::DomainNotAllowed);
        assert_eq!(code, 403);
        assert_eq!(
            body,
            serde_json::json!({"error": {"code": 403, "message": "domain link not in allow list", "status": "PERMISSION_DENIED"}})
        );

        // storage causes are not leaked
        let (code, body) = error_response(&CoreError::Storage {
            operation: "look up link",
            source: StoreError::Backend("sqlite error: disk I/O".into()),
        });
        assert_eq!(code, 500);
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_validation_details() {
        let errors = ValidationErrors {
            errors: vec![ValidationError::new("durableLinkInfo.link", "required")],
        };
        let (code, body) = error_response(&CoreError::Validation(errors));
        assert_eq!(code, 400);
        assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
        assert_eq!(body["error"]["message"], "Field 'durableLinkInfo.link' is required");
        assert_eq!(
            body["error"]["details"],
            serde_json::json!([{
                "field": "durableLinkInfo.link",
                "tag": "required",
                "message": "Field 'durableLinkInfo.link' is required"
            }])
        );
    }
}
