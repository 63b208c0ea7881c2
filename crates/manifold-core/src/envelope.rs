//! Wire-format envelope types used by the transport at the boundary.
//!
//! The engine itself only sees the decoded payload `Value`; the transport
//! wraps dispatch results and errors into these envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DispatchError;

/// Incoming call from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Unique request identifier, echoed back in the response.
    pub id: String,
    /// Call payload: a partial object keyed by top-level spec field names.
    pub payload: Value,
}

/// Outgoing response to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload, keyed identically to the request (present on success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Structured error body inside a [`CallResponse`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl CallResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response from a dispatch failure.
    pub fn failure(id: impl Into<String>, err: &DispatchError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(err.to_error_body()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let json = r#"{"id":"req-1","payload":{"profile":{"get":{}}}}"#;
        let req: CallRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, "req-1");
        assert!(req.payload["profile"]["get"].is_object());

        let back = serde_json::to_string(&req).unwrap();
        let again: CallRequest = serde_json::from_str(&back).unwrap();
        assert_eq!(again.id, "req-1");
    }

    #[test]
    fn success_response_shape() {
        let resp = CallResponse::success("req-2", json!({"ping": "pong"}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], "req-2");
        assert_eq!(value["success"], true);
        assert_eq!(value["result"]["ping"], "pong");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_response_carries_code() {
        let err = DispatchError::not_found("no handler bound for `ping`");
        let resp = CallResponse::failure("req-3", &err);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "NOT_FOUND");
        assert!(value.get("result").is_none());
    }
}
