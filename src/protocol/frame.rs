//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport envelope:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// OCPP-J error codes used by this backend when rejecting a frame.
pub mod error_code {
    pub const NOT_IMPLEMENTED: &str = "NotImplemented";
    pub const PROTOCOL_ERROR: &str = "ProtocolError";
    pub const FORMATION_VIOLATION: &str = "FormationViolation";
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone)]
pub enum Frame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl Frame {
    /// Parse raw JSON text into a `Frame`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let arr: Vec<Value> =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        if arr.is_empty() {
            return Err(FrameError::EmptyArray);
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(&arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(&arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(&arr),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    fn parse_call(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        Ok(Self::Call {
            unique_id: field_str(&arr[1], "uniqueId")?,
            action: field_str(&arr[2], "action")?,
            payload: arr[3].clone(),
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 3 {
            return Err(FrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }

        Ok(Self::CallResult {
            unique_id: field_str(&arr[1], "uniqueId")?,
            payload: arr[2].clone(),
        })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }

        Ok(Self::CallError {
            unique_id: field_str(&arr[1], "uniqueId")?,
            error_code: arr[2].as_str().unwrap_or("InternalError").to_string(),
            error_description: arr
                .get(3)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            error_details: arr
                .get(4)
                .cloned()
                .unwrap_or(Value::Object(Default::default())),
        })
    }

    /// Serialize this frame to a JSON string.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // serde_json::to_string on a Value never fails
        serde_json::to_string(&arr).unwrap()
    }

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Build an outbound `Call` with a fresh unique id.
    pub fn call(action: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            unique_id: uuid::Uuid::new_v4().to_string(),
            action: action.into(),
            payload,
        }
    }

    /// Build a `CallResult` answering the given unique id.
    pub fn result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Build a `CallError` answering the given unique id.
    pub fn error(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Default::default()),
        }
    }
}

fn field_str(value: &Value, name: &'static str) -> Result<String, FrameError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(FrameError::FieldTypeMismatch(name))
}

/// Salvage the unique id from a frame that failed to parse, so the error
/// response can still be correlated by the sender.
pub fn salvage_unique_id(text: &str) -> String {
    serde_json::from_str::<Vec<Value>>(text)
        .ok()
        .and_then(|arr| arr.get(1).and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| "-1".to_string())
}

/// Errors that can occur when parsing an OCPP-J frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("empty OCPP message array")]
    EmptyArray,

    #[error("message type is not a number")]
    InvalidMessageType,

    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),

    #[error("expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },

    #[error("field type mismatch: {0} must be a string")]
    FieldTypeMismatch(&'static str),
}
