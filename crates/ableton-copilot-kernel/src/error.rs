//! Error taxonomy for the kernel.
//!
//! Components below the pipeline return [`KernelError`]; the pipeline is the
//! only place that turns one into the `{code, message, details?}` body a
//! client sees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ableton_copilot_types::NoteError;

/// Errors raised by the ledger, codec, rollback engine and tools.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KernelError {
    /// Caller input is malformed or out of range.
    #[error("{0}")]
    InvalidArgument(String),

    /// A history row, snapshot, clip, track or device does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Live is unreachable or a bridge call failed.
    #[error("{0}")]
    ExternalService(String),

    /// The request is well formed but the current state forbids it.
    #[error("{0}")]
    InvalidState(String),

    /// The history store failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A stored snapshot payload could not be decoded.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("{0}")]
    Internal(String),
}

pub type KernelResult<T> = Result<T, KernelError>;

/// Stable codes surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    #[serde(rename = "ABLETON_ERROR")]
    AbletonError,
    InvalidState,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AbletonError => "ABLETON_ERROR",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Serialized error body carried in an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl KernelError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        KernelError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        KernelError::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        KernelError::Internal(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            KernelError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            KernelError::NotFound(_) => ErrorCode::NotFound,
            KernelError::ExternalService(_) => ErrorCode::AbletonError,
            KernelError::InvalidState(_) => ErrorCode::InvalidState,
            KernelError::Persistence(_)
            | KernelError::CorruptSnapshot(_)
            | KernelError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Client-facing body. Only the display message leaves the process.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
            details: None,
        }
    }
}

impl From<rusqlite::Error> for KernelError {
    fn from(e: rusqlite::Error) -> Self {
        KernelError::Persistence(e.to_string())
    }
}

impl From<NoteError> for KernelError {
    fn from(e: NoteError) -> Self {
        KernelError::InvalidArgument(e.to_string())
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::Internal(format!("json: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(KernelError::invalid_argument("x").code().as_str(), "INVALID_ARGUMENT");
        assert_eq!(KernelError::not_found("x").code().as_str(), "NOT_FOUND");
        assert_eq!(KernelError::ExternalService("x".into()).code().as_str(), "ABLETON_ERROR");
        assert_eq!(KernelError::InvalidState("x".into()).code().as_str(), "INVALID_STATE");
        assert_eq!(KernelError::CorruptSnapshot("x".into()).code().as_str(), "INTERNAL_ERROR");
        assert_eq!(KernelError::Persistence("x".into()).code().as_str(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_payload_serialization() {
        let payload = KernelError::not_found("history 9 not found").payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "NOT_FOUND", "message": "history 9 not found"})
        );
    }

    #[test]
    fn test_ableton_error_code_wire_name() {
        let json = serde_json::to_string(&ErrorCode::AbletonError).unwrap();
        assert_eq!(json, "\"ABLETON_ERROR\"");
    }

    #[test]
    fn test_note_error_is_invalid_argument() {
        let err: KernelError = NoteError::PitchOutOfRange(200).into();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("200"));
    }
}
