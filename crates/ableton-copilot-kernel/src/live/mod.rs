//! Port to the running Live set.
//!
//! [`LiveBridge`] is the only way the kernel touches Live. Tools never use it
//! with raw property strings; they go through the typed handles in
//! [`accessors`]. [`memory::MemoryLive`] is a complete in-process Live set
//! used by tests and by the server when no networked bridge is plugged in.

pub mod accessors;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use ableton_copilot_types::ObjectRef;

use crate::error::KernelError;

pub use accessors::{
    ApplicationHandle, BrowserHandle, ClipHandle, DeviceHandle, ParameterHandle, SongHandle, TrackHandle,
};
pub use memory::MemoryLive;

pub type ListenerId = u64;

/// A property subscription. Values arrive on `events` until the listener is
/// removed, at which point the channel closes.
#[derive(Debug)]
pub struct Listener {
    pub id: ListenerId,
    pub events: mpsc::UnboundedReceiver<Value>,
}

/// Failures reported by a bridge call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeError {
    #[error("Ableton Live is not connected")]
    Disconnected,

    #[error("{0} not found")]
    NotFound(String),

    #[error("property '{property}' of {object} is read-only")]
    ReadOnly { object: String, property: String },

    #[error("invalid value for '{property}': {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("unknown command '{command}' for {object}")]
    UnknownCommand { object: String, command: String },

    #[error("{0}")]
    Failed(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<BridgeError> for KernelError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::NotFound(_) => KernelError::NotFound(e.to_string()),
            BridgeError::InvalidValue { .. } => KernelError::InvalidArgument(e.to_string()),
            other => KernelError::ExternalService(other.to_string()),
        }
    }
}

/// Live application bridge.
///
/// Every call is a suspension point. No timeout is imposed here; a hung call
/// stalls only the invocation that made it.
#[async_trait]
pub trait LiveBridge: Send + Sync {
    /// Whether Live is reachable right now.
    async fn is_connected(&self) -> bool;

    async fn get(&self, target: &ObjectRef, property: &str) -> BridgeResult<Value>;

    async fn set(&self, target: &ObjectRef, property: &str, value: Value) -> BridgeResult<()>;

    /// Invoke a named function on an object. Arguments are positional.
    async fn send_command(&self, target: &ObjectRef, command: &str, args: Vec<Value>) -> BridgeResult<Value>;

    /// Subscribe to changes of one property.
    async fn add_listener(&self, target: &ObjectRef, property: &str) -> BridgeResult<Listener>;

    /// Drop a subscription. Returns false when it was already gone.
    async fn remove_listener(&self, id: ListenerId) -> BridgeResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_bridge_error_mapping() {
        let e: KernelError = BridgeError::Disconnected.into();
        assert_eq!(e.code(), ErrorCode::AbletonError);

        let e: KernelError = BridgeError::NotFound("clip:9".into()).into();
        assert_eq!(e.code(), ErrorCode::NotFound);
        assert_eq!(e.to_string(), "clip:9 not found");

        let e: KernelError = BridgeError::InvalidValue {
            property: "value".into(),
            reason: "out of range".into(),
        }
        .into();
        assert_eq!(e.code(), ErrorCode::InvalidArgument);

        let e: KernelError = BridgeError::Failed("socket closed".into()).into();
        assert_eq!(e.code(), ErrorCode::AbletonError);
    }
}
