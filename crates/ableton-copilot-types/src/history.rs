//! Operation-history and snapshot records.
//!
//! One [`OperationHistory`] row exists per tracked tool call. It starts
//! `Pending` and moves exactly once to `Success` or `Failed`. A
//! [`Snapshot`] holds the state captured just before the call mutated
//! anything, keyed by the history row's id.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Primary key of an operation-history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct HistoryId(pub i64);

impl HistoryId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for HistoryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a history row.
///
/// Stored as an integer (`0`, `1`, `2`) so existing databases stay readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(ascii_case_insensitive)]
pub enum OperationStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl OperationStatus {
    /// Integer stored in the `status` column.
    pub fn as_i64(&self) -> i64 {
        match self {
            OperationStatus::Pending => 0,
            OperationStatus::Success => 1,
            OperationStatus::Failed => 2,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(OperationStatus::Pending),
            1 => Some(OperationStatus::Success),
            2 => Some(OperationStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Success => "SUCCESS",
            OperationStatus::Failed => "FAILED",
        }
    }

    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Success and Failed are terminal; nothing moves a row out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempted mutating tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHistory {
    pub id: HistoryId,
    pub tool_name: String,
    /// Caller arguments as JSON text.
    pub input_params: Option<String>,
    /// Result JSON on success, error text on failure, absent while pending.
    pub execution_result: Option<String>,
    pub status: OperationStatus,
    /// Local time, `YYYY-MM-DD HH:MM:SS.SSS`.
    pub created_at: String,
}

/// Closed set of snapshot payload kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
pub enum SnapshotKind {
    /// Full note set of one clip.
    #[serde(rename = "NOTE")]
    #[strum(serialize = "NOTE")]
    Note,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Note => "NOTE",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prior state captured for a history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub history_id: HistoryId,
    pub snapshot_type: SnapshotKind,
    /// Payload whose schema depends on `snapshot_type`.
    pub snapshot_data: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_integer_mapping() {
        for status in [OperationStatus::Pending, OperationStatus::Success, OperationStatus::Failed] {
            assert_eq!(OperationStatus::from_i64(status.as_i64()), Some(status));
        }
        assert_eq!(OperationStatus::from_i64(3), None);
    }

    #[test]
    fn test_status_parse_case_insensitive() {
        assert_eq!(OperationStatus::from_str("success"), Some(OperationStatus::Success));
        assert_eq!(OperationStatus::from_str("FAILED"), Some(OperationStatus::Failed));
        assert_eq!(OperationStatus::from_str("done"), None);
    }

    #[test]
    fn test_only_pending_is_open() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Success.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_snapshot_kind_tag() {
        assert_eq!(SnapshotKind::from_str("NOTE"), Some(SnapshotKind::Note));
        assert_eq!(serde_json::to_string(&SnapshotKind::Note).unwrap(), "\"NOTE\"");
        assert_eq!(SnapshotKind::from_str("AUDIO"), None);
    }

    #[test]
    fn test_history_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&HistoryId(42)).unwrap(), "42");
    }
}
