//! Operation-history ledger.
//!
//! Records the intent-to-result lifecycle of a tracked tool call:
//! `begin` writes a PENDING row, then exactly one of `complete` or `fail`
//! moves it to its terminal status. The transition is a compare-and-set on
//! PENDING, so a row never settles twice.
//!
//! Each step commits on its own. A crash between `begin` and settling leaves
//! the row PENDING; [`Ledger::reconcile_pending`] is the opt-in sweep for that.

use std::sync::Arc;

use serde_json::Value;

use ableton_copilot_types::{HistoryId, OperationHistory, OperationStatus, Snapshot};

use crate::error::{KernelError, KernelResult};
use crate::repository::{HistoryRepository, HistoryUpdate, NewHistory, NewSnapshot};
use crate::snapshot::SnapshotPayload;

/// Longest tool name the history table holds.
pub const MAX_TOOL_NAME_LEN: usize = 100;

/// `execution_result` written by the startup sweep.
pub const INTERRUPTED_RESULT: &str = "interrupted: process exited before completion";

#[derive(Clone)]
pub struct Ledger {
    repo: Arc<dyn HistoryRepository>,
}

impl Ledger {
    pub fn new(repo: Arc<dyn HistoryRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn HistoryRepository> {
        &self.repo
    }

    /// Create the PENDING row for a tracked call.
    pub async fn begin(&self, tool_name: &str, input_params: &Value) -> KernelResult<HistoryId> {
        if tool_name.is_empty() || tool_name.len() > MAX_TOOL_NAME_LEN {
            return Err(KernelError::invalid_argument(format!(
                "tool name must be 1-{MAX_TOOL_NAME_LEN} characters"
            )));
        }
        let input = serde_json::to_string(input_params)?;
        let id = self
            .repo
            .create_history(NewHistory {
                tool_name: tool_name.to_string(),
                input_params: Some(input),
            })
            .await?;
        tracing::debug!(history_id = %id, tool = tool_name, "history begun");
        Ok(id)
    }

    /// Store the prior state for `history_id`. The row must already exist.
    pub async fn capture_snapshot(&self, history_id: HistoryId, payload: &SnapshotPayload) -> KernelResult<i64> {
        let data = payload.encode()?;
        let snapshot_id = self
            .repo
            .create_snapshot(NewSnapshot {
                history_id,
                kind: payload.kind(),
                data: Some(data),
            })
            .await?;
        tracing::debug!(history_id = %history_id, snapshot_id, kind = %payload.kind(), "snapshot stored");
        Ok(snapshot_id)
    }

    pub async fn complete(&self, id: HistoryId, result: &Value) -> KernelResult<()> {
        let text = serde_json::to_string(result)?;
        self.settle(id, OperationStatus::Success, text).await
    }

    pub async fn fail(&self, id: HistoryId, error: &str) -> KernelResult<()> {
        self.settle(id, OperationStatus::Failed, error.to_string()).await
    }

    async fn settle(&self, id: HistoryId, status: OperationStatus, result: String) -> KernelResult<()> {
        let changed = self
            .repo
            .update_history(
                id,
                HistoryUpdate {
                    status: Some(status),
                    execution_result: Some(result),
                    expect_status: Some(OperationStatus::Pending),
                },
            )
            .await?;
        if !changed {
            // The repository already warned if the row is missing.
            if let Some(row) = self.repo.get_history_by_id(id).await? {
                tracing::warn!(
                    history_id = %id,
                    current = %row.status,
                    attempted = %status,
                    "history row already settled; update ignored"
                );
            }
        }
        Ok(())
    }

    pub async fn history(&self, id: HistoryId) -> KernelResult<Option<OperationHistory>> {
        self.repo.get_history_by_id(id).await
    }

    pub async fn page(&self, page: u32, page_size: u32) -> KernelResult<Vec<OperationHistory>> {
        self.repo.get_history_page(page, page_size).await
    }

    pub async fn snapshot(&self, id: HistoryId) -> KernelResult<Option<Snapshot>> {
        self.repo.get_snapshot_by_history_id(id).await
    }

    /// Mark every PENDING row as FAILED. Meant to run once at startup,
    /// before any tool call can open a new row.
    pub async fn reconcile_pending(&self) -> KernelResult<usize> {
        let pending = self.repo.pending_history_ids().await?;
        let mut settled = 0;
        for id in pending {
            let changed = self
                .repo
                .update_history(
                    id,
                    HistoryUpdate {
                        status: Some(OperationStatus::Failed),
                        execution_result: Some(INTERRUPTED_RESULT.to_string()),
                        expect_status: Some(OperationStatus::Pending),
                    },
                )
                .await?;
            if changed {
                settled += 1;
            }
        }
        if settled > 0 {
            tracing::info!(count = settled, "marked orphaned pending history rows as failed");
        }
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRepository;
    use crate::snapshot::NoteSnapshot;
    use ableton_copilot_types::Note;
    use serde_json::json;

    fn ledger() -> Ledger {
        Ledger::new(Arc::new(SqliteRepository::in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_begin_then_complete() {
        let ledger = ledger();
        let id = ledger.begin("add_notes_to_clip", &json!({"clip_id": "1"})).await.unwrap();

        let row = ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Pending);
        assert_eq!(row.input_params.as_deref(), Some(r#"{"clip_id":"1"}"#));

        ledger.complete(id, &json!({"added": 1})).await.unwrap();
        let row = ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Success);
        assert_eq!(row.execution_result.as_deref(), Some(r#"{"added":1}"#));
    }

    #[tokio::test]
    async fn test_settles_only_once() {
        let ledger = ledger();
        let id = ledger.begin("remove_notes", &json!({})).await.unwrap();
        ledger.fail(id, "clip not found").await.unwrap();
        ledger.complete(id, &json!("ok")).await.unwrap();

        let row = ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Failed);
        assert_eq!(row.execution_result.as_deref(), Some("clip not found"));
    }

    #[tokio::test]
    async fn test_complete_unknown_id_is_tolerated() {
        let ledger = ledger();
        ledger.complete(HistoryId(31337), &json!(null)).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_overlong_tool_name() {
        let ledger = ledger();
        let name = "x".repeat(MAX_TOOL_NAME_LEN + 1);
        let err = ledger.begin(&name, &json!({})).await.unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_snapshot_links_to_history() {
        let ledger = ledger();
        let id = ledger.begin("replace_all_notes_to_clip", &json!({})).await.unwrap();
        let payload = SnapshotPayload::Note(NoteSnapshot {
            clip_id: "8".into(),
            notes: vec![Note::new(60, 0.0, 1.0, 100.0)],
        });
        ledger.capture_snapshot(id, &payload).await.unwrap();

        let snap = ledger.snapshot(id).await.unwrap().unwrap();
        assert_eq!(snap.history_id, id);
        let decoded = SnapshotPayload::decode(snap.snapshot_type, snap.snapshot_data.as_deref()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_reconcile_pending_marks_failed() {
        let ledger = ledger();
        let orphan = ledger.begin("add_notes_to_clip", &json!({})).await.unwrap();
        let done = ledger.begin("add_notes_to_clip", &json!({})).await.unwrap();
        ledger.complete(done, &json!("ok")).await.unwrap();

        assert_eq!(ledger.reconcile_pending().await.unwrap(), 1);
        let row = ledger.history(orphan).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Failed);
        assert_eq!(row.execution_result.as_deref(), Some(INTERRUPTED_RESULT));
        assert_eq!(
            ledger.history(done).await.unwrap().unwrap().status,
            OperationStatus::Success
        );
    }
}
