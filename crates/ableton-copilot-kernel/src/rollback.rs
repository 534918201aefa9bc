//! Rollback engine.
//!
//! Given a history id, walk the eligibility states and, if the row is a
//! successful call with a snapshot, put the snapshotted state back:
//!
//! ```text
//! lookup ──► NotFound                       (NOT_FOUND)
//!        ──► FoundNotSuccess                (INVALID_STATE)
//!        ──► FoundNoSnapshot                (NOT_FOUND)
//!        ──► FoundSnapshot ─► Restoring ─► Restored
//! ```
//!
//! One attempt, no retry. Restoring notes clears the clip and then inserts
//! the snapshot; if the insert fails the clip stays empty and the error says
//! so.

use std::sync::Arc;

use serde::Serialize;

use ableton_copilot_types::{HistoryId, OperationStatus, SnapshotKind};

use crate::error::{KernelError, KernelResult};
use crate::ledger::Ledger;
use crate::live::{BridgeError, ClipHandle, LiveBridge};
use crate::snapshot::{NoteSnapshot, SnapshotPayload};

/// Stage reached while rolling back one history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStage {
    NotFound,
    FoundNotSuccess,
    FoundNoSnapshot,
    FoundSnapshot,
    Restoring,
    Restored,
}

/// What a completed rollback did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub history_id: HistoryId,
    pub snapshot_type: SnapshotKind,
    pub stage: RollbackStage,
    /// Entity the snapshot was restored into.
    pub target: String,
    pub restored_items: usize,
}

#[derive(Clone)]
pub struct RollbackEngine {
    ledger: Ledger,
    live: Arc<dyn LiveBridge>,
}

impl RollbackEngine {
    pub fn new(ledger: Ledger, live: Arc<dyn LiveBridge>) -> Self {
        Self { ledger, live }
    }

    /// Steps 1-3: confirm the row is eligible and decode its snapshot.
    pub async fn load(&self, id: HistoryId) -> KernelResult<SnapshotPayload> {
        let Some(history) = self.ledger.history(id).await? else {
            tracing::debug!(history_id = %id, stage = ?RollbackStage::NotFound, "rollback rejected");
            return Err(KernelError::not_found(format!("operation history {id} not found")));
        };
        if history.status != OperationStatus::Success {
            tracing::debug!(history_id = %id, stage = ?RollbackStage::FoundNotSuccess, status = %history.status, "rollback rejected");
            return Err(KernelError::InvalidState(format!(
                "operation history {id} has status {}; only SUCCESS operations can be rolled back",
                history.status
            )));
        }
        let Some(snapshot) = self.ledger.snapshot(id).await? else {
            tracing::debug!(history_id = %id, stage = ?RollbackStage::FoundNoSnapshot, "rollback rejected");
            return Err(KernelError::not_found(format!(
                "no snapshot recorded for operation history {id}"
            )));
        };
        tracing::debug!(history_id = %id, stage = ?RollbackStage::FoundSnapshot, kind = %snapshot.snapshot_type);
        SnapshotPayload::decode(snapshot.snapshot_type, snapshot.snapshot_data.as_deref())
    }

    pub async fn rollback(&self, id: HistoryId) -> KernelResult<RollbackReport> {
        let payload = self.load(id).await?;
        tracing::info!(history_id = %id, stage = ?RollbackStage::Restoring, kind = %payload.kind(), "rolling back");
        let (target, restored_items) = self.restore(&payload).await?;
        tracing::info!(history_id = %id, stage = ?RollbackStage::Restored, %target, restored_items, "rollback complete");
        Ok(RollbackReport {
            history_id: id,
            snapshot_type: payload.kind(),
            stage: RollbackStage::Restored,
            target,
            restored_items,
        })
    }

    /// Step 4: dispatch on the payload kind.
    pub async fn restore(&self, payload: &SnapshotPayload) -> KernelResult<(String, usize)> {
        match payload {
            SnapshotPayload::Note(snap) => self.restore_notes(snap).await,
        }
    }

    async fn restore_notes(&self, snap: &NoteSnapshot) -> KernelResult<(String, usize)> {
        let clip = ClipHandle::new(self.live.clone(), snap.clip_id.clone());
        let target = format!("clip:{}", snap.clip_id);

        // A clip that no longer exists is reported as such, not as a bridge fault.
        clip.remove_all_notes().await.map_err(|e| match e {
            BridgeError::NotFound(_) => KernelError::not_found(format!("clip {} not found", snap.clip_id)),
            other => KernelError::internal(format!("failed to clear clip {}: {other}", snap.clip_id)),
        })?;

        if let Err(e) = clip.set_notes(&snap.notes).await {
            tracing::error!(
                clip_id = %snap.clip_id,
                notes = snap.notes.len(),
                error = %e,
                "restore failed after clearing clip; clip is now empty"
            );
            return Err(KernelError::internal(format!(
                "clip {} was cleared but restoring {} notes failed: {e}; the clip is left empty",
                snap.clip_id,
                snap.notes.len()
            )));
        }
        Ok((target, snap.notes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLive;
    use crate::repository::SqliteRepository;
    use ableton_copilot_types::{Note, TrackKind};
    use serde_json::json;

    struct Fixture {
        live: Arc<MemoryLive>,
        ledger: Ledger,
        engine: RollbackEngine,
        clip_id: String,
    }

    fn fixture(notes: Vec<Note>) -> Fixture {
        let live = Arc::new(MemoryLive::new());
        let track = live.add_track(TrackKind::Midi, "Lead");
        let clip_id = live.add_midi_clip(&track, 0.0, 8.0, notes).unwrap();
        let ledger = Ledger::new(Arc::new(SqliteRepository::in_memory().unwrap()));
        let engine = RollbackEngine::new(ledger.clone(), live.clone());
        Fixture {
            live,
            ledger,
            engine,
            clip_id,
        }
    }

    async fn tracked_row(f: &Fixture, notes: Vec<Note>, status: OperationStatus) -> HistoryId {
        let id = f.ledger.begin("replace_all_notes_to_clip", &json!({})).await.unwrap();
        let payload = SnapshotPayload::Note(NoteSnapshot {
            clip_id: f.clip_id.clone(),
            notes,
        });
        f.ledger.capture_snapshot(id, &payload).await.unwrap();
        match status {
            OperationStatus::Success => f.ledger.complete(id, &json!("ok")).await.unwrap(),
            OperationStatus::Failed => f.ledger.fail(id, "boom").await.unwrap(),
            OperationStatus::Pending => {}
        }
        id
    }

    #[tokio::test]
    async fn test_unknown_history_is_not_found() {
        let f = fixture(vec![]);
        let err = f.engine.rollback(HistoryId(999)).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
        assert!(f.live.command_log().is_empty(), "no bridge call on rejection");
    }

    #[tokio::test]
    async fn test_pending_and_failed_are_rejected() {
        let f = fixture(vec![Note::new(60, 0.0, 1.0, 100.0)]);
        for status in [OperationStatus::Pending, OperationStatus::Failed] {
            let id = tracked_row(&f, vec![], status).await;
            let err = f.engine.rollback(id).await.unwrap_err();
            assert!(matches!(err, KernelError::InvalidState(_)), "{status}: {err:?}");
        }
        assert_eq!(f.live.clip_notes(&f.clip_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_not_found() {
        let f = fixture(vec![]);
        let id = f.ledger.begin("set_clip_property", &json!({})).await.unwrap();
        f.ledger.complete(id, &json!("ok")).await.unwrap();
        let err = f.engine.rollback(id).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_replaces_whole_clip() {
        let before = vec![Note::new(60, 0.0, 1.0, 100.0), Note::new(64, 1.0, 1.0, 90.0)];
        let f = fixture(vec![Note::new(72, 2.0, 0.5, 110.0)]);
        let id = tracked_row(&f, before.clone(), OperationStatus::Success).await;

        let report = f.engine.rollback(id).await.unwrap();
        assert_eq!(report.stage, RollbackStage::Restored);
        assert_eq!(report.restored_items, 2);
        assert_eq!(f.live.clip_notes(&f.clip_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_double_rollback_is_stable() {
        let before = vec![Note::new(48, 0.0, 2.0, 80.0)];
        let f = fixture(vec![]);
        let id = tracked_row(&f, before.clone(), OperationStatus::Success).await;

        f.engine.rollback(id).await.unwrap();
        let first = f.live.clip_notes(&f.clip_id).unwrap();
        f.engine.rollback(id).await.unwrap();
        assert_eq!(f.live.clip_notes(&f.clip_id).unwrap(), first);
        assert_eq!(first, before);
    }

    #[tokio::test]
    async fn test_insert_failure_after_clear_is_reported() {
        let f = fixture(vec![Note::new(72, 2.0, 0.5, 110.0)]);
        let id = tracked_row(&f, vec![Note::new(60, 0.0, 1.0, 100.0)], OperationStatus::Success).await;
        f.live.fail_command("set_notes", "remote script timeout");

        let err = f.engine.rollback(id).await.unwrap_err();
        assert!(matches!(err, KernelError::Internal(_)));
        assert!(err.to_string().contains("left empty"));
        assert!(f.live.clip_notes(&f.clip_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_payload_surfaces() {
        let f = fixture(vec![]);
        let id = f.ledger.begin("remove_notes", &json!({})).await.unwrap();
        f.ledger
            .repository()
            .create_snapshot(crate::repository::NewSnapshot {
                history_id: id,
                kind: SnapshotKind::Note,
                data: Some("{\"notes\": 5}".into()),
            })
            .await
            .unwrap();
        f.ledger.complete(id, &json!("ok")).await.unwrap();

        let err = f.engine.rollback(id).await.unwrap_err();
        assert!(matches!(err, KernelError::CorruptSnapshot(_)));
    }

    #[tokio::test]
    async fn test_deleted_clip_is_not_found() {
        let f = fixture(vec![]);
        let id = f.ledger.begin("remove_notes", &json!({})).await.unwrap();
        let payload = SnapshotPayload::Note(NoteSnapshot {
            clip_id: "does-not-exist".into(),
            notes: vec![],
        });
        f.ledger.capture_snapshot(id, &payload).await.unwrap();
        f.ledger.complete(id, &json!("ok")).await.unwrap();

        let err = f.engine.rollback(id).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
    }
}
