//! Snapshot codec.
//!
//! A snapshot is the complete prior state needed to undo one tracked call.
//! [`SnapshotTarget`] says what to capture before the call runs,
//! [`SnapshotPayload`] is the captured value, and the payload round-trips
//! through the `snapshot_data` column as JSON tagged by [`SnapshotKind`].
//!
//! Adding a kind means adding a variant to both enums; every match over them
//! is exhaustive, so capture, encode, decode and restore cannot drift apart.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ableton_copilot_types::{Note, SnapshotKind};

use crate::error::{KernelError, KernelResult};
use crate::live::{ClipHandle, LiveBridge};

/// Full note set of one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub clip_id: String,
    pub notes: Vec<Note>,
}

/// Decoded snapshot, one variant per [`SnapshotKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotPayload {
    Note(NoteSnapshot),
}

impl SnapshotPayload {
    pub fn kind(&self) -> SnapshotKind {
        match self {
            SnapshotPayload::Note(_) => SnapshotKind::Note,
        }
    }

    pub fn encode(&self) -> KernelResult<String> {
        match self {
            SnapshotPayload::Note(snap) => encode_note_snapshot(&snap.clip_id, &snap.notes),
        }
    }

    /// Decode a stored payload. A missing or malformed payload is corrupt.
    pub fn decode(kind: SnapshotKind, data: Option<&str>) -> KernelResult<Self> {
        let data = data.ok_or_else(|| {
            KernelError::CorruptSnapshot(format!("{kind} snapshot has no payload"))
        })?;
        match kind {
            SnapshotKind::Note => Ok(SnapshotPayload::Note(decode_note_snapshot(data)?)),
        }
    }
}

pub fn encode_note_snapshot(clip_id: &str, notes: &[Note]) -> KernelResult<String> {
    let snap = NoteSnapshot {
        clip_id: clip_id.to_string(),
        notes: notes.to_vec(),
    };
    serde_json::to_string(&snap).map_err(|e| KernelError::Internal(format!("encode note snapshot: {e}")))
}

pub fn decode_note_snapshot(payload: &str) -> KernelResult<NoteSnapshot> {
    let snap: NoteSnapshot = serde_json::from_str(payload)
        .map_err(|e| KernelError::CorruptSnapshot(format!("invalid NOTE payload: {e}")))?;
    if let Err((i, e)) = Note::validate_all(&snap.notes) {
        return Err(KernelError::CorruptSnapshot(format!("note {i} in NOTE payload: {e}")));
    }
    Ok(snap)
}

/// What a tracked tool will mutate, and therefore what to capture first.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotTarget {
    /// Every note in the clip, over the full pitch and time range.
    ClipNotes { clip_id: String },
}

impl SnapshotTarget {
    pub fn clip_notes(clip_id: impl Into<String>) -> Self {
        SnapshotTarget::ClipNotes {
            clip_id: clip_id.into(),
        }
    }

    pub fn kind(&self) -> SnapshotKind {
        match self {
            SnapshotTarget::ClipNotes { .. } => SnapshotKind::Note,
        }
    }

    /// Read the current state from Live.
    pub async fn capture(&self, live: &Arc<dyn LiveBridge>) -> KernelResult<SnapshotPayload> {
        match self {
            SnapshotTarget::ClipNotes { clip_id } => {
                let notes = ClipHandle::new(live.clone(), clip_id.clone())
                    .get_all_notes()
                    .await?;
                Ok(SnapshotPayload::Note(NoteSnapshot {
                    clip_id: clip_id.clone(),
                    notes,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLive;
    use ableton_copilot_types::TrackKind;

    #[test]
    fn test_note_payload_shape() {
        let payload = encode_note_snapshot("12", &[Note::new(60, 0.0, 1.0, 100.0)]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["clip_id"], "12");
        assert_eq!(json["notes"][0]["pitch"], 60);
        assert_eq!(json["notes"][0]["muted"], false);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_note_snapshot("not json").unwrap_err();
        assert!(matches!(err, KernelError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_decode_rejects_missing_clip_id() {
        let err = decode_note_snapshot(r#"{"notes": []}"#).unwrap_err();
        assert!(matches!(err, KernelError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_decode_rejects_out_of_range_note() {
        let err = decode_note_snapshot(
            r#"{"clip_id":"1","notes":[{"pitch":200,"time":0,"duration":1,"velocity":90,"muted":false}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_decode_missing_payload() {
        let err = SnapshotPayload::decode(SnapshotKind::Note, None).unwrap_err();
        assert!(matches!(err, KernelError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_payload_encode_decode_preserves_notes() {
        let original = SnapshotPayload::Note(NoteSnapshot {
            clip_id: "4".into(),
            notes: vec![Note::new(60, 0.0, 1.0, 100.0), Note::new(67, 0.5, 0.25, 64.0)],
        });
        let data = original.encode().unwrap();
        let decoded = SnapshotPayload::decode(original.kind(), Some(&data)).unwrap();
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn test_capture_reads_whole_clip() {
        let live = Arc::new(MemoryLive::new());
        let track = live.add_track(TrackKind::Midi, "Bass");
        let notes = vec![
            Note::new(0, 0.0, 1.0, 100.0),
            Note::new(127, 3.0, 1.0, 100.0),
            Note::new(36, 5000.0, 1.0, 100.0),
        ];
        let clip = live.add_midi_clip(&track, 0.0, 8.0, notes.clone()).unwrap();

        let bridge: Arc<dyn LiveBridge> = live;
        let payload = SnapshotTarget::clip_notes(clip.clone()).capture(&bridge).await.unwrap();
        let SnapshotPayload::Note(snap) = payload;
        assert_eq!(snap.clip_id, clip);
        assert_eq!(snap.notes.len(), 3, "extreme pitches and late notes must be captured");
    }

    #[tokio::test]
    async fn test_capture_missing_clip_is_not_found() {
        let bridge: Arc<dyn LiveBridge> = Arc::new(MemoryLive::new());
        let err = SnapshotTarget::clip_notes("404").capture(&bridge).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
    }
}
