//! Clip inspection and note editing.
//!
//! The four note-editing tools are tracked: each call gets a history row and
//! a snapshot of the clip's notes, so it can be rolled back.

use async_trait::async_trait;
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelError, KernelResult, SnapshotTarget, Tool};
use ableton_copilot_types::{HistoryId, Note, NoteRange, sort_notes};

use super::{ok, require_finite, require_id};
use crate::models::{ClipIdRequest, ClipNotesRequest, EmptyRequest, RemoveNotesRequest, SetClipPropertyRequest};

fn validate_notes(notes: &[Note]) -> KernelResult<()> {
    Note::validate_all(notes)
        .map_err(|(i, e)| KernelError::invalid_argument(format!("notes[{i}]: {e}")))
}

pub struct GetDetailClip;

#[async_trait]
impl Tool for GetDetailClip {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_detail_clip";
    const DESCRIPTION: &'static str = "Get the clip open in the detail view (piano roll)";

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let clip = ctx.song().detail_clip().await?;
        Ok(clip.info().await?)
    }
}

pub struct GetClipInfoById;

#[async_trait]
impl Tool for GetClipInfoById {
    type Params = ClipIdRequest;
    const NAME: &'static str = "get_clip_info_by_id";
    const DESCRIPTION: &'static str = "Get clip info by clip id";

    fn validate(params: &ClipIdRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)
    }

    async fn call(&self, ctx: &AppContext, params: ClipIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.clip(&params.clip_id).info().await?)
    }
}

pub struct GetAllNotesByClipId;

#[async_trait]
impl Tool for GetAllNotesByClipId {
    type Params = ClipIdRequest;
    const NAME: &'static str = "get_all_notes_by_clipid";
    const DESCRIPTION: &'static str = "Get clip all notes by clip id, ordered by time then pitch";

    fn validate(params: &ClipIdRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)
    }

    async fn call(&self, ctx: &AppContext, params: ClipIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let mut notes = ctx.clip(&params.clip_id).get_all_notes().await?;
        sort_notes(&mut notes);
        Ok(serde_json::to_value(notes)?)
    }
}

pub struct AddNotesToClip;

#[async_trait]
impl Tool for AddNotesToClip {
    type Params = ClipNotesRequest;
    const NAME: &'static str = "add_notes_to_clip";
    const DESCRIPTION: &'static str = "Add notes to clip by clip id. Existing notes are kept";
    const TRACKED: bool = true;

    fn validate(params: &ClipNotesRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)?;
        validate_notes(&params.notes)
    }

    fn snapshot_target(params: &ClipNotesRequest) -> Option<SnapshotTarget> {
        Some(SnapshotTarget::clip_notes(params.clip_id.clone()))
    }

    async fn call(&self, ctx: &AppContext, params: ClipNotesRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        ctx.clip(&params.clip_id).set_notes(&params.notes).await?;
        Ok(ok())
    }
}

pub struct RemoveNotes;

#[async_trait]
impl Tool for RemoveNotes {
    type Params = RemoveNotesRequest;
    const NAME: &'static str = "remove_notes";
    const DESCRIPTION: &'static str = "Remove the notes of a clip inside a pitch and time window. \
        A note is removed when its pitch is in [from_pitch, from_pitch + pitch_span) \
        and its start time is in [from_time, from_time + time_span)";
    const TRACKED: bool = true;

    fn validate(params: &RemoveNotesRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)?;
        if !(0..=127).contains(&params.from_pitch) {
            return Err(KernelError::invalid_argument(format!(
                "from_pitch {} is out of range (0-127)",
                params.from_pitch
            )));
        }
        if params.pitch_span < 1 {
            return Err(KernelError::invalid_argument("pitch_span must be at least 1"));
        }
        require_finite("from_time", params.from_time)?;
        require_finite("time_span", params.time_span)?;
        if params.from_time < 0.0 || params.time_span <= 0.0 {
            return Err(KernelError::invalid_argument(
                "from_time must be non-negative and time_span greater than zero",
            ));
        }
        Ok(())
    }

    fn snapshot_target(params: &RemoveNotesRequest) -> Option<SnapshotTarget> {
        Some(SnapshotTarget::clip_notes(params.clip_id.clone()))
    }

    async fn call(&self, ctx: &AppContext, params: RemoveNotesRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let range = NoteRange::new(params.from_pitch, params.pitch_span, params.from_time, params.time_span);
        ctx.clip(&params.clip_id).remove_notes(range).await?;
        Ok(ok())
    }
}

pub struct RemoveClipAllNotes;

#[async_trait]
impl Tool for RemoveClipAllNotes {
    type Params = ClipIdRequest;
    const NAME: &'static str = "remove_clip_all_notes";
    const DESCRIPTION: &'static str = "Remove clip all notes by clip id";
    const TRACKED: bool = true;

    fn validate(params: &ClipIdRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)
    }

    fn snapshot_target(params: &ClipIdRequest) -> Option<SnapshotTarget> {
        Some(SnapshotTarget::clip_notes(params.clip_id.clone()))
    }

    async fn call(&self, ctx: &AppContext, params: ClipIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        ctx.clip(&params.clip_id).remove_all_notes().await?;
        Ok(ok())
    }
}

pub struct ReplaceAllNotesToClip;

#[async_trait]
impl Tool for ReplaceAllNotesToClip {
    type Params = ClipNotesRequest;
    const NAME: &'static str = "replace_all_notes_to_clip";
    const DESCRIPTION: &'static str = "Replace clip all notes by clip id";
    const TRACKED: bool = true;

    fn validate(params: &ClipNotesRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)?;
        validate_notes(&params.notes)
    }

    fn snapshot_target(params: &ClipNotesRequest) -> Option<SnapshotTarget> {
        Some(SnapshotTarget::clip_notes(params.clip_id.clone()))
    }

    async fn call(&self, ctx: &AppContext, params: ClipNotesRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let clip = ctx.clip(&params.clip_id);
        clip.remove_all_notes().await?;
        clip.set_notes(&params.notes).await?;
        Ok(ok())
    }
}

pub struct SetClipProperty;

#[async_trait]
impl Tool for SetClipProperty {
    type Params = SetClipPropertyRequest;
    const NAME: &'static str = "set_clip_property";
    const DESCRIPTION: &'static str = "set clip properties (name, color, loop, markers, mute) and return the updated clip";

    fn validate(params: &SetClipPropertyRequest) -> KernelResult<()> {
        require_id("clip_id", &params.clip_id)?;
        let p = &params.property;
        for (field, value) in [
            ("loop_start", p.loop_start),
            ("loop_end", p.loop_end),
            ("start_marker", p.start_marker),
            ("end_marker", p.end_marker),
        ] {
            if let Some(v) = value {
                require_finite(field, v)?;
            }
        }
        if let (Some(start), Some(end)) = (p.loop_start, p.loop_end) {
            if end <= start {
                return Err(KernelError::invalid_argument("loop_end must be greater than loop_start"));
            }
        }
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: SetClipPropertyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.clip(&params.clip_id).apply(params.property).await?)
    }
}
