//! Tool implementations, grouped by the Live object they work on.
//!
//! Every tool is a unit struct implementing [`Tool`]; [`register_all`] is the
//! static list the server builds its registry from.

mod application;
mod browser;
mod clip;
mod device;
mod history;
mod metrics;
mod song;
mod track;

use serde_json::{Value, json};

use ableton_copilot_kernel::{KernelError, KernelResult, ToolRegistry};

pub use application::GetApplicationInfo;
pub use browser::{ListResources, LoadDevice};
pub use clip::{
    AddNotesToClip, GetAllNotesByClipId, GetClipInfoById, GetDetailClip, RemoveClipAllNotes, RemoveNotes,
    ReplaceAllNotesToClip, SetClipProperty,
};
pub use device::{GetDeviceParameters, ModifyDeviceParameterValue};
pub use history::{GetOperationHistories, GetSnapshotByHistoryId, RollbackByHistoryId};
pub use metrics::GetPerformanceMetrics;
pub use song::{
    CreateTrack, DeleteTrack, DuplicateTrack, GetAllTracks, GetSongInfo, GetTracksCount,
    RecordByTimeRange,
};
pub use track::{
    CreateEmptyMidiClip, DuplicateClipToTrack, GetClipsByTrackId, GetTrackAvailableInputRoutings, GetTrackInfoById,
    SetTrackProperty,
};

/// Register every tool the server exposes.
pub fn register_all(registry: &mut ToolRegistry) -> KernelResult<()> {
    // history
    registry.register(GetOperationHistories)?;
    registry.register(GetSnapshotByHistoryId)?;
    registry.register(RollbackByHistoryId)?;

    // clip
    registry.register(GetDetailClip)?;
    registry.register(GetClipInfoById)?;
    registry.register(GetAllNotesByClipId)?;
    registry.register(AddNotesToClip)?;
    registry.register(RemoveNotes)?;
    registry.register(RemoveClipAllNotes)?;
    registry.register(ReplaceAllNotesToClip)?;
    registry.register(SetClipProperty)?;

    // track
    registry.register(GetTrackInfoById)?;
    registry.register(GetClipsByTrackId)?;
    registry.register(CreateEmptyMidiClip)?;
    registry.register(SetTrackProperty)?;
    registry.register(DuplicateClipToTrack)?;
    registry.register(GetTrackAvailableInputRoutings)?;

    // song
    registry.register(GetSongInfo)?;
    registry.register(GetAllTracks)?;
    registry.register(GetTracksCount)?;
    registry.register(CreateTrack)?;
    registry.register(DeleteTrack)?;
    registry.register(DuplicateTrack)?;
    registry.register(RecordByTimeRange)?;

    // browser
    registry.register(ListResources)?;
    registry.register(LoadDevice)?;

    // device
    registry.register(GetDeviceParameters)?;
    registry.register(ModifyDeviceParameterValue)?;

    // application & diagnostics
    registry.register(GetApplicationInfo)?;
    registry.register(GetPerformanceMetrics)?;
    Ok(())
}

/// Result body of mutations with nothing else to report.
pub(crate) fn ok() -> Value {
    json!("ok")
}

pub(crate) fn require_id(field: &str, id: &str) -> KernelResult<()> {
    if id.trim().is_empty() {
        return Err(KernelError::invalid_argument(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_finite(field: &str, value: f64) -> KernelResult<()> {
    if !value.is_finite() {
        return Err(KernelError::invalid_argument(format!("{field} must be a finite number")));
    }
    Ok(())
}
