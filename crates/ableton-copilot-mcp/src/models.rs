//! MCP request types.
//!
//! One struct per tool input. Field docs become the JSON schema descriptions
//! clients see.

use rmcp::schemars;
use serde::Deserialize;

use ableton_copilot_kernel::live::accessors::{ClipUpdate, TrackUpdate};
use ableton_copilot_types::{FULL_PITCH_SPAN, FULL_TIME_SPAN, Note, ResourceType, TrackKind};

/// Tools that take no arguments.
#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct EmptyRequest {}

// ============================================================================
// History
// ============================================================================

/// Page through operation histories, newest first.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HistoryPageRequest {
    #[schemars(description = "Page number, starting at 1")]
    pub page: u32,
    #[schemars(description = "Rows per page, at least 1")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct HistoryIdRequest {
    #[schemars(description = "The id of the operation history. Must be a value greater than 0.")]
    pub history_id: i64,
}

// ============================================================================
// Clip
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClipIdRequest {
    #[schemars(description = "Clip id")]
    pub clip_id: String,
}

/// Notes to add to, or replace in, a clip.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClipNotesRequest {
    #[schemars(description = "Clip id")]
    pub clip_id: String,
    #[schemars(description = "The notes to write")]
    pub notes: Vec<Note>,
}

fn default_pitch_span() -> i32 {
    FULL_PITCH_SPAN
}

fn default_time_span() -> f64 {
    FULL_TIME_SPAN
}

/// Remove notes inside a pitch/time window. Omitted bounds cover the whole clip.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveNotesRequest {
    #[schemars(description = "Clip id")]
    pub clip_id: String,
    #[serde(default)]
    #[schemars(description = "Lowest pitch to remove (default 0)")]
    pub from_pitch: i32,
    #[serde(default = "default_pitch_span")]
    #[schemars(description = "Number of pitches upward from from_pitch (default 128)")]
    pub pitch_span: i32,
    #[serde(default)]
    #[schemars(description = "Start of the window in beats (default 0)")]
    pub from_time: f64,
    #[serde(default = "default_time_span")]
    #[schemars(description = "Window length in beats (default: whole clip)")]
    pub time_span: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetClipPropertyRequest {
    #[schemars(description = "Clip id")]
    pub clip_id: String,
    #[schemars(description = "Properties to change; omitted ones are left alone")]
    pub property: ClipUpdate,
}

// ============================================================================
// Track
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TrackIdRequest {
    #[schemars(description = "Track id")]
    pub track_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateMidiClipRequest {
    #[schemars(description = "Track id")]
    pub track_id: String,
    #[schemars(description = "Arrangement position in beats")]
    pub time: f64,
    #[schemars(description = "Length is given in beats and must be a greater value than 0.0.")]
    pub length: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetTrackPropertyRequest {
    #[schemars(description = "Track id")]
    pub track_id: String,
    #[schemars(description = "Properties to change; omitted ones are left alone")]
    pub property: TrackUpdate,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DuplicateClipToTrackRequest {
    #[schemars(description = "Clip to copy")]
    pub clip_id: String,
    #[schemars(description = "Destination track id")]
    pub track_id: String,
    #[schemars(description = "Arrangement position in beats")]
    pub time: f64,
}

// ============================================================================
// Song
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateTrackRequest {
    #[serde(rename = "type", default)]
    #[schemars(description = "Track type: midi, audio or return")]
    pub kind: TrackKind,
    #[serde(default)]
    #[schemars(description = "[int] index of track, default 0, range [0, track count]; -1 appends. Ignored for return tracks")]
    pub index: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TrackIndexRequest {
    #[schemars(description = "[int] index of track")]
    pub index: i64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RecordRequest {
    #[schemars(description = "Start of the recording window in beats")]
    pub start_time: f64,
    #[schemars(description = "End of the recording window in beats")]
    pub end_time: f64,
}

// ============================================================================
// Device
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DeviceIdRequest {
    #[schemars(description = "Device id")]
    pub device_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ModifyParameterRequest {
    #[schemars(description = "parameter id, get from get_device_parameters")]
    pub parameter_id: String,
    #[schemars(description = "New value, within the parameter's [min, max]")]
    pub value: f64,
}

// ============================================================================
// Browser
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListResourcesRequest {
    #[serde(rename = "type")]
    #[schemars(description = "Resource type: audio_effects, instruments, plugins, drums, samples, midi_effects or sounds")]
    pub kind: ResourceType,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LoadDeviceRequest {
    #[schemars(description = "Id of the browser item to load, from list_resources")]
    pub device_id: String,
    #[serde(default)]
    #[schemars(description = "Track to load onto; the selected track when omitted")]
    pub track_id: Option<String>,
}
