//! Typed handles over [`LiveBridge`].
//!
//! Each handle knows the property names and command signatures of one kind
//! of Live object, so tool code works with `Note`, `f64` and update structs
//! instead of strings and loose JSON.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};

use ableton_copilot_types::{Note, NoteRange, ObjectRef, ResourceType, TrackKind};

use super::{BridgeError, BridgeResult, LiveBridge};

/// Live versions before this one only understand the legacy `get_notes` and
/// `remove_notes` commands.
pub const EXTENDED_NOTES_MAJOR_VERSION: u64 = 11;

const SONG_INFO_PROPS: &[&str] = &[
    "name",
    "tempo",
    "signature_numerator",
    "signature_denominator",
    "root_note",
    "scale_name",
    "song_length",
    "is_playing",
    "record_mode",
    "current_song_time",
];

const TRACK_INFO_PROPS: &[&str] = &["name", "color", "mute", "solo", "arm", "has_midi_input", "kind"];

const CLIP_INFO_PROPS: &[&str] = &[
    "name",
    "color",
    "is_midi_clip",
    "start_time",
    "end_time",
    "length",
    "looping",
    "loop_start",
    "loop_end",
    "start_marker",
    "end_marker",
    "muted",
];

const DEVICE_INFO_PROPS: &[&str] = &["name", "class_name", "type", "is_active"];

const PARAMETER_INFO_PROPS: &[&str] = &["name", "value", "min", "max", "is_enabled", "is_quantized"];

async fn read_props(
    bridge: &dyn LiveBridge,
    target: &ObjectRef,
    names: &[&str],
) -> BridgeResult<Map<String, Value>> {
    let mut out = Map::new();
    for name in names {
        let value = bridge.get(target, name).await?;
        out.insert((*name).to_string(), value);
    }
    Ok(out)
}

fn expect_f64(value: &Value, property: &str) -> BridgeResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| BridgeError::Failed(format!("expected number for '{property}', got {value}")))
}

fn expect_bool(value: &Value, property: &str) -> BridgeResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        other => Err(BridgeError::Failed(format!("expected bool for '{property}', got {other}"))),
    }
}

fn expect_ids(value: Value, property: &str) -> BridgeResult<Vec<String>> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::Failed(format!("malformed id list for '{property}': {e}")))
}

fn created_id(value: &Value, command: &str) -> BridgeResult<String> {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BridgeError::Failed(format!("'{command}' did not return an id")))
}

fn with_id(id: &str, mut props: Map<String, Value>) -> Value {
    props.insert("id".into(), Value::String(id.to_string()));
    Value::Object(props)
}

// ============================================================================
// Application
// ============================================================================

/// Host version, as reported by Live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveVersion {
    pub major: u64,
    pub minor: u64,
    pub bugfix: u64,
}

impl std::fmt::Display for LiveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.bugfix)
    }
}

#[derive(Clone)]
pub struct ApplicationHandle {
    bridge: Arc<dyn LiveBridge>,
}

impl ApplicationHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>) -> Self {
        Self { bridge }
    }

    pub async fn version(&self) -> BridgeResult<LiveVersion> {
        let target = ObjectRef::Application;
        let major = self.bridge.get(&target, "major_version").await?;
        let minor = self.bridge.get(&target, "minor_version").await?;
        let bugfix = self.bridge.get(&target, "bugfix_version").await?;
        let as_u64 = |v: &Value, p: &str| {
            v.as_u64()
                .ok_or_else(|| BridgeError::Failed(format!("expected integer for '{p}', got {v}")))
        };
        Ok(LiveVersion {
            major: as_u64(&major, "major_version")?,
            minor: as_u64(&minor, "minor_version")?,
            bugfix: as_u64(&bugfix, "bugfix_version")?,
        })
    }

    pub async fn info(&self) -> BridgeResult<Value> {
        let version = self.version().await?;
        Ok(json!({
            "major_version": version.major,
            "minor_version": version.minor,
            "bugfix_version": version.bugfix,
            "version": version.to_string(),
        }))
    }
}

// ============================================================================
// Song
// ============================================================================

#[derive(Clone)]
pub struct SongHandle {
    bridge: Arc<dyn LiveBridge>,
}

impl SongHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>) -> Self {
        Self { bridge }
    }

    pub async fn info(&self) -> BridgeResult<Value> {
        let props = read_props(self.bridge.as_ref(), &ObjectRef::Song, SONG_INFO_PROPS).await?;
        Ok(Value::Object(props))
    }

    pub async fn tracks(&self) -> BridgeResult<Vec<TrackHandle>> {
        let ids = expect_ids(self.bridge.get(&ObjectRef::Song, "tracks").await?, "tracks")?;
        Ok(ids.into_iter().map(|id| TrackHandle::new(self.bridge.clone(), id)).collect())
    }

    pub async fn return_tracks(&self) -> BridgeResult<Vec<TrackHandle>> {
        let ids = expect_ids(
            self.bridge.get(&ObjectRef::Song, "return_tracks").await?,
            "return_tracks",
        )?;
        Ok(ids.into_iter().map(|id| TrackHandle::new(self.bridge.clone(), id)).collect())
    }

    /// Create a track. `index` of -1 appends; return tracks ignore it.
    pub async fn create_track(&self, kind: TrackKind, index: i64) -> BridgeResult<TrackHandle> {
        let (command, args) = match kind {
            TrackKind::Midi => ("create_midi_track", vec![json!(index)]),
            TrackKind::Audio => ("create_audio_track", vec![json!(index)]),
            TrackKind::Return => ("create_return_track", vec![]),
        };
        let created = self.bridge.send_command(&ObjectRef::Song, command, args).await?;
        Ok(TrackHandle::new(self.bridge.clone(), created_id(&created, command)?))
    }

    pub async fn delete_track(&self, index: i64) -> BridgeResult<()> {
        self.bridge
            .send_command(&ObjectRef::Song, "delete_track", vec![json!(index)])
            .await?;
        Ok(())
    }

    pub async fn duplicate_track(&self, index: i64) -> BridgeResult<TrackHandle> {
        let created = self
            .bridge
            .send_command(&ObjectRef::Song, "duplicate_track", vec![json!(index)])
            .await?;
        Ok(TrackHandle::new(self.bridge.clone(), created_id(&created, "duplicate_track")?))
    }

    /// The clip shown in Live's detail view (the piano roll).
    pub async fn detail_clip(&self) -> BridgeResult<ClipHandle> {
        match self.bridge.get(&ObjectRef::SongView, "detail_clip").await? {
            Value::String(id) => Ok(ClipHandle::new(self.bridge.clone(), id)),
            Value::Null => Err(BridgeError::NotFound(
                "detail clip (open a clip in the piano roll first)".into(),
            )),
            other => Err(BridgeError::Failed(format!("expected clip id for 'detail_clip', got {other}"))),
        }
    }

    pub async fn select_track(&self, track_id: &str) -> BridgeResult<()> {
        self.bridge
            .set(&ObjectRef::SongView, "selected_track", json!(track_id))
            .await
    }

    pub async fn current_song_time(&self) -> BridgeResult<f64> {
        let v = self.bridge.get(&ObjectRef::Song, "current_song_time").await?;
        expect_f64(&v, "current_song_time")
    }

    pub async fn set_current_song_time(&self, beats: f64) -> BridgeResult<()> {
        self.bridge
            .set(&ObjectRef::Song, "current_song_time", json!(beats))
            .await
    }

    pub async fn record_mode(&self) -> BridgeResult<bool> {
        let v = self.bridge.get(&ObjectRef::Song, "record_mode").await?;
        expect_bool(&v, "record_mode")
    }

    pub async fn set_record_mode(&self, on: bool) -> BridgeResult<()> {
        self.bridge
            .set(&ObjectRef::Song, "record_mode", json!(u8::from(on)))
            .await
    }

    pub async fn start_playing(&self) -> BridgeResult<()> {
        self.bridge.send_command(&ObjectRef::Song, "start_playing", vec![]).await?;
        Ok(())
    }

    pub async fn stop_playing(&self) -> BridgeResult<()> {
        self.bridge.send_command(&ObjectRef::Song, "stop_playing", vec![]).await?;
        Ok(())
    }
}

// ============================================================================
// Track
// ============================================================================

/// Track properties a caller may change. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TrackUpdate {
    #[schemars(description = "New track name")]
    pub name: Option<String>,
    #[schemars(description = "Track color as 0xRRGGBB integer")]
    pub color: Option<i64>,
    #[schemars(description = "Mute the track")]
    pub mute: Option<bool>,
    #[schemars(description = "Solo the track")]
    pub solo: Option<bool>,
    #[schemars(description = "Arm the track for recording")]
    pub arm: Option<bool>,
}

impl TrackUpdate {
    fn into_pairs(self) -> Vec<(&'static str, Value)> {
        let mut pairs = Vec::new();
        if let Some(v) = self.name {
            pairs.push(("name", json!(v)));
        }
        if let Some(v) = self.color {
            pairs.push(("color", json!(v)));
        }
        if let Some(v) = self.mute {
            pairs.push(("mute", json!(v)));
        }
        if let Some(v) = self.solo {
            pairs.push(("solo", json!(v)));
        }
        if let Some(v) = self.arm {
            pairs.push(("arm", json!(v)));
        }
        pairs
    }
}

#[derive(Clone)]
pub struct TrackHandle {
    bridge: Arc<dyn LiveBridge>,
    id: String,
    target: ObjectRef,
}

impl TrackHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>, id: impl Into<String>) -> Self {
        let id = id.into();
        let target = ObjectRef::Track(id.clone());
        Self { bridge, id, target }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn info(&self) -> BridgeResult<Value> {
        let props = read_props(self.bridge.as_ref(), &self.target, TRACK_INFO_PROPS).await?;
        Ok(with_id(&self.id, props))
    }

    pub async fn arrangement_clips(&self) -> BridgeResult<Vec<ClipHandle>> {
        let ids = expect_ids(
            self.bridge.get(&self.target, "arrangement_clips").await?,
            "arrangement_clips",
        )?;
        Ok(ids.into_iter().map(|id| ClipHandle::new(self.bridge.clone(), id)).collect())
    }

    pub async fn devices(&self) -> BridgeResult<Vec<DeviceHandle>> {
        let ids = expect_ids(self.bridge.get(&self.target, "devices").await?, "devices")?;
        Ok(ids.into_iter().map(|id| DeviceHandle::new(self.bridge.clone(), id)).collect())
    }

    /// Display names of the input routing types this track can use.
    pub async fn available_input_routings(&self) -> BridgeResult<Vec<String>> {
        let raw = self.bridge.get(&self.target, "available_input_routing_types").await?;
        let Value::Array(routings) = raw else {
            return Err(BridgeError::Failed(format!(
                "expected a list for 'available_input_routing_types', got {raw}"
            )));
        };
        routings
            .iter()
            .map(|r| {
                r.get("display_name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| BridgeError::Failed(format!("routing type without display_name: {r}")))
            })
            .collect()
    }

    /// Create an empty MIDI clip in the arrangement.
    pub async fn create_midi_clip(&self, time: f64, length: f64) -> BridgeResult<ClipHandle> {
        let created = self
            .bridge
            .send_command(&self.target, "create_midi_clip", vec![json!(time), json!(length)])
            .await?;
        Ok(ClipHandle::new(self.bridge.clone(), created_id(&created, "create_midi_clip")?))
    }

    /// Copy a clip onto this track's arrangement at `time`.
    pub async fn duplicate_clip_to_arrangement(&self, clip_id: &str, time: f64) -> BridgeResult<ClipHandle> {
        let created = self
            .bridge
            .send_command(
                &self.target,
                "duplicate_clip_to_arrangement",
                vec![json!(clip_id), json!(time)],
            )
            .await?;
        Ok(ClipHandle::new(
            self.bridge.clone(),
            created_id(&created, "duplicate_clip_to_arrangement")?,
        ))
    }

    pub async fn apply(&self, update: TrackUpdate) -> BridgeResult<Value> {
        for (property, value) in update.into_pairs() {
            self.bridge.set(&self.target, property, value).await?;
        }
        self.info().await
    }
}

// ============================================================================
// Clip
// ============================================================================

/// Clip properties a caller may change. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClipUpdate {
    #[schemars(description = "New clip name")]
    pub name: Option<String>,
    #[schemars(description = "Clip color as 0xRRGGBB integer")]
    pub color: Option<i64>,
    #[schemars(description = "Enable or disable looping")]
    pub looping: Option<bool>,
    #[schemars(description = "Loop start in beats")]
    pub loop_start: Option<f64>,
    #[schemars(description = "Loop end in beats")]
    pub loop_end: Option<f64>,
    #[schemars(description = "Start marker in beats")]
    pub start_marker: Option<f64>,
    #[schemars(description = "End marker in beats")]
    pub end_marker: Option<f64>,
    #[schemars(description = "Mute the clip")]
    pub muted: Option<bool>,
}

impl ClipUpdate {
    fn into_pairs(self) -> Vec<(&'static str, Value)> {
        let mut pairs = Vec::new();
        if let Some(v) = self.name {
            pairs.push(("name", json!(v)));
        }
        if let Some(v) = self.color {
            pairs.push(("color", json!(v)));
        }
        if let Some(v) = self.looping {
            pairs.push(("looping", json!(v)));
        }
        // Loop end before start so a window moved later never inverts.
        if let Some(v) = self.loop_end {
            pairs.push(("loop_end", json!(v)));
        }
        if let Some(v) = self.loop_start {
            pairs.push(("loop_start", json!(v)));
        }
        if let Some(v) = self.end_marker {
            pairs.push(("end_marker", json!(v)));
        }
        if let Some(v) = self.start_marker {
            pairs.push(("start_marker", json!(v)));
        }
        if let Some(v) = self.muted {
            pairs.push(("muted", json!(v)));
        }
        pairs
    }
}

#[derive(Clone)]
pub struct ClipHandle {
    bridge: Arc<dyn LiveBridge>,
    id: String,
    target: ObjectRef,
}

impl std::fmt::Debug for ClipHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl ClipHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>, id: impl Into<String>) -> Self {
        let id = id.into();
        let target = ObjectRef::Clip(id.clone());
        Self { bridge, id, target }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn info(&self) -> BridgeResult<Value> {
        let props = read_props(self.bridge.as_ref(), &self.target, CLIP_INFO_PROPS).await?;
        Ok(with_id(&self.id, props))
    }

    /// Notes inside `range`, read with the command the host understands.
    pub async fn get_notes(&self, range: NoteRange) -> BridgeResult<Vec<Note>> {
        let version = ApplicationHandle::new(self.bridge.clone()).version().await?;
        let raw = if version.major < EXTENDED_NOTES_MAJOR_VERSION {
            self.bridge
                .send_command(
                    &self.target,
                    "get_notes",
                    vec![
                        json!(range.from_time),
                        json!(range.from_pitch),
                        json!(range.time_span),
                        json!(range.pitch_span),
                    ],
                )
                .await?
        } else {
            self.bridge
                .send_command(
                    &self.target,
                    "get_notes_extended",
                    vec![
                        json!(range.from_pitch),
                        json!(range.pitch_span),
                        json!(range.from_time),
                        json!(range.time_span),
                    ],
                )
                .await?
        };
        serde_json::from_value(raw)
            .map_err(|e| BridgeError::Failed(format!("malformed note list from clip {}: {e}", self.id)))
    }

    pub async fn get_all_notes(&self) -> BridgeResult<Vec<Note>> {
        self.get_notes(NoteRange::all()).await
    }

    /// Remove notes in a range, picking the command the host understands.
    pub async fn remove_notes(&self, range: NoteRange) -> BridgeResult<()> {
        let version = ApplicationHandle::new(self.bridge.clone()).version().await?;
        if version.major < EXTENDED_NOTES_MAJOR_VERSION {
            self.bridge
                .send_command(
                    &self.target,
                    "remove_notes",
                    vec![
                        json!(range.from_time),
                        json!(range.from_pitch),
                        json!(range.time_span),
                        json!(range.pitch_span),
                    ],
                )
                .await?;
        } else {
            self.bridge
                .send_command(
                    &self.target,
                    "remove_notes_extended",
                    vec![
                        json!(range.from_pitch),
                        json!(range.pitch_span),
                        json!(range.from_time),
                        json!(range.time_span),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn remove_all_notes(&self) -> BridgeResult<()> {
        self.remove_notes(NoteRange::all()).await
    }

    /// Add notes to the clip. Existing notes are kept.
    pub async fn set_notes(&self, notes: &[Note]) -> BridgeResult<()> {
        let payload = serde_json::to_value(notes)
            .map_err(|e| BridgeError::Failed(format!("failed to encode notes: {e}")))?;
        self.bridge
            .send_command(&self.target, "set_notes", vec![payload])
            .await?;
        Ok(())
    }

    pub async fn apply(&self, update: ClipUpdate) -> BridgeResult<Value> {
        for (property, value) in update.into_pairs() {
            self.bridge.set(&self.target, property, value).await?;
        }
        self.info().await
    }
}

// ============================================================================
// Device & parameters
// ============================================================================

#[derive(Clone)]
pub struct DeviceHandle {
    bridge: Arc<dyn LiveBridge>,
    id: String,
    target: ObjectRef,
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl DeviceHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>, id: impl Into<String>) -> Self {
        let id = id.into();
        let target = ObjectRef::Device(id.clone());
        Self { bridge, id, target }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn info(&self) -> BridgeResult<Value> {
        let props = read_props(self.bridge.as_ref(), &self.target, DEVICE_INFO_PROPS).await?;
        Ok(with_id(&self.id, props))
    }

    pub async fn parameters(&self) -> BridgeResult<Vec<ParameterHandle>> {
        let ids = expect_ids(self.bridge.get(&self.target, "parameters").await?, "parameters")?;
        Ok(ids
            .into_iter()
            .map(|id| ParameterHandle::new(self.bridge.clone(), id))
            .collect())
    }
}

/// Snapshot of one device parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub is_enabled: bool,
    pub is_quantized: bool,
}

#[derive(Clone)]
pub struct ParameterHandle {
    bridge: Arc<dyn LiveBridge>,
    id: String,
    target: ObjectRef,
}

impl ParameterHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>, id: impl Into<String>) -> Self {
        let id = id.into();
        let target = ObjectRef::Parameter(id.clone());
        Self { bridge, id, target }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> BridgeResult<ParameterState> {
        let props = read_props(self.bridge.as_ref(), &self.target, PARAMETER_INFO_PROPS).await?;
        let field = |name: &str| props.get(name).cloned().unwrap_or(Value::Null);
        Ok(ParameterState {
            id: self.id.clone(),
            name: field("name").as_str().unwrap_or_default().to_string(),
            value: expect_f64(&field("value"), "value")?,
            min: expect_f64(&field("min"), "min")?,
            max: expect_f64(&field("max"), "max")?,
            is_enabled: expect_bool(&field("is_enabled"), "is_enabled")?,
            is_quantized: expect_bool(&field("is_quantized"), "is_quantized")?,
        })
    }

    pub async fn set_value(&self, value: f64) -> BridgeResult<()> {
        self.bridge.set(&self.target, "value", json!(value)).await
    }
}

// ============================================================================
// Browser
// ============================================================================

const BROWSER_ITEM_PROPS: &[&str] = &["name", "is_folder", "is_loadable", "uri"];

#[derive(Clone)]
pub struct BrowserHandle {
    bridge: Arc<dyn LiveBridge>,
}

impl BrowserHandle {
    pub fn new(bridge: Arc<dyn LiveBridge>) -> Self {
        Self { bridge }
    }

    /// The tree under one browser category, keyed by item name. Folders map
    /// to their subtree; leaves map to the item's properties and id.
    pub async fn resources(&self, kind: ResourceType) -> BridgeResult<Value> {
        let roots = expect_ids(self.bridge.get(&ObjectRef::Browser, kind.as_str()).await?, kind.as_str())?;
        Ok(Value::Object(self.collect_tree(roots).await?))
    }

    fn collect_tree(&self, ids: Vec<String>) -> BoxFuture<'_, BridgeResult<Map<String, Value>>> {
        async move {
            let mut tree = Map::new();
            for id in ids {
                let target = ObjectRef::BrowserItem(id.clone());
                let props = read_props(self.bridge.as_ref(), &target, BROWSER_ITEM_PROPS).await?;
                let name = props.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let is_folder = props.get("is_folder").map(|v| expect_bool(v, "is_folder")).transpose()?;
                let entry = if is_folder == Some(true) {
                    let children = expect_ids(self.bridge.get(&target, "children").await?, "children")?;
                    Value::Object(self.collect_tree(children).await?)
                } else {
                    with_id(&id, props)
                };
                tree.insert(name, entry);
            }
            Ok(tree)
        }
        .boxed()
    }

    /// Load a browser item. With a track id the track is selected first;
    /// otherwise Live picks the target. Returns the created device.
    pub async fn load_item(&self, item_id: &str, track_id: Option<&str>) -> BridgeResult<DeviceHandle> {
        if let Some(track_id) = track_id {
            SongHandle::new(self.bridge.clone()).select_track(track_id).await?;
        }
        let created = self
            .bridge
            .send_command(&ObjectRef::Browser, "load_item", vec![json!(item_id)])
            .await?;
        Ok(DeviceHandle::new(self.bridge.clone(), created_id(&created, "load_item")?))
    }
}
