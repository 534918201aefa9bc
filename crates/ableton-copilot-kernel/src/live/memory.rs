//! In-process Live set.
//!
//! `MemoryLive` implements [`LiveBridge`] over plain maps: a song with its
//! transport, tracks, arrangement clips with notes, devices and parameters.
//! It also models the song view (selected track, detail clip) and a browser
//! tree. It mirrors the command signatures Live's remote script exposes,
//! including which note commands exist on which Live version, fans out
//! property changes to listeners, and can be told to drop the connection or
//! fail specific commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use ableton_copilot_types::{Note, NoteRange, ObjectKind, ObjectRef, ResourceType, TrackKind, sort_notes};

use super::accessors::EXTENDED_NOTES_MAJOR_VERSION;
use super::{BridgeError, BridgeResult, Listener, ListenerId, LiveBridge};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ValueKind {
    Number,
    Bool,
    Text,
    /// `record_mode` style: accepts bool or 0/1, stored as 0/1.
    Flag,
}

fn settable(kind: ObjectKind, property: &str) -> Option<ValueKind> {
    use ValueKind::*;
    match (kind, property) {
        (ObjectKind::Song, "tempo" | "current_song_time" | "signature_numerator" | "signature_denominator" | "root_note") => {
            Some(Number)
        }
        (ObjectKind::Song, "scale_name") => Some(Text),
        (ObjectKind::Song, "record_mode") => Some(Flag),
        (ObjectKind::Track, "name") => Some(Text),
        (ObjectKind::Track, "color") => Some(Number),
        (ObjectKind::Track, "mute" | "solo" | "arm") => Some(Bool),
        (ObjectKind::Clip, "name") => Some(Text),
        (ObjectKind::Clip, "color" | "loop_start" | "loop_end" | "start_marker" | "end_marker") => Some(Number),
        (ObjectKind::Clip, "looping" | "muted") => Some(Bool),
        (ObjectKind::Device, "is_active") => Some(Bool),
        (ObjectKind::Parameter, "value") => Some(Number),
        (ObjectKind::SongView, "selected_track" | "detail_clip") => Some(Text),
        _ => None,
    }
}

fn coerce(property: &str, kind: ValueKind, value: Value) -> BridgeResult<Value> {
    let invalid = |reason: &str| BridgeError::InvalidValue {
        property: property.to_string(),
        reason: reason.to_string(),
    };
    match kind {
        ValueKind::Number => match value.as_f64() {
            Some(n) if n.is_finite() => Ok(value),
            _ => Err(invalid("expected a number")),
        },
        ValueKind::Bool => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(invalid("expected a boolean")),
        },
        ValueKind::Text => match value {
            Value::String(_) => Ok(value),
            _ => Err(invalid("expected a string")),
        },
        ValueKind::Flag => match value {
            Value::Bool(b) => Ok(json!(u8::from(b))),
            Value::Number(ref n) if n.as_f64() == Some(0.0) || n.as_f64() == Some(1.0) => {
                Ok(json!(n.as_f64().map(|f| f as u8).unwrap_or(0)))
            }
            _ => Err(invalid("expected 0/1 or a boolean")),
        },
    }
}

fn arg_f64(args: &[Value], i: usize, command: &str) -> BridgeResult<f64> {
    args.get(i).and_then(Value::as_f64).ok_or_else(|| BridgeError::InvalidValue {
        property: format!("{command}[{i}]"),
        reason: "expected a number".into(),
    })
}

fn arg_i64(args: &[Value], i: usize, command: &str) -> BridgeResult<i64> {
    args.get(i).and_then(Value::as_i64).ok_or_else(|| BridgeError::InvalidValue {
        property: format!("{command}[{i}]"),
        reason: "expected an integer".into(),
    })
}

fn arg_str<'a>(args: &'a [Value], i: usize, command: &str) -> BridgeResult<&'a str> {
    args.get(i).and_then(Value::as_str).ok_or_else(|| BridgeError::InvalidValue {
        property: format!("{command}[{i}]"),
        reason: "expected a string".into(),
    })
}

fn number(map: &Map<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

struct TrackState {
    props: Map<String, Value>,
    clips: Vec<String>,
    devices: Vec<String>,
}

#[derive(Clone)]
struct ClipState {
    props: Map<String, Value>,
    notes: Vec<Note>,
}

struct DeviceState {
    props: Map<String, Value>,
    parameters: Vec<String>,
}

struct BrowserItemState {
    kind: ResourceType,
    props: Map<String, Value>,
    children: Vec<String>,
}

struct LiveSet {
    next_id: u64,
    application: Map<String, Value>,
    song: Map<String, Value>,
    tracks: Vec<String>,
    return_tracks: Vec<String>,
    track_states: HashMap<String, TrackState>,
    clips: HashMap<String, ClipState>,
    devices: HashMap<String, DeviceState>,
    parameters: HashMap<String, Map<String, Value>>,
    view: Map<String, Value>,
    browser: Map<String, Value>,
    browser_roots: HashMap<ResourceType, Vec<String>>,
    browser_items: HashMap<String, BrowserItemState>,
}

impl LiveSet {
    fn new(major: u64, minor: u64, bugfix: u64) -> Self {
        let application = json!({
            "major_version": major,
            "minor_version": minor,
            "bugfix_version": bugfix,
        });
        let song = json!({
            "name": "Untitled",
            "tempo": 120.0,
            "signature_numerator": 4,
            "signature_denominator": 4,
            "root_note": 0,
            "scale_name": "Major",
            "song_length": 0.0,
            "is_playing": false,
            "record_mode": 0,
            "current_song_time": 0.0,
        });
        Self {
            next_id: 1,
            application: application.as_object().cloned().unwrap_or_default(),
            song: song.as_object().cloned().unwrap_or_default(),
            tracks: Vec::new(),
            return_tracks: Vec::new(),
            track_states: HashMap::new(),
            clips: HashMap::new(),
            devices: HashMap::new(),
            parameters: HashMap::new(),
            view: json!({ "selected_track": null, "detail_clip": null })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            browser: Map::new(),
            browser_roots: HashMap::new(),
            browser_items: HashMap::new(),
        }
    }

    fn major_version(&self) -> u64 {
        self.application.get("major_version").and_then(Value::as_u64).unwrap_or(0)
    }

    fn alloc_id(&mut self) -> String {
        let id = self.next_id;
        self.next_id += 1;
        id.to_string()
    }

    fn props(&self, target: &ObjectRef) -> BridgeResult<&Map<String, Value>> {
        let missing = || BridgeError::NotFound(target.to_string());
        match target {
            ObjectRef::Application => Ok(&self.application),
            ObjectRef::Song => Ok(&self.song),
            ObjectRef::Track(id) => self.track_states.get(id).map(|t| &t.props).ok_or_else(missing),
            ObjectRef::Clip(id) => self.clips.get(id).map(|c| &c.props).ok_or_else(missing),
            ObjectRef::Device(id) => self.devices.get(id).map(|d| &d.props).ok_or_else(missing),
            ObjectRef::Parameter(id) => self.parameters.get(id).ok_or_else(missing),
            ObjectRef::SongView => Ok(&self.view),
            ObjectRef::Browser => Ok(&self.browser),
            ObjectRef::BrowserItem(id) => self.browser_items.get(id).map(|i| &i.props).ok_or_else(missing),
        }
    }

    fn props_mut(&mut self, target: &ObjectRef) -> BridgeResult<&mut Map<String, Value>> {
        let missing = || BridgeError::NotFound(target.to_string());
        match target {
            ObjectRef::Application => Ok(&mut self.application),
            ObjectRef::Song => Ok(&mut self.song),
            ObjectRef::Track(id) => self
                .track_states
                .get_mut(id)
                .map(|t| &mut t.props)
                .ok_or_else(missing),
            ObjectRef::Clip(id) => self.clips.get_mut(id).map(|c| &mut c.props).ok_or_else(missing),
            ObjectRef::Device(id) => self
                .devices
                .get_mut(id)
                .map(|d| &mut d.props)
                .ok_or_else(missing),
            ObjectRef::Parameter(id) => self.parameters.get_mut(id).ok_or_else(missing),
            ObjectRef::SongView => Ok(&mut self.view),
            ObjectRef::Browser => Ok(&mut self.browser),
            ObjectRef::BrowserItem(id) => self
                .browser_items
                .get_mut(id)
                .map(|i| &mut i.props)
                .ok_or_else(missing),
        }
    }

    fn insert_track(&mut self, kind: TrackKind, name: &str, index: i64) -> String {
        let id = self.alloc_id();
        let props = json!({
            "name": name,
            "color": 0,
            "mute": false,
            "solo": false,
            "arm": false,
            "has_midi_input": kind == TrackKind::Midi,
            "kind": kind.as_str(),
        });
        self.track_states.insert(
            id.clone(),
            TrackState {
                props: props.as_object().cloned().unwrap_or_default(),
                clips: Vec::new(),
                devices: Vec::new(),
            },
        );
        let list = if kind == TrackKind::Return {
            &mut self.return_tracks
        } else {
            &mut self.tracks
        };
        match usize::try_from(index) {
            Ok(i) if i <= list.len() => list.insert(i, id.clone()),
            _ => list.push(id.clone()),
        }
        id
    }

    fn insert_clip(&mut self, track_id: &str, time: f64, length: f64, is_midi: bool, notes: Vec<Note>) -> String {
        let id = self.alloc_id();
        let color = self
            .track_states
            .get(track_id)
            .and_then(|t| t.props.get("color").cloned())
            .unwrap_or(json!(0));
        let props = json!({
            "name": "",
            "color": color,
            "is_midi_clip": is_midi,
            "start_time": time,
            "end_time": time + length,
            "length": length,
            "looping": true,
            "loop_start": 0.0,
            "loop_end": length,
            "start_marker": 0.0,
            "end_marker": length,
            "muted": false,
        });
        self.clips.insert(
            id.clone(),
            ClipState {
                props: props.as_object().cloned().unwrap_or_default(),
                notes,
            },
        );
        if let Some(track) = self.track_states.get_mut(track_id) {
            track.clips.push(id.clone());
        }
        self.refresh_song_length();
        id
    }

    fn insert_device(
        &mut self,
        track_id: &str,
        name: &str,
        class_name: &str,
        device_type: &str,
        params: &[(&str, f64, f64, f64)],
    ) -> String {
        let id = self.alloc_id();
        let mut param_ids = Vec::with_capacity(params.len());
        for (pname, value, min, max) in params {
            let pid = self.alloc_id();
            let props = json!({
                "name": pname,
                "value": value,
                "min": min,
                "max": max,
                "is_enabled": true,
                "is_quantized": false,
            });
            self.parameters
                .insert(pid.clone(), props.as_object().cloned().unwrap_or_default());
            param_ids.push(pid);
        }
        let props = json!({
            "name": name,
            "class_name": class_name,
            "type": device_type,
            "is_active": true,
        });
        self.devices.insert(
            id.clone(),
            DeviceState {
                props: props.as_object().cloned().unwrap_or_default(),
                parameters: param_ids,
            },
        );
        if let Some(track) = self.track_states.get_mut(track_id) {
            track.devices.push(id.clone());
        }
        id
    }

    fn remove_track_tree(&mut self, id: &str) {
        if self.view.get("selected_track").and_then(Value::as_str) == Some(id) {
            self.view.insert("selected_track".into(), Value::Null);
        }
        if let Some(track) = self.track_states.remove(id) {
            for clip in track.clips {
                if self.view.get("detail_clip").and_then(Value::as_str) == Some(clip.as_str()) {
                    self.view.insert("detail_clip".into(), Value::Null);
                }
                self.clips.remove(&clip);
            }
            for device in track.devices {
                if let Some(dev) = self.devices.remove(&device) {
                    for p in dev.parameters {
                        self.parameters.remove(&p);
                    }
                }
            }
        }
        self.refresh_song_length();
    }

    fn refresh_song_length(&mut self) {
        let end = self
            .clips
            .values()
            .map(|c| number(&c.props, "end_time"))
            .fold(0.0_f64, f64::max);
        self.song.insert("song_length".into(), json!(end));
    }

    fn insert_browser_item(&mut self, kind: ResourceType, parent: Option<&str>, name: &str, is_folder: bool) -> BridgeResult<String> {
        if let Some(parent) = parent {
            match self.browser_items.get(parent) {
                Some(p) if p.props.get("is_folder") == Some(&Value::Bool(true)) => {}
                Some(_) => {
                    return Err(BridgeError::InvalidValue {
                        property: "parent".into(),
                        reason: format!("browser item {parent} is not a folder"),
                    });
                }
                None => return Err(BridgeError::NotFound(format!("browser_item:{parent}"))),
            }
        }
        let id = self.alloc_id();
        let props = json!({
            "name": name,
            "is_folder": is_folder,
            "is_loadable": !is_folder,
            "uri": format!("query:{}#{}", kind.as_str(), name.replace(' ', ":")),
        });
        self.browser_items.insert(
            id.clone(),
            BrowserItemState {
                kind,
                props: props.as_object().cloned().unwrap_or_default(),
                children: Vec::new(),
            },
        );
        match parent.and_then(|p| self.browser_items.get_mut(p)) {
            Some(p) => p.children.push(id.clone()),
            None => self.browser_roots.entry(kind).or_default().push(id.clone()),
        }
        Ok(id)
    }

    /// Track a browser item lands on: the selected track, or else the last
    /// track that can host it.
    fn load_target(&self, needs_midi: bool) -> Option<String> {
        if let Some(selected) = self.view.get("selected_track").and_then(Value::as_str) {
            if self.track_states.contains_key(selected) {
                return Some(selected.to_string());
            }
        }
        self.tracks
            .iter()
            .rev()
            .find(|id| !needs_midi || self.is_midi_track(id))
            .cloned()
    }

    fn is_midi_track(&self, id: &str) -> bool {
        self.track_states
            .get(id)
            .is_some_and(|t| t.props.get("has_midi_input") == Some(&Value::Bool(true)))
    }

    fn track_kind(&self, id: &str) -> Option<TrackKind> {
        self.track_states
            .get(id)
            .and_then(|t| t.props.get("kind"))
            .and_then(Value::as_str)
            .and_then(TrackKind::from_str)
    }

    fn input_routings(&self, id: &str) -> BridgeResult<Value> {
        let kind = self
            .track_kind(id)
            .ok_or_else(|| BridgeError::NotFound(format!("track:{id}")))?;
        let mut names: Vec<String> = match kind {
            TrackKind::Return => return Ok(json!([])),
            TrackKind::Midi => vec!["All Ins".into(), "Computer Keyboard".into()],
            TrackKind::Audio => vec!["Ext. In".into(), "Resampling".into()],
        };
        for other in self.tracks.iter().filter(|t| t.as_str() != id) {
            if kind == TrackKind::Midi && !self.is_midi_track(other) {
                continue;
            }
            if let Some(name) = self
                .track_states
                .get(other)
                .and_then(|t| t.props.get("name"))
                .and_then(Value::as_str)
            {
                names.push(name.to_string());
            }
        }
        names.push("No Input".into());
        Ok(Value::Array(
            names.into_iter().map(|n| json!({ "display_name": n })).collect(),
        ))
    }

    /// Song view properties may only point at objects that exist.
    fn check_view_target(&self, property: &str, value: &Value) -> BridgeResult<()> {
        let Some(id) = value.as_str() else {
            return Ok(());
        };
        let exists = match property {
            "selected_track" => self.track_states.contains_key(id),
            "detail_clip" => self.clips.contains_key(id),
            _ => true,
        };
        if exists {
            Ok(())
        } else {
            Err(BridgeError::NotFound(format!("{property} {id}")))
        }
    }

    fn midi_clip_mut(&mut self, id: &str) -> BridgeResult<&mut ClipState> {
        let clip = self
            .clips
            .get_mut(id)
            .ok_or_else(|| BridgeError::NotFound(format!("clip:{id}")))?;
        if clip.props.get("is_midi_clip") != Some(&Value::Bool(true)) {
            return Err(BridgeError::InvalidValue {
                property: "clip".into(),
                reason: format!("clip {id} is not a MIDI clip"),
            });
        }
        Ok(clip)
    }
}

struct Subscription {
    target: ObjectRef,
    property: String,
    tx: mpsc::UnboundedSender<Value>,
}

/// In-memory [`LiveBridge`].
pub struct MemoryLive {
    connected: AtomicBool,
    state: Mutex<LiveSet>,
    listeners: Mutex<HashMap<ListenerId, Subscription>>,
    next_listener: AtomicU64,
    faults: Mutex<HashMap<String, String>>,
    command_log: Mutex<Vec<String>>,
}

impl Default for MemoryLive {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLive {
    /// Empty set reporting Live 12.1.0.
    pub fn new() -> Self {
        Self::with_version(12, 1, 0)
    }

    pub fn with_version(major: u64, minor: u64, bugfix: u64) -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(LiveSet::new(major, minor, bugfix)),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            faults: Mutex::new(HashMap::new()),
            command_log: Mutex::new(Vec::new()),
        }
    }

    /// A small starting set: one MIDI track with an instrument and an empty
    /// four-bar clip, plus an audio track.
    pub fn demo() -> Self {
        let live = Self::new();
        let midi = live.add_track(TrackKind::Midi, "1-MIDI");
        live.add_track(TrackKind::Audio, "2-Audio");
        if let Ok(clip) = live.add_midi_clip(&midi, 0.0, 16.0, Vec::new()) {
            live.show_clip_in_detail(Some(clip.as_str()));
        }
        let _ = live.add_device(
            &midi,
            "Drift",
            "Drift",
            &[("Device On", 1.0, 0.0, 1.0), ("Filter Freq", 0.5, 0.0, 1.0), ("Volume", 0.85, 0.0, 1.0)],
        );

        for name in ["Drift", "Operator", "Wavetable"] {
            let _ = live.add_browser_item(ResourceType::Instruments, None, name, false);
        }
        if let Ok(dynamics) = live.add_browser_item(ResourceType::AudioEffects, None, "Dynamics", true) {
            for name in ["Compressor", "Glue Compressor", "Limiter"] {
                let _ = live.add_browser_item(ResourceType::AudioEffects, Some(dynamics.as_str()), name, false);
            }
        }
        let _ = live.add_browser_item(ResourceType::AudioEffects, None, "Reverb", false);
        for name in ["Arpeggiator", "Chord", "Scale"] {
            let _ = live.add_browser_item(ResourceType::MidiEffects, None, name, false);
        }
        let _ = live.add_browser_item(ResourceType::Drums, None, "Drum Rack", false);
        live
    }

    // ========================================================================
    // Test / setup helpers
    // ========================================================================

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn add_track(&self, kind: TrackKind, name: &str) -> String {
        self.state.lock().insert_track(kind, name, -1)
    }

    pub fn add_midi_clip(&self, track_id: &str, time: f64, length: f64, notes: Vec<Note>) -> BridgeResult<String> {
        let mut state = self.state.lock();
        if !state.track_states.contains_key(track_id) {
            return Err(BridgeError::NotFound(format!("track:{track_id}")));
        }
        Ok(state.insert_clip(track_id, time, length, true, notes))
    }

    /// Add a device with `(name, value, min, max)` parameters.
    pub fn add_device(
        &self,
        track_id: &str,
        name: &str,
        class_name: &str,
        params: &[(&str, f64, f64, f64)],
    ) -> BridgeResult<String> {
        let mut state = self.state.lock();
        if !state.track_states.contains_key(track_id) {
            return Err(BridgeError::NotFound(format!("track:{track_id}")));
        }
        Ok(state.insert_device(track_id, name, class_name, "instrument", params))
    }

    /// Add a browser entry under `parent`, or at the top of its category.
    pub fn add_browser_item(
        &self,
        kind: ResourceType,
        parent: Option<&str>,
        name: &str,
        is_folder: bool,
    ) -> BridgeResult<String> {
        self.state.lock().insert_browser_item(kind, parent, name, is_folder)
    }

    /// Open a clip in the detail view, or close it with `None`.
    pub fn show_clip_in_detail(&self, clip_id: Option<&str>) {
        self.state
            .lock()
            .view
            .insert("detail_clip".into(), clip_id.map_or(Value::Null, |id| json!(id)));
    }

    pub fn track_device_ids(&self, track_id: &str) -> Vec<String> {
        self.state
            .lock()
            .track_states
            .get(track_id)
            .map(|t| t.devices.clone())
            .unwrap_or_default()
    }

    pub fn set_parameter_enabled(&self, parameter_id: &str, enabled: bool) {
        if let Some(p) = self.state.lock().parameters.get_mut(parameter_id) {
            p.insert("is_enabled".into(), json!(enabled));
        }
    }

    pub fn device_parameter_ids(&self, device_id: &str) -> Vec<String> {
        self.state
            .lock()
            .devices
            .get(device_id)
            .map(|d| d.parameters.clone())
            .unwrap_or_default()
    }

    /// Current notes of a clip, sorted by time then pitch.
    pub fn clip_notes(&self, clip_id: &str) -> Option<Vec<Note>> {
        let state = self.state.lock();
        let mut notes = state.clips.get(clip_id)?.notes.clone();
        sort_notes(&mut notes);
        Some(notes)
    }

    /// Make every later call of `command` fail with `message`.
    pub fn fail_command(&self, command: &str, message: &str) {
        self.faults.lock().insert(command.to_string(), message.to_string());
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// `target.command` strings, in call order.
    pub fn command_log(&self) -> Vec<String> {
        self.command_log.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Move the playhead forward and notify `current_song_time` listeners.
    pub fn advance_song_time(&self, beats: f64) {
        let now = {
            let mut state = self.state.lock();
            let now = number(&state.song, "current_song_time") + beats;
            state.song.insert("current_song_time".into(), json!(now));
            now
        };
        self.notify(&ObjectRef::Song, "current_song_time", json!(now));
    }

    /// Advance the playhead at the song tempo while playing. The task ends
    /// once the set is dropped.
    pub fn spawn_transport(self: &Arc<Self>, tick: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let Some(live) = weak.upgrade() else { break };
                let (playing, tempo) = {
                    let state = live.state.lock();
                    (
                        state.song.get("is_playing") == Some(&Value::Bool(true)),
                        number(&state.song, "tempo"),
                    )
                };
                if playing {
                    live.advance_song_time(tempo / 60.0 * tick.as_secs_f64());
                }
            }
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_connected(&self) -> BridgeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::Disconnected)
        }
    }

    fn notify(&self, target: &ObjectRef, property: &str, value: Value) {
        let listeners = self.listeners.lock();
        for sub in listeners.values() {
            if &sub.target == target && sub.property == property {
                let _ = sub.tx.send(value.clone());
            }
        }
    }

    fn set_song_flag(&self, property: &str, value: Value) {
        self.state.lock().song.insert(property.to_string(), value.clone());
        self.notify(&ObjectRef::Song, property, value);
    }

    fn song_command(&self, command: &str, args: &[Value]) -> BridgeResult<Value> {
        match command {
            "create_midi_track" | "create_audio_track" => {
                let index = arg_i64(args, 0, command)?;
                let kind = if command == "create_midi_track" {
                    TrackKind::Midi
                } else {
                    TrackKind::Audio
                };
                let mut state = self.state.lock();
                let n = state.tracks.len() + 1;
                let name = format!("{}-{}", n, if kind == TrackKind::Midi { "MIDI" } else { "Audio" });
                let id = state.insert_track(kind, &name, index);
                Ok(json!({ "id": id }))
            }
            "create_return_track" => {
                let mut state = self.state.lock();
                let letter = char::from(b'A' + (state.return_tracks.len() % 26) as u8);
                let id = state.insert_track(TrackKind::Return, &format!("{letter}-Return"), -1);
                Ok(json!({ "id": id }))
            }
            "delete_track" => {
                let index = arg_i64(args, 0, command)?;
                let mut state = self.state.lock();
                let i = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < state.tracks.len())
                    .ok_or_else(|| BridgeError::NotFound(format!("track index {index}")))?;
                let id = state.tracks.remove(i);
                state.remove_track_tree(&id);
                Ok(Value::Null)
            }
            "duplicate_track" => {
                let index = arg_i64(args, 0, command)?;
                let mut state = self.state.lock();
                let i = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < state.tracks.len())
                    .ok_or_else(|| BridgeError::NotFound(format!("track index {index}")))?;
                let source_id = state.tracks[i].clone();
                let (props, clip_ids, device_ids) = match state.track_states.get(&source_id) {
                    Some(t) => (t.props.clone(), t.clips.clone(), t.devices.clone()),
                    None => return Err(BridgeError::NotFound(format!("track:{source_id}"))),
                };
                let kind = props
                    .get("kind")
                    .and_then(Value::as_str)
                    .and_then(TrackKind::from_str)
                    .unwrap_or_default();
                let name = props.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let new_id = state.insert_track(kind, &name, index + 1);
                if let Some(t) = state.track_states.get_mut(&new_id) {
                    t.props = props;
                }
                for clip_id in clip_ids {
                    if let Some(clip) = state.clips.get(&clip_id).cloned() {
                        let new_clip = state.alloc_id();
                        state.clips.insert(new_clip.clone(), clip);
                        if let Some(t) = state.track_states.get_mut(&new_id) {
                            t.clips.push(new_clip);
                        }
                    }
                }
                for device_id in device_ids {
                    let copied = state.devices.get(&device_id).map(|d| {
                        let params: Vec<(String, f64, f64, f64)> = d
                            .parameters
                            .iter()
                            .filter_map(|p| state.parameters.get(p))
                            .map(|p| {
                                (
                                    p.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                                    number(p, "value"),
                                    number(p, "min"),
                                    number(p, "max"),
                                )
                            })
                            .collect();
                        (d.props.clone(), params)
                    });
                    if let Some((dprops, params)) = copied {
                        let name = dprops.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                        let class = dprops
                            .get("class_name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let device_type = dprops
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("instrument")
                            .to_string();
                        let borrowed: Vec<(&str, f64, f64, f64)> =
                            params.iter().map(|(n, v, lo, hi)| (n.as_str(), *v, *lo, *hi)).collect();
                        state.insert_device(&new_id, &name, &class, &device_type, &borrowed);
                    }
                }
                Ok(json!({ "id": new_id }))
            }
            "start_playing" => {
                self.set_song_flag("is_playing", json!(true));
                Ok(Value::Null)
            }
            "stop_playing" => {
                self.set_song_flag("is_playing", json!(false));
                Ok(Value::Null)
            }
            _ => Err(BridgeError::UnknownCommand {
                object: "song".into(),
                command: command.into(),
            }),
        }
    }

    fn track_command(&self, id: &str, command: &str, args: &[Value]) -> BridgeResult<Value> {
        let mut state = self.state.lock();
        let is_midi = state
            .track_states
            .get(id)
            .ok_or_else(|| BridgeError::NotFound(format!("track:{id}")))?
            .props
            .get("has_midi_input")
            == Some(&Value::Bool(true));
        match command {
            "create_midi_clip" => {
                let time = arg_f64(args, 0, command)?;
                let length = arg_f64(args, 1, command)?;
                if !is_midi {
                    return Err(BridgeError::InvalidValue {
                        property: "track".into(),
                        reason: format!("track {id} is not a MIDI track"),
                    });
                }
                if time < 0.0 || length <= 0.0 {
                    return Err(BridgeError::InvalidValue {
                        property: "length".into(),
                        reason: "time must be >= 0 and length > 0".into(),
                    });
                }
                let clip = state.insert_clip(id, time, length, true, Vec::new());
                Ok(json!({ "id": clip }))
            }
            "duplicate_clip_to_arrangement" => {
                let clip_id = arg_str(args, 0, command)?;
                let time = arg_f64(args, 1, command)?;
                let source = state
                    .clips
                    .get(clip_id)
                    .cloned()
                    .ok_or_else(|| BridgeError::NotFound(format!("clip:{clip_id}")))?;
                let source_midi = source.props.get("is_midi_clip") == Some(&Value::Bool(true));
                if source_midi != is_midi {
                    return Err(BridgeError::InvalidValue {
                        property: "track".into(),
                        reason: format!("clip {clip_id} and track {id} have different types"),
                    });
                }
                let length = number(&source.props, "length");
                let new_id = state.insert_clip(id, time, length, source_midi, source.notes.clone());
                if let Some(clip) = state.clips.get_mut(&new_id) {
                    for key in ["name", "color", "looping", "loop_start", "loop_end", "start_marker", "end_marker"] {
                        if let Some(v) = source.props.get(key) {
                            clip.props.insert(key.to_string(), v.clone());
                        }
                    }
                }
                Ok(json!({ "id": new_id }))
            }
            _ => Err(BridgeError::UnknownCommand {
                object: format!("track:{id}"),
                command: command.into(),
            }),
        }
    }

    fn clip_command(&self, id: &str, command: &str, args: &[Value]) -> BridgeResult<Value> {
        let mut state = self.state.lock();
        let legacy_host = state.major_version() < EXTENDED_NOTES_MAJOR_VERSION;
        let clip = state.midi_clip_mut(id)?;
        let unknown = || BridgeError::UnknownCommand {
            object: format!("clip:{id}"),
            command: command.into(),
        };
        match command {
            "get_notes_extended" | "remove_notes_extended" if legacy_host => Err(unknown()),
            "get_notes" => {
                // Legacy argument order: time first, then pitch.
                let range = NoteRange::new(
                    arg_i64(args, 1, command)? as i32,
                    arg_i64(args, 3, command)? as i32,
                    arg_f64(args, 0, command)?,
                    arg_f64(args, 2, command)?,
                );
                let mut notes: Vec<Note> = clip.notes.iter().copied().filter(|n| range.contains(n)).collect();
                sort_notes(&mut notes);
                serde_json::to_value(notes).map_err(|e| BridgeError::Failed(e.to_string()))
            }
            "get_notes_extended" => {
                let range = NoteRange::new(
                    arg_i64(args, 0, command)? as i32,
                    arg_i64(args, 1, command)? as i32,
                    arg_f64(args, 2, command)?,
                    arg_f64(args, 3, command)?,
                );
                let mut notes: Vec<Note> = clip.notes.iter().copied().filter(|n| range.contains(n)).collect();
                sort_notes(&mut notes);
                serde_json::to_value(notes).map_err(|e| BridgeError::Failed(e.to_string()))
            }
            "remove_notes_extended" => {
                let range = NoteRange::new(
                    arg_i64(args, 0, command)? as i32,
                    arg_i64(args, 1, command)? as i32,
                    arg_f64(args, 2, command)?,
                    arg_f64(args, 3, command)?,
                );
                clip.notes.retain(|n| !range.contains(n));
                Ok(Value::Null)
            }
            "remove_notes" => {
                // Legacy argument order: time first, then pitch.
                let range = NoteRange::new(
                    arg_i64(args, 1, command)? as i32,
                    arg_i64(args, 3, command)? as i32,
                    arg_f64(args, 0, command)?,
                    arg_f64(args, 2, command)?,
                );
                clip.notes.retain(|n| !range.contains(n));
                Ok(Value::Null)
            }
            "set_notes" => {
                let notes: Vec<Note> = args
                    .first()
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| BridgeError::InvalidValue {
                        property: "notes".into(),
                        reason: e.to_string(),
                    })?
                    .unwrap_or_default();
                for note in &notes {
                    note.validate().map_err(|e| BridgeError::InvalidValue {
                        property: "notes".into(),
                        reason: e.to_string(),
                    })?;
                }
                clip.notes.extend(notes);
                Ok(Value::Null)
            }
            _ => Err(unknown()),
        }
    }

    fn browser_command(&self, command: &str, args: &[Value]) -> BridgeResult<Value> {
        match command {
            "load_item" => {
                let item_id = arg_str(args, 0, command)?;
                let mut state = self.state.lock();
                let item = state
                    .browser_items
                    .get(item_id)
                    .ok_or_else(|| BridgeError::NotFound(format!("browser_item:{item_id}")))?;
                let kind = item.kind;
                let name = item.props.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                if item.props.get("is_loadable") != Some(&Value::Bool(true)) {
                    return Err(BridgeError::InvalidValue {
                        property: "item".into(),
                        reason: format!("{name} is not loadable"),
                    });
                }
                let needs_midi = kind.needs_midi_track();
                let track_id = state
                    .load_target(needs_midi)
                    .ok_or_else(|| BridgeError::Failed(format!("no track can host {name}")))?;
                if needs_midi && !state.is_midi_track(&track_id) {
                    return Err(BridgeError::InvalidValue {
                        property: "track".into(),
                        reason: format!("{name} needs a MIDI track, track {track_id} is not one"),
                    });
                }
                let (class_name, device_type) = match kind {
                    ResourceType::AudioEffects => (name.clone(), "audio_effect"),
                    ResourceType::MidiEffects => (name.clone(), "midi_effect"),
                    ResourceType::Plugins => ("PluginDevice".to_string(), "instrument"),
                    ResourceType::Samples => ("OriginalSimpler".to_string(), "instrument"),
                    ResourceType::Drums => ("DrumGroupDevice".to_string(), "instrument"),
                    ResourceType::Instruments | ResourceType::Sounds => (name.clone(), "instrument"),
                };
                let device = state.insert_device(
                    &track_id,
                    &name,
                    &class_name,
                    device_type,
                    &[("Device On", 1.0, 0.0, 1.0)],
                );
                Ok(json!({ "id": device }))
            }
            _ => Err(BridgeError::UnknownCommand {
                object: "browser".into(),
                command: command.into(),
            }),
        }
    }
}

#[async_trait]
impl LiveBridge for MemoryLive {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get(&self, target: &ObjectRef, property: &str) -> BridgeResult<Value> {
        self.ensure_connected()?;
        let state = self.state.lock();
        let computed = match (target, property) {
            (ObjectRef::Song, "tracks") => Some(json!(state.tracks)),
            (ObjectRef::Song, "return_tracks") => Some(json!(state.return_tracks)),
            (ObjectRef::Track(id), "arrangement_clips") => {
                let track = state
                    .track_states
                    .get(id)
                    .ok_or_else(|| BridgeError::NotFound(target.to_string()))?;
                Some(json!(track.clips))
            }
            (ObjectRef::Track(id), "devices") => {
                let track = state
                    .track_states
                    .get(id)
                    .ok_or_else(|| BridgeError::NotFound(target.to_string()))?;
                Some(json!(track.devices))
            }
            (ObjectRef::Track(id), "available_input_routing_types") => Some(state.input_routings(id)?),
            (ObjectRef::Browser, category) => {
                let kind = ResourceType::from_str(category)
                    .ok_or_else(|| BridgeError::Failed(format!("browser has no property '{category}'")))?;
                Some(json!(state.browser_roots.get(&kind).cloned().unwrap_or_default()))
            }
            (ObjectRef::BrowserItem(id), "children") => {
                let item = state
                    .browser_items
                    .get(id)
                    .ok_or_else(|| BridgeError::NotFound(target.to_string()))?;
                Some(json!(item.children))
            }
            (ObjectRef::Device(id), "parameters") => {
                let device = state
                    .devices
                    .get(id)
                    .ok_or_else(|| BridgeError::NotFound(target.to_string()))?;
                Some(json!(device.parameters))
            }
            _ => None,
        };
        if let Some(value) = computed {
            return Ok(value);
        }
        state
            .props(target)?
            .get(property)
            .cloned()
            .ok_or_else(|| BridgeError::Failed(format!("{target} has no property '{property}'")))
    }

    async fn set(&self, target: &ObjectRef, property: &str, value: Value) -> BridgeResult<()> {
        self.ensure_connected()?;
        let stored = {
            let mut state = self.state.lock();
            if *target == ObjectRef::SongView {
                state.check_view_target(property, &value)?;
            }
            let props = state.props_mut(target)?;
            let Some(kind) = settable(target.kind(), property) else {
                return Err(if props.contains_key(property) {
                    BridgeError::ReadOnly {
                        object: target.to_string(),
                        property: property.to_string(),
                    }
                } else {
                    BridgeError::Failed(format!("{target} has no property '{property}'"))
                });
            };
            let value = coerce(property, kind, value)?;
            if let ObjectRef::Parameter(_) = target {
                let v = value.as_f64().unwrap_or(0.0);
                let (min, max) = (number(props, "min"), number(props, "max"));
                if v < min || v > max {
                    return Err(BridgeError::InvalidValue {
                        property: property.to_string(),
                        reason: format!("{v} is outside [{min}, {max}]"),
                    });
                }
            }
            props.insert(property.to_string(), value.clone());
            value
        };
        self.notify(target, property, stored);
        Ok(())
    }

    async fn send_command(&self, target: &ObjectRef, command: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.ensure_connected()?;
        self.command_log.lock().push(format!("{target}.{command}"));
        if let Some(message) = self.faults.lock().get(command).cloned() {
            return Err(BridgeError::Failed(message));
        }
        match target {
            ObjectRef::Song => self.song_command(command, &args),
            ObjectRef::Track(id) => self.track_command(id, command, &args),
            ObjectRef::Clip(id) => self.clip_command(id, command, &args),
            ObjectRef::Browser => self.browser_command(command, &args),
            other => Err(BridgeError::UnknownCommand {
                object: other.to_string(),
                command: command.into(),
            }),
        }
    }

    async fn add_listener(&self, target: &ObjectRef, property: &str) -> BridgeResult<Listener> {
        self.ensure_connected()?;
        self.state.lock().props(target)?;
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let (tx, events) = mpsc::unbounded_channel();
        self.listeners.lock().insert(
            id,
            Subscription {
                target: target.clone(),
                property: property.to_string(),
                tx,
            },
        );
        Ok(Listener { id, events })
    }

    async fn remove_listener(&self, id: ListenerId) -> BridgeResult<bool> {
        self.ensure_connected()?;
        Ok(self.listeners.lock().remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::{ApplicationHandle, BrowserHandle, ClipHandle, ParameterHandle, SongHandle, TrackHandle};

    fn note(pitch: i32, time: f64) -> Note {
        Note::new(pitch, time, 1.0, 100.0)
    }

    fn live_with_clip(notes: Vec<Note>) -> (Arc<MemoryLive>, String) {
        let live = Arc::new(MemoryLive::new());
        let track = live.add_track(TrackKind::Midi, "Keys");
        let clip = live.add_midi_clip(&track, 0.0, 8.0, notes).unwrap();
        (live, clip)
    }

    #[tokio::test]
    async fn test_disconnected_calls_fail() {
        let live = MemoryLive::new();
        live.set_connected(false);
        assert!(!live.is_connected().await);
        let err = live.get(&ObjectRef::Song, "tempo").await.unwrap_err();
        assert_eq!(err, BridgeError::Disconnected);
    }

    #[tokio::test]
    async fn test_notes_query_and_remove() {
        let (live, clip_id) = live_with_clip(vec![note(60, 0.0), note(64, 1.0), note(67, 2.0)]);
        let clip = ClipHandle::new(live.clone(), clip_id.clone());

        let window = clip.get_notes(NoteRange::new(60, 5, 0.0, 4.0)).await.unwrap();
        assert_eq!(window.len(), 2);

        clip.remove_notes(NoteRange::new(64, 1, 0.0, 4.0)).await.unwrap();
        let left: Vec<i32> = live.clip_notes(&clip_id).unwrap().iter().map(|n| n.pitch).collect();
        assert_eq!(left, vec![60, 67]);
        assert!(live.command_log().iter().any(|c| c.ends_with("remove_notes_extended")));
    }

    #[tokio::test]
    async fn test_live_10_uses_legacy_remove() {
        let live = Arc::new(MemoryLive::with_version(10, 1, 30));
        let track = live.add_track(TrackKind::Midi, "Keys");
        let clip_id = live.add_midi_clip(&track, 0.0, 4.0, vec![note(60, 0.0), note(72, 0.0)]).unwrap();
        let clip = ClipHandle::new(live.clone(), clip_id.clone());

        clip.remove_notes(NoteRange::new(72, 1, 0.0, 4.0)).await.unwrap();
        assert_eq!(live.clip_notes(&clip_id).unwrap(), vec![note(60, 0.0)]);
        let log = live.command_log();
        assert!(log.iter().any(|c| c.ends_with(".remove_notes")));
        assert!(!log.iter().any(|c| c.ends_with("remove_notes_extended")));
    }

    #[tokio::test]
    async fn test_live_10_reads_notes_with_legacy_command() {
        let live = Arc::new(MemoryLive::with_version(10, 1, 30));
        let track = live.add_track(TrackKind::Midi, "Keys");
        let clip_id = live.add_midi_clip(&track, 0.0, 4.0, vec![note(72, 1.0), note(60, 0.0)]).unwrap();
        let clip = ClipHandle::new(live.clone(), clip_id.clone());

        let notes = clip.get_all_notes().await.unwrap();
        assert_eq!(notes, vec![note(60, 0.0), note(72, 1.0)]);
        let window = clip.get_notes(NoteRange::new(70, 5, 0.0, 4.0)).await.unwrap();
        assert_eq!(window, vec![note(72, 1.0)]);

        let log = live.command_log();
        assert!(log.iter().all(|c| !c.ends_with("_extended")), "{log:?}");
        assert!(log.iter().any(|c| c.ends_with(".get_notes")));
    }

    #[tokio::test]
    async fn test_live_10_rejects_extended_note_commands() {
        let live = Arc::new(MemoryLive::with_version(10, 1, 30));
        let track = live.add_track(TrackKind::Midi, "Keys");
        let clip_id = live.add_midi_clip(&track, 0.0, 4.0, vec![]).unwrap();
        let target = ObjectRef::Clip(clip_id);
        let args = vec![json!(0), json!(128), json!(0.0), json!(4.0)];

        for command in ["get_notes_extended", "remove_notes_extended"] {
            let err = live.send_command(&target, command, args.clone()).await.unwrap_err();
            assert!(matches!(err, BridgeError::UnknownCommand { .. }), "{command}: {err:?}");
        }
    }

    #[tokio::test]
    async fn test_set_notes_rejects_invalid_pitch() {
        let (live, clip_id) = live_with_clip(vec![]);
        let clip = ClipHandle::new(live.clone(), clip_id);
        let err = clip.set_notes(&[note(130, 0.0)]).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (live, clip_id) = live_with_clip(vec![]);
        live.fail_command("set_notes", "remote script crashed");
        let clip = ClipHandle::new(live.clone(), clip_id);
        let err = clip.set_notes(&[note(60, 0.0)]).await.unwrap_err();
        assert_eq!(err, BridgeError::Failed("remote script crashed".into()));
        live.clear_faults();
        clip.set_notes(&[note(60, 0.0)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_property() {
        let live = MemoryLive::new();
        let err = live.set(&ObjectRef::Song, "song_length", json!(3.0)).await.unwrap_err();
        assert!(matches!(err, BridgeError::ReadOnly { .. }));
    }

    #[tokio::test]
    async fn test_parameter_range_enforced() {
        let live = Arc::new(MemoryLive::new());
        let track = live.add_track(TrackKind::Midi, "Synth");
        let device = live.add_device(&track, "Drift", "Drift", &[("Cutoff", 0.5, 0.0, 1.0)]).unwrap();
        let pid = live.device_parameter_ids(&device).remove(0);
        let param = ParameterHandle::new(live.clone(), pid);
        assert!(param.set_value(2.0).await.is_err());
        param.set_value(0.75).await.unwrap();
        assert_eq!(param.state().await.unwrap().value, 0.75);
    }

    #[tokio::test]
    async fn test_song_track_lifecycle() {
        let live = Arc::new(MemoryLive::new());
        let song = SongHandle::new(live.clone());
        let a = song.create_track(TrackKind::Midi, -1).await.unwrap();
        song.create_track(TrackKind::Audio, 0).await.unwrap();
        song.create_track(TrackKind::Return, -1).await.unwrap();

        let tracks = song.tracks().await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].id(), a.id());
        assert_eq!(song.return_tracks().await.unwrap().len(), 1);

        let copy = song.duplicate_track(1).await.unwrap();
        assert_eq!(song.tracks().await.unwrap()[2].id(), copy.id());

        song.delete_track(0).await.unwrap();
        assert_eq!(song.tracks().await.unwrap().len(), 2);
        assert!(song.delete_track(9).await.is_err());
    }

    #[tokio::test]
    async fn test_listener_receives_changes_until_removed() {
        let live = MemoryLive::new();
        let mut listener = live.add_listener(&ObjectRef::Song, "record_mode").await.unwrap();
        live.set(&ObjectRef::Song, "record_mode", json!(true)).await.unwrap();
        assert_eq!(listener.events.recv().await, Some(json!(1)));

        assert!(live.remove_listener(listener.id).await.unwrap());
        assert!(listener.events.recv().await.is_none());
        assert!(!live.remove_listener(listener.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_application_version() {
        let live = Arc::new(MemoryLive::with_version(11, 3, 2));
        let version = ApplicationHandle::new(live).version().await.unwrap();
        assert_eq!(version.to_string(), "11.3.2");
    }

    #[tokio::test]
    async fn test_detail_clip_follows_view() {
        let (live, clip_id) = live_with_clip(vec![]);
        let song = SongHandle::new(live.clone());

        let err = song.detail_clip().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));

        live.show_clip_in_detail(Some(clip_id.as_str()));
        assert_eq!(song.detail_clip().await.unwrap().id(), clip_id);

        let err = live.set(&ObjectRef::SongView, "detail_clip", json!("999")).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));

        song.delete_track(0).await.unwrap();
        assert!(song.detail_clip().await.is_err());
    }

    #[tokio::test]
    async fn test_browser_tree_and_load() {
        let live = Arc::new(MemoryLive::new());
        let keys = live.add_track(TrackKind::Midi, "Keys");
        let bus = live.add_track(TrackKind::Audio, "Bus");
        let folder = live.add_browser_item(ResourceType::AudioEffects, None, "Dynamics", true).unwrap();
        let comp = live
            .add_browser_item(ResourceType::AudioEffects, Some(folder.as_str()), "Compressor", false)
            .unwrap();
        let synth = live.add_browser_item(ResourceType::Instruments, None, "Operator", false).unwrap();
        let browser = BrowserHandle::new(live.clone());

        let tree = browser.resources(ResourceType::AudioEffects).await.unwrap();
        assert_eq!(tree["Dynamics"]["Compressor"]["id"], json!(comp));
        assert_eq!(tree["Dynamics"]["Compressor"]["is_loadable"], json!(true));
        assert_eq!(browser.resources(ResourceType::Sounds).await.unwrap(), json!({}));

        // No selection: instruments go to the last MIDI track, effects to the last track.
        browser.load_item(&synth, None).await.unwrap();
        assert_eq!(live.track_device_ids(&keys).len(), 1);
        browser.load_item(&comp, None).await.unwrap();
        assert_eq!(live.track_device_ids(&bus).len(), 1);

        let err = browser.load_item(&synth, Some(bus.as_str())).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidValue { .. }));
        let err = browser.load_item(&folder, None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidValue { .. }));

        let device = browser.load_item(&comp, Some(keys.as_str())).await.unwrap();
        assert_eq!(device.info().await.unwrap()["type"], json!("audio_effect"));
        assert_eq!(live.track_device_ids(&keys).len(), 2);
    }

    #[tokio::test]
    async fn test_input_routings_by_track_kind() {
        let live = Arc::new(MemoryLive::new());
        let keys = live.add_track(TrackKind::Midi, "Keys");
        live.add_track(TrackKind::Midi, "Bass");
        let vox = live.add_track(TrackKind::Audio, "Vox");

        let midi = TrackHandle::new(live.clone(), keys).available_input_routings().await.unwrap();
        assert_eq!(midi, vec!["All Ins", "Computer Keyboard", "Bass", "No Input"]);

        let audio = TrackHandle::new(live.clone(), vox).available_input_routings().await.unwrap();
        assert_eq!(audio, vec!["Ext. In", "Resampling", "Keys", "Bass", "No Input"]);

        let err = TrackHandle::new(live, "404").available_input_routings().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_advances_while_playing() {
        let live = Arc::new(MemoryLive::new());
        let song = SongHandle::new(live.clone());
        let _clock = live.spawn_transport(Duration::from_millis(100));
        song.start_playing().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1050)).await;
        // 120 bpm is two beats per second.
        let t = song.current_song_time().await.unwrap();
        assert!((1.6..=2.6).contains(&t), "song time was {t}");
    }
}
