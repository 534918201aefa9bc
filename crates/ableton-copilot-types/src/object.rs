//! Typed references into the Live object graph.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Which kind of Live object a reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Application,
    Song,
    Track,
    Clip,
    Device,
    Parameter,
    SongView,
    Browser,
    BrowserItem,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Application => "application",
            ObjectKind::Song => "song",
            ObjectKind::Track => "track",
            ObjectKind::Clip => "clip",
            ObjectKind::Device => "device",
            ObjectKind::Parameter => "parameter",
            ObjectKind::SongView => "song_view",
            ObjectKind::Browser => "browser",
            ObjectKind::BrowserItem => "browser_item",
        }
    }
}

/// Address of one object in the Live set.
///
/// Application, song, song view and browser are singletons; everything else
/// is addressed by the raw id Live assigns it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ObjectRef {
    Application,
    Song,
    Track(String),
    Clip(String),
    Device(String),
    Parameter(String),
    SongView,
    Browser,
    BrowserItem(String),
}

impl ObjectRef {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectRef::Application => ObjectKind::Application,
            ObjectRef::Song => ObjectKind::Song,
            ObjectRef::Track(_) => ObjectKind::Track,
            ObjectRef::Clip(_) => ObjectKind::Clip,
            ObjectRef::Device(_) => ObjectKind::Device,
            ObjectRef::Parameter(_) => ObjectKind::Parameter,
            ObjectRef::SongView => ObjectKind::SongView,
            ObjectRef::Browser => ObjectKind::Browser,
            ObjectRef::BrowserItem(_) => ObjectKind::BrowserItem,
        }
    }

    /// Raw id, or `None` for singletons.
    pub fn id(&self) -> Option<&str> {
        match self {
            ObjectRef::Application | ObjectRef::Song | ObjectRef::SongView | ObjectRef::Browser => None,
            ObjectRef::Track(id)
            | ObjectRef::Clip(id)
            | ObjectRef::Device(id)
            | ObjectRef::Parameter(id)
            | ObjectRef::BrowserItem(id) => Some(id),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.kind().as_str(), id),
            None => write!(f, "{}", self.kind().as_str()),
        }
    }
}

/// Kind of track to create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString, JsonSchema)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum TrackKind {
    #[default]
    Midi,
    Audio,
    Return,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Midi => "midi",
            TrackKind::Audio => "audio",
            TrackKind::Return => "return",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level browser category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceType {
    AudioEffects,
    Instruments,
    Plugins,
    Drums,
    Samples,
    MidiEffects,
    Sounds,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::AudioEffects,
        ResourceType::Instruments,
        ResourceType::Plugins,
        ResourceType::Drums,
        ResourceType::Samples,
        ResourceType::MidiEffects,
        ResourceType::Sounds,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::AudioEffects => "audio_effects",
            ResourceType::Instruments => "instruments",
            ResourceType::Plugins => "plugins",
            ResourceType::Drums => "drums",
            ResourceType::Samples => "samples",
            ResourceType::MidiEffects => "midi_effects",
            ResourceType::Sounds => "sounds",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Whether items of this category only load onto MIDI tracks.
    pub fn needs_midi_track(&self) -> bool {
        matches!(
            self,
            ResourceType::Instruments | ResourceType::Drums | ResourceType::Sounds | ResourceType::MidiEffects
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_id() {
        assert_eq!(ObjectRef::Clip("7".into()).to_string(), "clip:7");
        assert_eq!(ObjectRef::Song.to_string(), "song");
        assert_eq!(ObjectRef::SongView.to_string(), "song_view");
        assert_eq!(ObjectRef::BrowserItem("12".into()).to_string(), "browser_item:12");
    }

    #[test]
    fn test_resource_type_names_round_trip_through_serde_and_strum() {
        for kind in ResourceType::ALL {
            assert_eq!(ResourceType::from_str(kind.as_str()), Some(kind));
            assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(kind.as_str()));
        }
        assert_eq!(ResourceType::from_str("clips"), None);
        assert!(ResourceType::Instruments.needs_midi_track());
        assert!(!ResourceType::AudioEffects.needs_midi_track());
    }

    #[test]
    fn test_object_ref_json_shape() {
        let json = serde_json::to_value(ObjectRef::Track("3".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "track", "id": "3"}));
    }

    #[test]
    fn test_track_kind_parse() {
        assert_eq!(TrackKind::from_str("MIDI"), Some(TrackKind::Midi));
        assert_eq!(TrackKind::from_str("return"), Some(TrackKind::Return));
        assert_eq!(TrackKind::from_str("group"), None);
    }
}
