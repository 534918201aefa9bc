//! MIDI notes and note-range queries.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pitch span covering every MIDI pitch (0..=127).
pub const FULL_PITCH_SPAN: i32 = 128;

/// Time span (in beats) treated as "the whole clip".
pub const FULL_TIME_SPAN: f64 = 1.0e9;

/// A single MIDI note in a clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Note {
    /// MIDI pitch, 0-127
    #[schemars(description = "MIDI pitch, 0-127 (60 = middle C)")]
    pub pitch: i32,
    /// Start position in beats
    #[schemars(description = "Start time in beats from the clip start")]
    pub time: f64,
    /// Length in beats
    #[schemars(description = "Duration in beats")]
    pub duration: f64,
    /// Velocity, 0-127
    #[schemars(description = "Velocity, 0-127")]
    #[serde(default = "default_velocity")]
    pub velocity: f64,
    #[schemars(description = "Whether the note is muted")]
    #[serde(default)]
    pub muted: bool,
}

fn default_velocity() -> f64 {
    100.0
}

/// Reasons a note is rejected before it reaches Live.
#[derive(Debug, Error, PartialEq)]
pub enum NoteError {
    #[error("pitch {0} is out of range (0-127)")]
    PitchOutOfRange(i32),

    #[error("velocity {0} is out of range (0-127)")]
    VelocityOutOfRange(f64),

    #[error("note time {0} must be a non-negative number")]
    InvalidTime(f64),

    #[error("note duration {0} must be greater than zero")]
    InvalidDuration(f64),
}

impl Note {
    pub fn new(pitch: i32, time: f64, duration: f64, velocity: f64) -> Self {
        Self {
            pitch,
            time,
            duration,
            velocity,
            muted: false,
        }
    }

    /// Check the note against the ranges Live accepts.
    pub fn validate(&self) -> Result<(), NoteError> {
        if !(0..=127).contains(&self.pitch) {
            return Err(NoteError::PitchOutOfRange(self.pitch));
        }
        if !self.velocity.is_finite() || !(0.0..=127.0).contains(&self.velocity) {
            return Err(NoteError::VelocityOutOfRange(self.velocity));
        }
        if !self.time.is_finite() || self.time < 0.0 {
            return Err(NoteError::InvalidTime(self.time));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(NoteError::InvalidDuration(self.duration));
        }
        Ok(())
    }

    /// Validate a batch, reporting the first offending index.
    pub fn validate_all(notes: &[Note]) -> Result<(), (usize, NoteError)> {
        for (i, note) in notes.iter().enumerate() {
            note.validate().map_err(|e| (i, e))?;
        }
        Ok(())
    }
}

/// Sort notes by start time, then pitch, so two note sets compare by value.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.pitch.cmp(&b.pitch)));
}

/// A pitch/time window over a clip's notes.
///
/// A note belongs to the range when its pitch lies in
/// `[from_pitch, from_pitch + pitch_span)` and its start time lies in
/// `[from_time, from_time + time_span)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteRange {
    pub from_pitch: i32,
    pub pitch_span: i32,
    pub from_time: f64,
    pub time_span: f64,
}

impl NoteRange {
    pub fn new(from_pitch: i32, pitch_span: i32, from_time: f64, time_span: f64) -> Self {
        Self {
            from_pitch,
            pitch_span,
            from_time,
            time_span,
        }
    }

    /// Every note in the clip, whatever its pitch or position.
    pub fn all() -> Self {
        Self::new(0, FULL_PITCH_SPAN, 0.0, FULL_TIME_SPAN)
    }

    pub fn contains(&self, note: &Note) -> bool {
        let pitch_end = self.from_pitch.saturating_add(self.pitch_span);
        let time_end = self.from_time + self.time_span;
        note.pitch >= self.from_pitch
            && note.pitch < pitch_end
            && note.time >= self.from_time
            && note.time < time_end
    }

    pub fn is_empty(&self) -> bool {
        self.pitch_span <= 0 || self.time_span <= 0.0
    }
}

impl Default for NoteRange {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_middle_c() {
        assert!(Note::new(60, 0.0, 1.0, 100.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_pitch_128() {
        let err = Note::new(128, 0.0, 1.0, 100.0).validate().unwrap_err();
        assert_eq!(err, NoteError::PitchOutOfRange(128));
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        assert!(matches!(
            Note::new(60, 0.0, 0.0, 100.0).validate(),
            Err(NoteError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_validate_all_reports_index() {
        let notes = vec![Note::new(60, 0.0, 1.0, 100.0), Note::new(61, -1.0, 1.0, 100.0)];
        let (idx, err) = Note::validate_all(&notes).unwrap_err();
        assert_eq!(idx, 1);
        assert_eq!(err, NoteError::InvalidTime(-1.0));
    }

    #[test]
    fn test_full_range_includes_pitch_127() {
        let range = NoteRange::all();
        assert!(range.contains(&Note::new(127, 0.0, 1.0, 100.0)));
        assert!(range.contains(&Note::new(0, 4096.0, 1.0, 100.0)));
    }

    #[test]
    fn test_range_is_half_open() {
        let range = NoteRange::new(60, 1, 0.0, 1.0);
        assert!(range.contains(&Note::new(60, 0.0, 0.25, 100.0)));
        assert!(!range.contains(&Note::new(61, 0.0, 0.25, 100.0)));
        assert!(!range.contains(&Note::new(60, 1.0, 0.25, 100.0)));
    }

    #[test]
    fn test_missing_velocity_defaults() {
        let note: Note = serde_json::from_str(r#"{"pitch":64,"time":1.0,"duration":0.5}"#).unwrap();
        assert_eq!(note.velocity, 100.0);
        assert!(!note.muted);
    }

    #[test]
    fn test_sort_notes_orders_by_time_then_pitch() {
        let mut notes = vec![
            Note::new(64, 1.0, 1.0, 100.0),
            Note::new(67, 0.0, 1.0, 100.0),
            Note::new(60, 0.0, 1.0, 100.0),
        ];
        sort_notes(&mut notes);
        let pitches: Vec<i32> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 67, 64]);
    }
}
