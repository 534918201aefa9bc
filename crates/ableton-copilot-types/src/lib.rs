//! Shared types for ableton-copilot.
//!
//! A leaf crate with no internal dependencies: the note model, the
//! operation-history and snapshot records, and typed references into the
//! Live object graph.
//!
//! |--------------------|-----------------------------------------------|
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`Note`]           | One MIDI note as Live reports it              |
//! | [`NoteRange`]      | Pitch/time window for note queries            |
//! | [`OperationHistory`] | Ledger row for one tracked tool call        |
//! | [`Snapshot`]       | Prior state captured for one ledger row       |
//! | [`ObjectRef`]      | Address of a song, track, clip, device...     |
//! |--------------------|-----------------------------------------------|

pub mod history;
pub mod note;
pub mod object;

pub use history::{HistoryId, OperationHistory, OperationStatus, Snapshot, SnapshotKind};
pub use note::{FULL_PITCH_SPAN, FULL_TIME_SPAN, Note, NoteError, NoteRange, sort_notes};
pub use object::{ObjectKind, ObjectRef, ResourceType, TrackKind};
