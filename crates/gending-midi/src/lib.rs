//! Standard MIDI File parsing for the gending sequencer.
//!
//! [`Song::parse`] decodes an SMF (or RMID-wrapped SMF) buffer into
//! per-track absolute-tick events, a merged [`TempoMap`] and a default
//! loop region.

pub mod error;
pub mod event;
pub mod file;
pub mod song;
pub mod tempo_map;

pub use error::{FormatError, Result, SequencerDataWarning};
pub use event::{MetaEvent, MetaKind, MidiEvent, TimedEvent};
pub use file::MidiFile;
pub use song::{LoopRegion, Song, Track};
pub use tempo_map::{TempoChange, TempoMap, DEFAULT_MICROS_PER_QUARTER, MIN_MICROS_PER_QUARTER};
