//! MIDI song sequencer for gending.
//!
//! - [`Sequencer`]: transport (play, pause, stop, seek), tick scheduling
//!   through the song's tempo map, looping and a playlist
//! - [`Snapshot`]: channel state at a tick, replayed after seeks and loop jumps
//! - [`SequencerOptions`]: serde-configurable defaults
//!
//! The sequencer drives any [`SynthControl`](gending_synth::SynthControl).
//! In the player it runs inside the render callback, once per block:
//!
//! ```ignore
//! synth.render_with(&mut left, &mut right, |synth| {
//!     sequencer.advance(block_seconds, synth);
//! });
//! ```

pub mod error;
pub mod options;
pub mod sequencer;
pub mod snapshot;
pub mod state;

pub use error::{Error, Result};
pub use options::SequencerOptions;
pub use sequencer::Sequencer;
pub use snapshot::Snapshot;
pub use state::PlaybackState;
