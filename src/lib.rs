//! # Gending - SoundFont synthesizer and MIDI sequencer core
//!
//! Playback engine for the gamelan player: SF2 banks rendered by a
//! wavetable synthesizer, driven by a Standard MIDI File sequencer.
//!
//! ## Architecture
//!
//! Gending is an umbrella crate that coordinates:
//! - **gending-core** - Notification bus, atomics, binary reader
//! - **gending-soundfont** - SF2 parsing and generator layering
//! - **gending-midi** - SMF parsing, tempo map, song model
//! - **gending-synth** - Voices, channels, command queue, rendering
//! - **gending-sequencer** - Transport, seek snapshots, loop, playlist
//!
//! ## Quick Start
//!
//! ```ignore
//! use gending::prelude::*;
//!
//! let (mut player, handle) = Player::builder()
//!     .sound_bank_bytes(std::fs::read("gamelan.sf2")?)
//!     .sample_rate(48_000)
//!     .build()?;
//!
//! handle.load_midi([(midi_bytes.as_slice(), Some("Ladrang Wilujeng"))])?;
//! handle.subscribe(Some(NotificationKind::TimeChanged), |n| println!("{n:?}"));
//!
//! // audio thread
//! player.render(&mut left, &mut right);
//!
//! // control thread
//! handle.dispatch_events();
//! ```
//!
//! ## Feature Flags
//!
//! - `output` - Real-time audio output through CPAL

/// Re-export of gending-core for direct access
pub use gending_core as core;
pub use gending_midi as midi;
pub use gending_sequencer as sequencer;
pub use gending_soundfont as soundfont;
pub use gending_synth as synth;

pub use gending_core::{EventBus, Notification, NotificationKind, SubscriptionId};
pub use gending_midi::Song;
pub use gending_sequencer::{PlaybackState, SequencerOptions};
pub use gending_soundfont::SoundBank;
pub use gending_synth::{Interpolation, LoopReleaseMode, SynthCommand, SynthHandle, SynthesizerSettings};

mod builder;
mod config;
mod error;
mod player;

#[cfg(feature = "output")]
mod output;

pub use builder::PlayerBuilder;
pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use player::{Player, PlayerHandle, TransportCommand};

#[cfg(feature = "output")]
pub use output::AudioOutput;

/// Convenience prelude for common imports
pub mod prelude {
    // Player
    pub use crate::{Player, PlayerBuilder, PlayerConfig, PlayerHandle, TransportCommand};

    // Notifications
    pub use crate::core::{Notification, NotificationKind};

    // Playback
    pub use crate::midi::Song;
    pub use crate::sequencer::{PlaybackState, SequencerOptions};
    pub use crate::synth::{SynthControl, SynthesizerSettings};

    #[cfg(feature = "output")]
    pub use crate::AudioOutput;
}
