//! SoundFont wavetable synthesizer for gending.
//!
//! - **[`Synthesizer`]** - Channels, voice pool and the block renderer (render context)
//! - **[`SynthHandle`]** - Cloneable, queue-backed control from any thread
//! - **[`SynthControl`]** - The channel-message surface both of them implement
//! - **[`VoicePool`]** - Polyphony ceiling with deterministic voice stealing
//! - **[`SynthesizerSettings`]** - Sample rate, block size, polyphony and friends
//!
//! # Quick Start
//!
//! ```ignore
//! use gending_synth::{Synthesizer, SynthesizerSettings, SynthControl};
//!
//! let bank = Arc::new(SoundBank::parse(&sf2_bytes)?);
//! let mut synth = Synthesizer::new(bank, SynthesizerSettings::default())?;
//! synth.note_on(0, 60, 100);
//! synth.render(&mut left, &mut right);
//! ```

pub mod channel;
pub mod error;
pub mod settings;
pub mod sysex;
pub mod voice;

mod command;
mod control;
mod pool;
mod synthesizer;

pub use channel::Channel;
pub use command::{SynthCommand, SynthHandle};
pub use control::SynthControl;
pub use error::{Error, Result, RuntimeSynthesisWarning};
pub use pool::{AllocationResult, VoicePool};
pub use settings::{Interpolation, LoopReleaseMode, SynthesizerSettings};
pub use synthesizer::{SynthStats, Synthesizer};
pub use voice::envelope::EnvelopeStage;
pub use voice::{Voice, VoiceId, VoiceState};
