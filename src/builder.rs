//! Builder for configuring and constructing a [`Player`] and its handle.

use crate::config::PlayerConfig;
use crate::player::{Player, PlayerHandle, PlayerStatus};
use crate::{Error, Result};
use gending_core::EventBus;
use gending_sequencer::{Sequencer, SequencerOptions};
use gending_soundfont::SoundBank;
use gending_synth::{Interpolation, LoopReleaseMode, Synthesizer, SynthesizerSettings};
use std::sync::Arc;
use tracing::debug;

enum BankSource {
    Parsed(Arc<SoundBank>),
    Bytes(Vec<u8>),
}

/// A sound bank is required; everything else has a default.
///
/// The sample rate must match the output device. Query it first when the
/// `output` feature is enabled.
///
/// # Example
///
/// ```ignore
/// use gending::prelude::*;
///
/// let (mut player, handle) = Player::builder()
///     .sound_bank_bytes(sf2_bytes)
///     .sample_rate(48_000)
///     .max_polyphony(128)
///     .build()?;
///
/// handle.load_midi([(midi_bytes.as_slice(), Some("Ladrang Wilujeng"))])?;
/// handle.play();
/// player.render(&mut left, &mut right);
/// ```
#[derive(Default)]
pub struct PlayerBuilder {
    bank: Option<BankSource>,
    config: PlayerConfig,
}

impl PlayerBuilder {
    pub fn sound_bank(mut self, bank: Arc<SoundBank>) -> Self {
        self.bank = Some(BankSource::Parsed(bank));
        self
    }

    /// Parsed during [`build`](Self::build); a malformed bank fails the build.
    pub fn sound_bank_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.bank = Some(BankSource::Bytes(bytes.into()));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn synth_settings(mut self, settings: SynthesizerSettings) -> Self {
        self.config.synth = settings;
        self
    }

    pub fn sequencer_options(mut self, options: SequencerOptions) -> Self {
        self.config.sequencer = options;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.synth.sample_rate = sample_rate;
        self
    }

    /// Default: 64
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.synth.block_size = block_size;
        self
    }

    /// Default: 256
    pub fn max_polyphony(mut self, voices: usize) -> Self {
        self.config.synth.max_polyphony = voices;
        self
    }

    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.config.synth.interpolation = interpolation;
        self
    }

    pub fn loop_release(mut self, mode: LoopReleaseMode) -> Self {
        self.config.synth.loop_release = mode;
        self
    }

    pub fn auto_play(mut self, enabled: bool) -> Self {
        self.config.sequencer.auto_play = enabled;
        self
    }

    pub fn looping(mut self, enabled: bool) -> Self {
        self.config.sequencer.loop_enabled = enabled;
        self
    }

    pub fn auto_advance(mut self, enabled: bool) -> Self {
        self.config.sequencer.auto_advance = enabled;
        self
    }

    pub fn skip_to_first_note_on(mut self, enabled: bool) -> Self {
        self.config.sequencer.skip_to_first_note_on = enabled;
        self
    }

    /// Default: 4096
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<(Player, PlayerHandle)> {
        self.config.validate()?;
        let bank = match self.bank {
            Some(BankSource::Parsed(bank)) => bank,
            Some(BankSource::Bytes(bytes)) => Arc::new(SoundBank::parse(&bytes)?),
            None => {
                return Err(Error::InvalidConfig(
                    "a sound bank is required".to_string(),
                ))
            }
        };

        let events = Arc::new(EventBus::new(self.config.event_capacity));
        let synth = Synthesizer::new(bank, self.config.synth.clone())?.with_publisher(events.publisher());
        let sequencer =
            Sequencer::new(self.config.sequencer.clone())?.with_publisher(events.publisher());

        let (tx, rx) = crossbeam_channel::bounded(self.config.transport_capacity);
        let status = Arc::new(PlayerStatus::new(self.config.sequencer.loop_enabled));
        let handle = PlayerHandle::new(synth.handle(), tx, Arc::clone(&status), events);

        debug!(
            "Built player: {} Hz, block {}, polyphony {}",
            self.config.synth.sample_rate,
            self.config.synth.block_size,
            self.config.synth.max_polyphony
        );
        Ok((Player::new(synth, sequencer, rx, status), handle))
    }
}
