//! Centralized error type for the gending umbrella crate.
//!
//! Wraps all member-crate errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] gending_core::Error),

    #[error("SoundFont: {0}")]
    SoundFont(#[from] gending_soundfont::FormatError),

    #[error("MIDI: {0}")]
    Midi(#[from] gending_midi::FormatError),

    #[error("Synth: {0}")]
    Synth(#[from] gending_synth::Error),

    #[error("Sequencer: {0}")]
    Sequencer(#[from] gending_sequencer::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[cfg(feature = "output")]
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[cfg(feature = "output")]
    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[cfg(feature = "output")]
    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[cfg(feature = "output")]
    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[cfg(feature = "output")]
    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[cfg(feature = "output")]
    #[error("Failed to get device name")]
    DeviceNameError(#[from] cpal::DeviceNameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
