//! Error types for sound-bank parsing.

use thiserror::Error;

/// Result type alias for gending-soundfont operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// A malformed or unsupported sound-bank container. Always fatal to the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a SoundFont: top-level container is {0:?}")]
    UnknownContainer(String),

    #[error("missing required chunk '{0}'")]
    MissingChunk(&'static str),

    #[error("chunk '{tag}' has invalid size {size}")]
    InvalidChunkSize { tag: String, size: usize },

    #[error("preset {preset} has a malformed zone index range")]
    InvalidPresetZones { preset: usize },

    #[error("instrument {instrument} has a malformed zone index range")]
    InvalidInstrumentZones { instrument: usize },

    #[error("preset {preset} references missing instrument {instrument}")]
    InvalidInstrumentReference { preset: usize, instrument: usize },

    #[error("instrument {instrument} references missing sample {sample}")]
    InvalidSampleReference { instrument: usize, sample: usize },

    #[error("truncated data: {0}")]
    Truncated(#[from] gending_core::Error),
}
