//! Error and warning types for MIDI file parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for gending-midi operations.
pub type Result<T> = std::result::Result<T, FormatError>;

/// A malformed or unsupported MIDI container. Always fatal to the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a MIDI file: container starts with {0:?}")]
    UnknownContainer(String),

    /// Rejected by the SMF decoder: bad header, RIFF without RMID data.
    #[error("malformed MIDI data: {0}")]
    Malformed(String),

    #[error("header declares {declared} tracks but {found} were found")]
    TrackCountMismatch { declared: u16, found: u16 },

    #[error("unsupported time division 0x{0:04X}")]
    UnsupportedTiming(u16),
}

/// Non-fatal oddities found while parsing. The song still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerDataWarning {
    /// A tempo of zero was clamped to the minimum.
    ZeroTempo { tick: u64 },
    /// Meta type this crate does not name; payload is kept as-is.
    UnknownMetaEvent { track: usize, tick: u64, kind: u8 },
    MissingEndOfTrack { track: usize },
}
