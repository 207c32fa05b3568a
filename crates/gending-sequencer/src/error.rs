//! Error types for gending-sequencer.

use thiserror::Error;

/// Result type alias for gending-sequencer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Song index {index} out of range (playlist has {len})")]
    SongIndexOutOfRange { index: usize, len: usize },

    #[error("Playlist is empty")]
    EmptyPlaylist,
}
