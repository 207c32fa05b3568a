//! Error types for gending-core.

use thiserror::Error;

/// Result type alias for gending-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding binary buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The buffer ended before the requested bytes could be read.
    #[error("unexpected end of data at offset {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        available: usize,
    },
}
