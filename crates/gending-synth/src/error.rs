//! Error and warning types for gending-synth.

use thiserror::Error;

/// Result type alias for gending-synth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring the synthesizer.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration parameter.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Problems found while playing. Logged and counted, never returned:
/// the offending note produces no voice and playback continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSynthesisWarning {
    /// No preset for the channel's (bank, program), even after fallbacks.
    MissingPreset { channel: u8, bank: u16, program: u8 },
    /// System-exclusive payload that is not in the recognized set.
    UnsupportedSysEx { manufacturer: u8 },
    /// Sample region collapsed to nothing after address offsets.
    ZeroLengthSample { sample: usize },
    /// A voice had more modulators than fit in its list.
    ModulatorOverflow { dropped: usize },
}
