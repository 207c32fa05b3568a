//! Tolerance constants for playback testing.

/// Transport position after rendering a span. Covers the block quantization
/// of sequencer time at small block sizes and playback rates up to 4.
pub const TIME_EPSILON: f64 = 0.01;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Audible threshold (~-40dB) for a sounding note.
pub const AUDIBLE_THRESHOLD: f32 = 0.01;
