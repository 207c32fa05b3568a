//! SoundFont 2 sound-bank model and parser.
//!
//! [`SoundBank::parse`] turns an in-memory `.sf2` image into presets,
//! instruments and sample headers with per-zone generator and modulator
//! lists already resolved. [`layering`] combines the four zone levels into
//! the values a voice is built from.

pub mod bank;
mod chunk;
pub mod error;
pub mod generator;
pub mod layering;
pub mod modulator;
pub mod sample;
pub mod zone;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use bank::{SoundBank, SoundBankInfo};
pub use error::{FormatError, Result};
pub use generator::{GeneratorSet, GeneratorType, Range, GENERATOR_COUNT};
pub use layering::{GeneratorLayering, ModulatorList, ResolvedGenerators, ZoneLayers};
pub use modulator::{
    CurveType, GeneralController, Modulator, ModulatorSource, SourceKind, Transform,
    DEFAULT_MODULATORS,
};
pub use sample::{SampleHeader, SampleType};
pub use zone::{Instrument, Preset, Zone};
