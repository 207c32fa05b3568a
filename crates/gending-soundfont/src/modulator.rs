//! Modulator records, source decoding and the default modulator set.

use crate::generator::GeneratorType;
use serde::{Deserialize, Serialize};

/// Non-CC controller palette (source index when the CC flag is clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneralController {
    NoController,
    NoteOnVelocity,
    NoteOnKey,
    PolyPressure,
    ChannelPressure,
    PitchWheel,
    PitchWheelSensitivity,
    Link,
    Unknown(u8),
}

impl GeneralController {
    fn from_index(index: u8) -> Self {
        match index {
            0 => Self::NoController,
            2 => Self::NoteOnVelocity,
            3 => Self::NoteOnKey,
            10 => Self::PolyPressure,
            13 => Self::ChannelPressure,
            14 => Self::PitchWheel,
            16 => Self::PitchWheelSensitivity,
            127 => Self::Link,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveType {
    Linear,
    Concave,
    Convex,
    Switch,
}

/// Decoded view of a 16-bit modulator source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModulatorSource(pub u16);

/// Where a source reads its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Controller(u8),
    General(GeneralController),
}

impl ModulatorSource {
    pub const NONE: ModulatorSource = ModulatorSource(0);

    #[inline]
    pub fn index(self) -> u8 {
        (self.0 & 0x7F) as u8
    }

    #[inline]
    pub fn is_cc(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Maps maximum input to minimum output.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 & 0x100 != 0
    }

    #[inline]
    pub fn is_bipolar(self) -> bool {
        self.0 & 0x200 != 0
    }

    /// Unknown curve types fall back to linear.
    pub fn curve(self) -> CurveType {
        match self.0 >> 10 {
            1 => CurveType::Concave,
            2 => CurveType::Convex,
            3 => CurveType::Switch,
            _ => CurveType::Linear,
        }
    }

    pub fn kind(self) -> SourceKind {
        if self.is_cc() {
            SourceKind::Controller(self.index())
        } else {
            SourceKind::General(GeneralController::from_index(self.index()))
        }
    }

    /// True for a source that always yields the neutral value.
    pub fn is_none(self) -> bool {
        matches!(
            self.kind(),
            SourceKind::General(GeneralController::NoController)
        )
    }

    /// Map a normalized input in `0.0..=1.0` through direction, polarity and curve.
    pub fn map(self, input: f32) -> f32 {
        let mut x = input.clamp(0.0, 1.0);
        if self.is_negative() {
            x = 1.0 - x;
        }
        let curve = self.curve();
        if self.is_bipolar() {
            let centered = 2.0 * x - 1.0;
            match curve {
                CurveType::Linear => centered,
                CurveType::Switch => {
                    if x >= 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                _ => {
                    let shaped = shape(curve, centered.abs());
                    shaped.copysign(centered)
                }
            }
        } else {
            match curve {
                CurveType::Switch => {
                    if x >= 0.5 {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => shape(curve, x),
            }
        }
    }
}

fn concave(x: f32) -> f32 {
    if x <= 0.0 {
        0.0
    } else if x >= 1.0 {
        1.0
    } else {
        (-(40.0 / 96.0) * (1.0 - x).log10()).min(1.0)
    }
}

fn shape(curve: CurveType, x: f32) -> f32 {
    match curve {
        CurveType::Concave => concave(x),
        CurveType::Convex => 1.0 - concave(1.0 - x),
        _ => x,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transform {
    #[default]
    Linear,
    Absolute,
}

impl Transform {
    pub fn from_raw(raw: u16) -> Self {
        if raw == 2 {
            Self::Absolute
        } else {
            Self::Linear
        }
    }

    #[inline]
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Self::Linear => value,
            Self::Absolute => value.abs(),
        }
    }
}

/// One routing rule: `amount * source * amount_source` added to `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modulator {
    pub source: ModulatorSource,
    /// Generator id, or a link to another modulator when bit 15 is set.
    pub destination: u16,
    pub amount: i16,
    pub amount_source: ModulatorSource,
    pub transform: Transform,
}

impl Modulator {
    pub const fn new(source: u16, destination: GeneratorType, amount: i16) -> Self {
        Self {
            source: ModulatorSource(source),
            destination: destination as u16,
            amount,
            amount_source: ModulatorSource::NONE,
            transform: Transform::Linear,
        }
    }

    /// Decode a 10-byte `pmod`/`imod` record.
    pub fn from_record(src: u16, dest: u16, amount: i16, amount_src: u16, transform: u16) -> Self {
        Self {
            source: ModulatorSource(src),
            destination: dest,
            amount,
            amount_source: ModulatorSource(amount_src),
            transform: Transform::from_raw(transform),
        }
    }

    /// Same source, destination, amount source and transform. Amount is not compared.
    pub fn is_identical(&self, other: &Modulator) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.amount_source == other.amount_source
            && self.transform == other.transform
    }

    pub fn destination_generator(&self) -> Option<GeneratorType> {
        if self.destination & 0x8000 != 0 {
            return None;
        }
        GeneratorType::from_id(self.destination)
    }
}

/// Source operands as (index | cc<<7 | dir<<8 | pol<<9 | type<<10).
mod src {
    pub const VELOCITY_NEG_CONCAVE: u16 = 0x0502;
    pub const VELOCITY_NEG_LINEAR: u16 = 0x0102;
    pub const CHANNEL_PRESSURE: u16 = 0x000D;
    pub const CC1: u16 = 0x0081;
    pub const CC7_NEG_CONCAVE: u16 = 0x0587;
    pub const CC10_BIPOLAR: u16 = 0x028A;
    pub const CC11_NEG_CONCAVE: u16 = 0x058B;
    pub const CC91: u16 = 0x00DB;
    pub const CC93: u16 = 0x00DD;
}

/// Modulators every voice starts with, before zone modulators are merged.
///
/// Pitch wheel is not listed; the voice applies it directly scaled by the
/// channel's pitch-bend range.
pub const DEFAULT_MODULATORS: [Modulator; 9] = [
    Modulator::new(src::VELOCITY_NEG_CONCAVE, GeneratorType::InitialAttenuation, 960),
    Modulator::new(src::VELOCITY_NEG_LINEAR, GeneratorType::InitialFilterFc, -2400),
    Modulator::new(src::CHANNEL_PRESSURE, GeneratorType::VibLfoToPitch, 50),
    Modulator::new(src::CC1, GeneratorType::VibLfoToPitch, 50),
    Modulator::new(src::CC7_NEG_CONCAVE, GeneratorType::InitialAttenuation, 960),
    Modulator::new(src::CC10_BIPOLAR, GeneratorType::Pan, 1000),
    Modulator::new(src::CC11_NEG_CONCAVE, GeneratorType::InitialAttenuation, 960),
    Modulator::new(src::CC91, GeneratorType::ReverbEffectsSend, 200),
    Modulator::new(src::CC93, GeneratorType::ChorusEffectsSend, 200),
];
