//! Sample headers (`shdr` records).

use serde::{Deserialize, Serialize};

/// Channel role of a sample, from the `sfSampleType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    Mono,
    Right,
    Left,
    Linked,
    /// ROM samples live in hardware memory we do not have.
    Rom(u16),
    Unknown(u16),
}

impl SampleType {
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x8000 != 0 {
            return Self::Rom(raw);
        }
        match raw {
            1 => Self::Mono,
            2 => Self::Right,
            4 => Self::Left,
            8 => Self::Linked,
            other => Self::Unknown(other),
        }
    }

    pub fn is_rom(self) -> bool {
        matches!(self, Self::Rom(_))
    }

    /// ROM samples never loop.
    pub fn permits_looping(self) -> bool {
        !self.is_rom()
    }
}

/// Offsets are absolute indices (in sample frames) into the bank's sample data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleHeader {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub sample_rate: u32,
    pub original_pitch: u8,
    /// Cents.
    pub pitch_correction: i8,
    pub link: u16,
    pub sample_type: SampleType,
}

impl SampleHeader {
    pub const RECORD_SIZE: usize = 46;

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Original pitch 128..=254 are invalid per format; 255 means unpitched.
    /// Both fall back to middle C.
    pub fn root_key(&self) -> u8 {
        if self.original_pitch > 127 {
            60
        } else {
            self.original_pitch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_type() {
        assert_eq!(SampleType::from_raw(1), SampleType::Mono);
        assert_eq!(SampleType::from_raw(4), SampleType::Left);
        assert!(SampleType::from_raw(0x8001).is_rom());
        assert!(!SampleType::from_raw(0x8001).permits_looping());
    }

    #[test]
    fn test_root_key_fallback() {
        let mut header = SampleHeader {
            name: "gong".into(),
            start: 10,
            end: 110,
            loop_start: 20,
            loop_end: 100,
            sample_rate: 22050,
            original_pitch: 255,
            pitch_correction: 0,
            link: 0,
            sample_type: SampleType::Mono,
        };
        assert_eq!(header.root_key(), 60);
        header.original_pitch = 67;
        assert_eq!(header.root_key(), 67);
        assert_eq!(header.len(), 100);
    }
}
