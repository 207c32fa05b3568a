//! Presets, instruments and their zones.

use crate::generator::{GeneratorSet, Range};
use crate::modulator::Modulator;
use smallvec::SmallVec;

/// Modulators attached to a single zone. Most zones carry none.
pub type ZoneModulators = SmallVec<[Modulator; 2]>;

/// Generators and modulators of one preset or instrument zone.
#[derive(Debug, Clone, Default)]
pub struct Zone {
    pub generators: GeneratorSet,
    pub modulators: ZoneModulators,
    pub key_range: Range,
    pub vel_range: Range,
    /// Instrument index for preset zones, sample index for instrument zones.
    /// `None` on a global zone.
    pub link: Option<usize>,
}

impl Zone {
    #[inline]
    pub fn covers(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(key) && self.vel_range.contains(velocity)
    }

    pub fn is_global(&self) -> bool {
        self.link.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub global: Option<Zone>,
    pub zones: Vec<Zone>,
}

impl Instrument {
    pub fn zones_for(&self, key: u8, velocity: u8) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |z| z.covers(key, velocity))
    }
}

#[derive(Debug, Clone)]
pub struct Preset {
    pub name: String,
    pub program: u16,
    pub bank: u16,
    pub global: Option<Zone>,
    pub zones: Vec<Zone>,
}

impl Preset {
    pub fn zones_for(&self, key: u8, velocity: u8) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |z| z.covers(key, velocity))
    }

    pub fn is_percussion(&self) -> bool {
        self.bank == 128
    }
}
