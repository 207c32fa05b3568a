//! Combining preset and instrument zones into the values a voice plays with.

use crate::generator::{GeneratorSet, GeneratorType, GENERATOR_COUNT};
use crate::modulator::Modulator;
use crate::zone::Zone;
use serde::{Deserialize, Serialize};

/// How global and local zones at the four layering levels combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorLayering {
    /// Additive ids take the instrument value (zone, else global, else the
    /// id's default) plus both preset levels as offsets. Other ids take the
    /// most specific value.
    #[default]
    Additive,
    /// Strict SoundFont 2.04: a global zone only supplies values its local
    /// zone lacks, and the preset level adds an offset to the instrument level.
    GlobalAsDefault,
}

/// The four levels contributing to one voice.
#[derive(Debug, Clone, Copy)]
pub struct ZoneLayers<'a> {
    pub preset_global: Option<&'a Zone>,
    pub preset_zone: &'a Zone,
    pub instrument_global: Option<&'a Zone>,
    pub instrument_zone: &'a Zone,
}

/// Effective generator values, each clamped to its id's limits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGenerators {
    values: [i32; GENERATOR_COUNT],
}

impl ResolvedGenerators {
    /// Every id at its default value.
    pub fn defaults() -> Self {
        let mut values = [0; GENERATOR_COUNT];
        for g in GeneratorType::ALL {
            values[g.index()] = i32::from(g.info().default);
        }
        Self { values }
    }

    pub fn resolve(layers: &ZoneLayers<'_>, layering: GeneratorLayering) -> Self {
        let pg = layers.preset_global.map(|z| &z.generators);
        let pz = &layers.preset_zone.generators;
        let ig = layers.instrument_global.map(|z| &z.generators);
        let iz = &layers.instrument_zone.generators;

        let mut values = [0; GENERATOR_COUNT];
        for g in GeneratorType::ALL {
            let info = g.info();
            let default = i32::from(info.default);
            let get = |set: Option<&GeneratorSet>| set.and_then(|s| s.get(g)).map(i32::from);

            let instrument_value = get(Some(iz)).or_else(|| get(ig));
            let preset_value = if info.instrument_only {
                None
            } else {
                get(Some(pz)).or_else(|| get(pg))
            };

            let value = if !info.additive {
                instrument_value.or(preset_value).unwrap_or(default)
            } else {
                match layering {
                    GeneratorLayering::Additive => {
                        let preset_sum = if info.instrument_only {
                            0
                        } else {
                            get(pg).unwrap_or(0) + get(Some(pz)).unwrap_or(0)
                        };
                        instrument_value.unwrap_or(default) + preset_sum
                    }
                    GeneratorLayering::GlobalAsDefault => {
                        instrument_value.unwrap_or(default) + preset_value.unwrap_or(0)
                    }
                }
            };
            values[g.index()] = g.clamp(value);
        }
        Self { values }
    }

    #[inline]
    pub fn get(&self, generator: GeneratorType) -> i32 {
        self.values[generator.index()]
    }

    /// Overwrite one value (still clamped).
    pub fn set(&mut self, generator: GeneratorType, value: i32) {
        self.values[generator.index()] = generator.clamp(value);
    }
}

impl Default for ResolvedGenerators {
    fn default() -> Self {
        Self::defaults()
    }
}

impl std::fmt::Debug for ResolvedGenerators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(GeneratorType::ALL.iter().map(|g| (g, self.values[g.index()])))
            .finish()
    }
}

/// Upper bound on modulators per voice.
pub const MAX_VOICE_MODULATORS: usize = 64;

/// Fixed-capacity modulator list owned by a voice; filled without allocating.
#[derive(Clone, Copy)]
pub struct ModulatorList {
    items: [Modulator; MAX_VOICE_MODULATORS],
    len: usize,
}

impl ModulatorList {
    pub fn new() -> Self {
        Self {
            items: [Modulator::new(0, GeneratorType::EndOper, 0); MAX_VOICE_MODULATORS],
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[Modulator] {
        &self.items[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns false when the list is full and `m` was dropped.
    pub fn push(&mut self, m: Modulator) -> bool {
        if self.len == MAX_VOICE_MODULATORS {
            return false;
        }
        self.items[self.len] = m;
        self.len += 1;
        true
    }

    fn find_identical(&mut self, m: &Modulator) -> Option<&mut Modulator> {
        self.items[..self.len].iter_mut().find(|e| e.is_identical(m))
    }

    /// Build the voice's list: defaults, then instrument modulators replacing
    /// identical entries, then preset modulators adding to identical entries.
    /// A zero-amount override disables a default. Returns how many
    /// modulators did not fit.
    pub fn build(&mut self, defaults: &[Modulator], layers: &ZoneLayers<'_>) -> usize {
        self.clear();
        let mut dropped = 0;
        for m in defaults {
            if !self.push(*m) {
                dropped += 1;
            }
        }

        let mut apply = |list: &mut Self, m: &Modulator, additive: bool| {
            match list.find_identical(m) {
                Some(existing) if additive => {
                    existing.amount = existing.amount.saturating_add(m.amount)
                }
                Some(existing) => *existing = *m,
                None => {
                    if !list.push(*m) {
                        dropped += 1;
                    }
                }
            }
        };

        for (local, global, additive) in [
            (layers.instrument_zone, layers.instrument_global, false),
            (layers.preset_zone, layers.preset_global, true),
        ] {
            for m in &local.modulators {
                apply(self, m, additive);
            }
            if let Some(global) = global {
                for m in &global.modulators {
                    if !local.modulators.iter().any(|l| l.is_identical(m)) {
                        apply(self, m, additive);
                    }
                }
            }
        }
        dropped
    }
}

impl Default for ModulatorList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ModulatorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
