//! Generator ids, their value limits and the per-zone generator set.

use serde::{Deserialize, Serialize};

/// Number of generator ids defined by SoundFont 2.04 (0..=60).
pub const GENERATOR_COUNT: usize = 61;

/// SoundFont generator id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeneratorType {
    StartAddrsOffset = 0,
    EndAddrsOffset = 1,
    StartloopAddrsOffset = 2,
    EndloopAddrsOffset = 3,
    StartAddrsCoarseOffset = 4,
    ModLfoToPitch = 5,
    VibLfoToPitch = 6,
    ModEnvToPitch = 7,
    InitialFilterFc = 8,
    InitialFilterQ = 9,
    ModLfoToFilterFc = 10,
    ModEnvToFilterFc = 11,
    EndAddrsCoarseOffset = 12,
    ModLfoToVolume = 13,
    Unused1 = 14,
    ChorusEffectsSend = 15,
    ReverbEffectsSend = 16,
    Pan = 17,
    Unused2 = 18,
    Unused3 = 19,
    Unused4 = 20,
    DelayModLfo = 21,
    FreqModLfo = 22,
    DelayVibLfo = 23,
    FreqVibLfo = 24,
    DelayModEnv = 25,
    AttackModEnv = 26,
    HoldModEnv = 27,
    DecayModEnv = 28,
    SustainModEnv = 29,
    ReleaseModEnv = 30,
    KeynumToModEnvHold = 31,
    KeynumToModEnvDecay = 32,
    DelayVolEnv = 33,
    AttackVolEnv = 34,
    HoldVolEnv = 35,
    DecayVolEnv = 36,
    SustainVolEnv = 37,
    ReleaseVolEnv = 38,
    KeynumToVolEnvHold = 39,
    KeynumToVolEnvDecay = 40,
    Instrument = 41,
    Reserved1 = 42,
    KeyRange = 43,
    VelRange = 44,
    StartloopAddrsCoarseOffset = 45,
    Keynum = 46,
    Velocity = 47,
    InitialAttenuation = 48,
    Reserved2 = 49,
    EndloopAddrsCoarseOffset = 50,
    CoarseTune = 51,
    FineTune = 52,
    SampleId = 53,
    SampleModes = 54,
    Reserved3 = 55,
    ScaleTuning = 56,
    ExclusiveClass = 57,
    OverridingRootKey = 58,
    Unused5 = 59,
    EndOper = 60,
}

/// Value limits and layering behaviour of one generator id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorInfo {
    pub default: i16,
    pub min: i16,
    pub max: i16,
    /// Contributions from every layering level are summed.
    pub additive: bool,
    /// Only meaningful at instrument level; preset-level values are ignored.
    pub instrument_only: bool,
}

const fn info(default: i16, min: i16, max: i16, additive: bool, instrument_only: bool) -> GeneratorInfo {
    GeneratorInfo {
        default,
        min,
        max,
        additive,
        instrument_only,
    }
}

const FULL_MIN: i16 = i16::MIN;
const FULL_MAX: i16 = i16::MAX;

/// Offsets and indices: unclamped, instrument level, most specific wins.
const OFFSET: GeneratorInfo = info(0, FULL_MIN, FULL_MAX, false, true);
const OPAQUE: GeneratorInfo = info(0, FULL_MIN, FULL_MAX, false, false);
const TIME: GeneratorInfo = info(-12000, -12000, 8000, true, false);
const DELAY: GeneratorInfo = info(-12000, -12000, 5000, true, false);
const MOD_DEPTH: GeneratorInfo = info(0, -12000, 12000, true, false);
const LFO_FREQ: GeneratorInfo = info(0, -16000, 4500, true, false);
const KEY_SCALE: GeneratorInfo = info(0, -1200, 1200, true, false);

static TABLE: [GeneratorInfo; GENERATOR_COUNT] = [
    OFFSET,                                 // 0 startAddrsOffset
    OFFSET,                                 // 1 endAddrsOffset
    OFFSET,                                 // 2 startloopAddrsOffset
    OFFSET,                                 // 3 endloopAddrsOffset
    OFFSET,                                 // 4 startAddrsCoarseOffset
    MOD_DEPTH,                              // 5 modLfoToPitch
    MOD_DEPTH,                              // 6 vibLfoToPitch
    MOD_DEPTH,                              // 7 modEnvToPitch
    info(13500, 1500, 13500, true, false),  // 8 initialFilterFc
    info(0, 0, 960, true, false),           // 9 initialFilterQ
    MOD_DEPTH,                              // 10 modLfoToFilterFc
    MOD_DEPTH,                              // 11 modEnvToFilterFc
    OFFSET,                                 // 12 endAddrsCoarseOffset
    info(0, -960, 960, true, false),        // 13 modLfoToVolume
    OPAQUE,                                 // 14
    info(0, 0, 1000, true, false),          // 15 chorusEffectsSend
    info(0, 0, 1000, true, false),          // 16 reverbEffectsSend
    info(0, -500, 500, true, false),        // 17 pan
    OPAQUE,                                 // 18
    OPAQUE,                                 // 19
    OPAQUE,                                 // 20
    DELAY,                                  // 21 delayModLFO
    LFO_FREQ,                               // 22 freqModLFO
    DELAY,                                  // 23 delayVibLFO
    LFO_FREQ,                               // 24 freqVibLFO
    DELAY,                                  // 25 delayModEnv
    TIME,                                   // 26 attackModEnv
    DELAY,                                  // 27 holdModEnv
    TIME,                                   // 28 decayModEnv
    info(0, 0, 1000, true, false),          // 29 sustainModEnv
    TIME,                                   // 30 releaseModEnv
    KEY_SCALE,                              // 31 keynumToModEnvHold
    KEY_SCALE,                              // 32 keynumToModEnvDecay
    DELAY,                                  // 33 delayVolEnv
    TIME,                                   // 34 attackVolEnv
    DELAY,                                  // 35 holdVolEnv
    TIME,                                   // 36 decayVolEnv
    info(0, 0, 1440, true, false),          // 37 sustainVolEnv
    TIME,                                   // 38 releaseVolEnv
    KEY_SCALE,                              // 39 keynumToVolEnvHold
    KEY_SCALE,                              // 40 keynumToVolEnvDecay
    OPAQUE,                                 // 41 instrument
    OPAQUE,                                 // 42
    OPAQUE,                                 // 43 keyRange
    OPAQUE,                                 // 44 velRange
    OFFSET,                                 // 45 startloopAddrsCoarseOffset
    info(-1, -1, 127, false, true),         // 46 keynum
    info(-1, -1, 127, false, true),         // 47 velocity
    info(0, 0, 1440, true, false),          // 48 initialAttenuation
    OPAQUE,                                 // 49
    OFFSET,                                 // 50 endloopAddrsCoarseOffset
    info(0, -120, 120, true, false),        // 51 coarseTune
    info(0, -99, 99, true, false),          // 52 fineTune
    info(0, FULL_MIN, FULL_MAX, false, true), // 53 sampleID
    info(0, 0, 3, false, true),             // 54 sampleModes
    OPAQUE,                                 // 55
    info(100, 0, 1200, true, false),        // 56 scaleTuning
    info(0, 0, 127, false, true),           // 57 exclusiveClass
    info(-1, -1, 127, false, true),         // 58 overridingRootKey
    OPAQUE,                                 // 59
    OPAQUE,                                 // 60 endOper
];

impl GeneratorType {
    pub const ALL: [GeneratorType; GENERATOR_COUNT] = {
        use GeneratorType::*;
        [
            StartAddrsOffset,
            EndAddrsOffset,
            StartloopAddrsOffset,
            EndloopAddrsOffset,
            StartAddrsCoarseOffset,
            ModLfoToPitch,
            VibLfoToPitch,
            ModEnvToPitch,
            InitialFilterFc,
            InitialFilterQ,
            ModLfoToFilterFc,
            ModEnvToFilterFc,
            EndAddrsCoarseOffset,
            ModLfoToVolume,
            Unused1,
            ChorusEffectsSend,
            ReverbEffectsSend,
            Pan,
            Unused2,
            Unused3,
            Unused4,
            DelayModLfo,
            FreqModLfo,
            DelayVibLfo,
            FreqVibLfo,
            DelayModEnv,
            AttackModEnv,
            HoldModEnv,
            DecayModEnv,
            SustainModEnv,
            ReleaseModEnv,
            KeynumToModEnvHold,
            KeynumToModEnvDecay,
            DelayVolEnv,
            AttackVolEnv,
            HoldVolEnv,
            DecayVolEnv,
            SustainVolEnv,
            ReleaseVolEnv,
            KeynumToVolEnvHold,
            KeynumToVolEnvDecay,
            Instrument,
            Reserved1,
            KeyRange,
            VelRange,
            StartloopAddrsCoarseOffset,
            Keynum,
            Velocity,
            InitialAttenuation,
            Reserved2,
            EndloopAddrsCoarseOffset,
            CoarseTune,
            FineTune,
            SampleId,
            SampleModes,
            Reserved3,
            ScaleTuning,
            ExclusiveClass,
            OverridingRootKey,
            Unused5,
            EndOper,
        ]
    };

    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    #[inline]
    pub fn id(self) -> u16 {
        self as u16
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn info(self) -> &'static GeneratorInfo {
        &TABLE[self.index()]
    }

    #[inline]
    pub fn clamp(self, value: i32) -> i32 {
        let info = self.info();
        value.clamp(i32::from(info.min), i32::from(info.max))
    }
}

/// Inclusive MIDI key or velocity range from a range generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub lo: u8,
    pub hi: u8,
}

impl Range {
    pub const FULL: Range = Range { lo: 0, hi: 127 };

    /// Decode the two-byte range amount (low byte first).
    pub fn from_amount(raw: u16) -> Self {
        let [lo, hi] = raw.to_le_bytes();
        Self { lo, hi }
    }

    #[inline]
    pub fn contains(&self, value: u8) -> bool {
        self.lo <= value && value <= self.hi
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::FULL
    }
}

/// At most one value per generator id, as stored on one zone.
///
/// Fixed-size, indexed by [`GeneratorType`]; a later write of the same id
/// replaces the earlier one.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSet {
    values: [i16; GENERATOR_COUNT],
    present: u64,
}

impl GeneratorSet {
    pub const fn new() -> Self {
        Self {
            values: [0; GENERATOR_COUNT],
            present: 0,
        }
    }

    #[inline]
    pub fn set(&mut self, generator: GeneratorType, value: i16) {
        self.values[generator.index()] = value;
        self.present |= 1 << generator.index();
    }

    #[inline]
    pub fn get(&self, generator: GeneratorType) -> Option<i16> {
        self.contains(generator).then(|| self.values[generator.index()])
    }

    #[inline]
    pub fn contains(&self, generator: GeneratorType) -> bool {
        self.present & (1 << generator.index()) != 0
    }

    /// Raw amount reinterpreted as unsigned (ranges, indices).
    pub fn get_raw(&self, generator: GeneratorType) -> Option<u16> {
        self.get(generator).map(|v| v as u16)
    }

    pub fn key_range(&self) -> Range {
        self.get_raw(GeneratorType::KeyRange)
            .map(Range::from_amount)
            .unwrap_or_default()
    }

    pub fn vel_range(&self) -> Range {
        self.get_raw(GeneratorType::VelRange)
            .map(Range::from_amount)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.present.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (GeneratorType, i16)> + '_ {
        GeneratorType::ALL
            .iter()
            .filter(|g| self.contains(**g))
            .map(|g| (*g, self.values[g.index()]))
    }
}

impl Default for GeneratorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GeneratorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
