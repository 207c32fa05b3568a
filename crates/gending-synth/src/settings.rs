//! Synthesizer configuration.

use crate::error::{Error, Result};
use gending_soundfont::GeneratorLayering;
use serde::{Deserialize, Serialize};

/// Sample interpolation used by voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,
    /// 4-point Hermite.
    #[default]
    Cubic,
}

/// What `sampleModes = 3` (loop until release) does at note-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopReleaseMode {
    /// Finish the current pass through the loop, then play the tail.
    #[default]
    FinishCycle,
    /// Leave the loop at once and continue from the loop end.
    JumpToTail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerSettings {
    pub sample_rate: u32,
    /// Samples per render block. Modulation is evaluated once per block.
    pub block_size: usize,
    /// Ceiling on simultaneously sounding voices.
    pub max_polyphony: usize,
    /// MIDI channels; at least 16.
    pub channel_count: usize,
    /// Seconds. Release stages are never shorter than this.
    pub min_release_time: f32,
    /// Seconds. Fade applied to stolen and exclusive-class-cut voices.
    pub steal_fade_time: f32,
    pub master_volume: f32,
    pub interpolation: Interpolation,
    pub layering: GeneratorLayering,
    pub loop_release: LoopReleaseMode,
    /// Capacity of the control-to-render command queue.
    pub command_capacity: usize,
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 64,
            max_polyphony: 256,
            channel_count: 16,
            min_release_time: 0.01,
            steal_fade_time: 0.005,
            master_volume: 1.0,
            interpolation: Interpolation::Cubic,
            layering: GeneratorLayering::Additive,
            loop_release: LoopReleaseMode::FinishCycle,
            command_capacity: 1024,
        }
    }
}

impl SynthesizerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} outside 8000..=192000",
                self.sample_rate
            )));
        }
        if !(1..=4096).contains(&self.block_size) {
            return Err(Error::InvalidConfig(format!(
                "block size {} outside 1..=4096",
                self.block_size
            )));
        }
        if self.max_polyphony == 0 {
            return Err(Error::InvalidConfig("max polyphony must be at least 1".into()));
        }
        if !(16..=256).contains(&self.channel_count) {
            return Err(Error::InvalidConfig(format!(
                "channel count {} outside 16..=256",
                self.channel_count
            )));
        }
        if !(self.min_release_time >= 0.0 && self.steal_fade_time >= 0.0) {
            return Err(Error::InvalidConfig("negative release or fade time".into()));
        }
        if !(self.master_volume.is_finite() && self.master_volume >= 0.0) {
            return Err(Error::InvalidConfig("master volume must be finite and >= 0".into()));
        }
        if self.command_capacity < 16 {
            return Err(Error::InvalidConfig("command capacity must be at least 16".into()));
        }
        Ok(())
    }

    /// Duration of one render block in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / f64::from(self.sample_rate)
    }

    pub(crate) fn steal_fade_samples(&self) -> u32 {
        ((self.steal_fade_time * self.sample_rate as f32) as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        SynthesizerSettings::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            SynthesizerSettings {
                sample_rate: 1000,
                ..Default::default()
            },
            SynthesizerSettings {
                block_size: 0,
                ..Default::default()
            },
            SynthesizerSettings {
                max_polyphony: 0,
                ..Default::default()
            },
            SynthesizerSettings {
                channel_count: 8,
                ..Default::default()
            },
            SynthesizerSettings {
                master_volume: f32::NAN,
                ..Default::default()
            },
        ];
        for s in bad {
            assert!(s.validate().is_err(), "{s:?} should be rejected");
        }
    }

    #[test]
    fn test_block_duration() {
        let s = SynthesizerSettings::default();
        assert!((s.block_duration() - 64.0 / 44_100.0).abs() < 1e-12);
        assert_eq!(s.steal_fade_samples(), 220);
    }
}
