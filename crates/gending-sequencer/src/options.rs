//! Sequencer configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerOptions {
    /// Start a fresh song at its first note-on instead of tick 0.
    pub skip_to_first_note_on: bool,
    /// Begin playing as soon as a song is loaded.
    pub auto_play: bool,
    pub loop_enabled: bool,
    /// Load the next playlist entry when a non-looping song ends.
    pub auto_advance: bool,
    /// Seconds between `TimeChanged` notifications while playing.
    pub time_notify_interval: f64,
    pub min_playback_rate: f64,
    pub max_playback_rate: f64,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            skip_to_first_note_on: true,
            auto_play: true,
            loop_enabled: true,
            auto_advance: false,
            time_notify_interval: 0.1,
            min_playback_rate: 0.1,
            max_playback_rate: 8.0,
        }
    }
}

impl SequencerOptions {
    pub fn validate(&self) -> Result<()> {
        if !(self.time_notify_interval.is_finite() && self.time_notify_interval >= 0.0) {
            return Err(Error::InvalidConfig(
                "time notify interval must be finite and >= 0".into(),
            ));
        }
        if !(self.min_playback_rate > 0.0 && self.min_playback_rate <= self.max_playback_rate) {
            return Err(Error::InvalidConfig(format!(
                "playback rate range {}..={} is empty or not positive",
                self.min_playback_rate, self.max_playback_rate
            )));
        }
        if !self.max_playback_rate.is_finite() {
            return Err(Error::InvalidConfig("max playback rate must be finite".into()));
        }
        Ok(())
    }

    pub fn clamp_rate(&self, rate: f64) -> f64 {
        if rate.is_nan() {
            return 1.0_f64.clamp(self.min_playback_rate, self.max_playback_rate);
        }
        rate.clamp(self.min_playback_rate, self.max_playback_rate)
    }
}
