//! Player configuration.

use crate::{Error, Result};
use gending_sequencer::SequencerOptions;
use gending_synth::SynthesizerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for a [`Player`](crate::Player): synthesizer settings,
/// sequencer options and the sizes of the queues between the two contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub synth: SynthesizerSettings,
    pub sequencer: SequencerOptions,
    /// Transport commands buffered between control and render side.
    pub transport_capacity: usize,
    /// Notifications buffered between render side and subscribers.
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            synth: SynthesizerSettings::default(),
            sequencer: SequencerOptions::default(),
            transport_capacity: 64,
            event_capacity: 4096,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        self.synth.validate()?;
        self.sequencer.validate()?;
        if self.transport_capacity == 0 {
            return Err(Error::InvalidConfig(
                "transport_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
