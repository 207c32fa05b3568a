//! Commands from the control context to the render context.
//!
//! [`SynthHandle`] pushes into a bounded SPSC ring; the synthesizer drains
//! it at the start of every render block, in enqueue order.

use crate::control::SynthControl;
use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum SynthCommand {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControllerChange { channel: u8, controller: u8, value: u8, lock: bool },
    UnlockController { channel: u8, controller: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: u16 },
    ChannelPressure { channel: u8, pressure: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    SystemExclusive(Arc<[u8]>),
    AllNotesOff(Option<u8>),
    AllSoundOff(Option<u8>),
    ResetAllControllers(Option<u8>),
    ResetSystem,
    SetMasterVolume(f32),
}

pub(crate) fn command_queue(capacity: usize) -> (SynthHandle, HeapCons<SynthCommand>) {
    let rb = HeapRb::<SynthCommand>::new(capacity);
    let (producer, consumer) = rb.split();
    (
        SynthHandle {
            producer: Arc::new(Mutex::new(producer)),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        consumer,
    )
}

/// Cloneable control-side handle to a [`Synthesizer`](crate::Synthesizer).
///
/// The mutex only serializes producers on the control side; the render side
/// pops without locking.
#[derive(Clone)]
pub struct SynthHandle {
    producer: Arc<Mutex<HeapProd<SynthCommand>>>,
    dropped: Arc<AtomicU64>,
}

impl SynthHandle {
    /// Returns false when the queue was full and the command was dropped.
    pub fn send(&self, command: SynthCommand) -> bool {
        let pushed = self.producer.lock().try_push(command).is_ok();
        if !pushed {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if n.is_power_of_two() {
                warn!(dropped = n, "synth command queue full, dropping command");
            }
        }
        pushed
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn unlock_controller(&self, channel: u8, controller: u8) {
        self.send(SynthCommand::UnlockController {
            channel,
            controller,
        });
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.send(SynthCommand::SetMasterVolume(volume));
    }
}

impl std::fmt::Debug for SynthHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthHandle")
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

impl SynthControl for SynthHandle {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(SynthCommand::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        self.send(SynthCommand::NoteOff { channel, note });
    }

    fn controller_change(&mut self, channel: u8, controller: u8, value: u8, lock: bool) {
        self.send(SynthCommand::ControllerChange {
            channel,
            controller,
            value,
            lock,
        });
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        self.send(SynthCommand::ProgramChange { channel, program });
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        self.send(SynthCommand::PitchBend { channel, value });
    }

    fn channel_pressure(&mut self, channel: u8, pressure: u8) {
        self.send(SynthCommand::ChannelPressure { channel, pressure });
    }

    fn poly_pressure(&mut self, channel: u8, note: u8, pressure: u8) {
        self.send(SynthCommand::PolyPressure {
            channel,
            note,
            pressure,
        });
    }

    fn system_exclusive(&mut self, data: &[u8]) {
        self.send(SynthCommand::SystemExclusive(Arc::from(data)));
    }

    fn all_notes_off(&mut self, channel: Option<u8>) {
        self.send(SynthCommand::AllNotesOff(channel));
    }

    fn all_sound_off(&mut self, channel: Option<u8>) {
        self.send(SynthCommand::AllSoundOff(channel));
    }

    fn reset_all_controllers(&mut self, channel: Option<u8>) {
        self.send(SynthCommand::ResetAllControllers(channel));
    }

    fn reset_system(&mut self) {
        self.send(SynthCommand::ResetSystem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    #[test]
    fn test_commands_keep_order() {
        let (mut handle, mut consumer) = command_queue(16);
        handle.note_on(0, 60, 100);
        handle.controller_change(0, 7, 50, true);
        handle.note_off(0, 60);
        assert_eq!(
            consumer.try_pop(),
            Some(SynthCommand::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            })
        );
        assert!(matches!(
            consumer.try_pop(),
            Some(SynthCommand::ControllerChange { lock: true, .. })
        ));
        assert!(matches!(consumer.try_pop(), Some(SynthCommand::NoteOff { .. })));
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    fn test_full_queue_drops() {
        let (handle, _consumer) = command_queue(2);
        assert!(handle.send(SynthCommand::ResetSystem));
        assert!(handle.send(SynthCommand::ResetSystem));
        assert!(!handle.send(SynthCommand::ResetSystem));
        assert_eq!(handle.dropped_count(), 1);
    }
}
