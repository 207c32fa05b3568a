//! Decoded MIDI file events.

use std::sync::Arc;

/// Meta event type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKind {
    SequenceNumber,
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    ProgramName,
    DeviceName,
    ChannelPrefix,
    Port,
    EndOfTrack,
    Tempo,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    Unknown(u8),
}

impl MetaKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::SequenceNumber,
            0x01 => Self::Text,
            0x02 => Self::Copyright,
            0x03 => Self::TrackName,
            0x04 => Self::InstrumentName,
            0x05 => Self::Lyric,
            0x06 => Self::Marker,
            0x07 => Self::CuePoint,
            0x08 => Self::ProgramName,
            0x09 => Self::DeviceName,
            0x20 => Self::ChannelPrefix,
            0x21 => Self::Port,
            0x2F => Self::EndOfTrack,
            0x51 => Self::Tempo,
            0x54 => Self::SmpteOffset,
            0x58 => Self::TimeSignature,
            0x59 => Self::KeySignature,
            0x7F => Self::SequencerSpecific,
            other => Self::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::SequenceNumber => 0x00,
            Self::Text => 0x01,
            Self::Copyright => 0x02,
            Self::TrackName => 0x03,
            Self::InstrumentName => 0x04,
            Self::Lyric => 0x05,
            Self::Marker => 0x06,
            Self::CuePoint => 0x07,
            Self::ProgramName => 0x08,
            Self::DeviceName => 0x09,
            Self::ChannelPrefix => 0x20,
            Self::Port => 0x21,
            Self::EndOfTrack => 0x2F,
            Self::Tempo => 0x51,
            Self::SmpteOffset => 0x54,
            Self::TimeSignature => 0x58,
            Self::KeySignature => 0x59,
            Self::SequencerSpecific => 0x7F,
            Self::Unknown(b) => b,
        }
    }

    /// Types 0x01..=0x0F carry text (lyrics, markers, cue points).
    pub fn is_text(self) -> bool {
        matches!(self.to_byte(), 0x01..=0x0F)
    }
}

/// Meta event with its payload kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEvent {
    pub kind: MetaKind,
    pub data: Arc<[u8]>,
}

impl MetaEvent {
    /// Microseconds per quarter note for a well-formed tempo event.
    pub fn tempo(&self) -> Option<u32> {
        match (self.kind, &*self.data) {
            (MetaKind::Tempo, [a, b, c, ..]) => Some(u32::from_be_bytes([0, *a, *b, *c])),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<String> {
        self.kind
            .is_text()
            .then(|| String::from_utf8_lossy(&self.data).into_owned())
    }
}

/// One event from a track chunk.
///
/// Note-on with velocity 0 is decoded as [`MidiEvent::NoteOff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, 8192 is center.
    PitchBend { channel: u8, value: u16 },
    /// Payload after the `F0`/`F7` status, including any trailing `F7`.
    SysEx(Arc<[u8]>),
    Meta(MetaEvent),
}

impl MidiEvent {
    pub fn channel(&self) -> Option<u8> {
        match self {
            Self::NoteOff { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::PolyPressure { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => Some(*channel),
            Self::SysEx(_) | Self::Meta(_) => None,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, Self::NoteOn { .. })
    }
}

/// An event at an absolute tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub tick: u64,
    pub event: MidiEvent,
}
