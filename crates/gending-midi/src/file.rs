//! Standard MIDI File decoding on top of `midly`.
//!
//! `midly` handles chunks, running status and RMID containers; this module
//! turns its borrowed events into owned absolute-tick [`TimedEvent`]s and
//! collects the data warnings the sequencer reports.

use crate::error::{FormatError, Result, SequencerDataWarning};
use crate::event::{MetaEvent, MetaKind, MidiEvent, TimedEvent};
use midly::{Fps, MetaMessage, MidiMessage, Timing, TrackEvent, TrackEventKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw decoded file: header fields and per-track absolute-tick events.
#[derive(Debug, Clone)]
pub struct MidiFile {
    pub format: u16,
    pub ticks_per_quarter: u16,
    pub tracks: Vec<Vec<TimedEvent>>,
    pub warnings: Vec<SequencerDataWarning>,
}

impl From<midly::Error> for FormatError {
    fn from(err: midly::Error) -> Self {
        FormatError::Malformed(err.to_string())
    }
}

/// Raw division word of an SMPTE header, as stored in the file.
fn timecode_division(fps: Fps, subframes: u8) -> u16 {
    let frames = (fps.as_int() as i8).wrapping_neg() as u8;
    u16::from_be_bytes([frames, subframes])
}

impl MidiFile {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !data.starts_with(b"MThd") && !data.starts_with(b"RIFF") {
            let head = &data[..data.len().min(4)];
            return Err(FormatError::UnknownContainer(
                String::from_utf8_lossy(head).into_owned(),
            ));
        }

        let (header, chunks) = midly::parse(data)?;
        let ticks_per_quarter = match header.timing {
            Timing::Metrical(tpq) if tpq.as_int() > 0 => tpq.as_int(),
            Timing::Metrical(_) => return Err(FormatError::UnsupportedTiming(0)),
            Timing::Timecode(fps, subframes) => {
                return Err(FormatError::UnsupportedTiming(timecode_division(fps, subframes)))
            }
        };
        let format = match header.format {
            midly::Format::SingleTrack => 0,
            midly::Format::Parallel => 1,
            midly::Format::Sequential => 2,
        };

        // before iteration the size hint is the header's track count
        let declared = u16::try_from(chunks.size_hint().0).unwrap_or(u16::MAX);
        let raw_tracks = chunks.collect_tracks()?;
        let found = u16::try_from(raw_tracks.len()).unwrap_or(u16::MAX);
        if found != declared {
            return Err(FormatError::TrackCountMismatch { declared, found });
        }

        let mut warnings = Vec::new();
        let tracks = raw_tracks
            .iter()
            .enumerate()
            .map(|(index, events)| convert_track(index, events, &mut warnings))
            .collect();

        debug!(format, tracks = found, ticks_per_quarter, "parsed MIDI file");
        Ok(Self {
            format,
            ticks_per_quarter,
            tracks,
            warnings,
        })
    }
}

fn convert_track(
    track: usize,
    events: &[TrackEvent<'_>],
    warnings: &mut Vec<SequencerDataWarning>,
) -> Vec<TimedEvent> {
    let mut out = Vec::with_capacity(events.len());
    let mut tick = 0u64;
    let mut ended = false;

    for ev in events {
        tick += u64::from(ev.delta.as_int());
        let event = match ev.kind {
            TrackEventKind::Midi { channel, message } => channel_event(channel.as_int(), message),
            TrackEventKind::SysEx(data) | TrackEventKind::Escape(data) => MidiEvent::SysEx(Arc::from(data)),
            TrackEventKind::Meta(message) => {
                let meta = meta_event(message);
                match meta.kind {
                    MetaKind::Unknown(kind) => {
                        debug!(track, tick, kind, "unknown meta event");
                        warnings.push(SequencerDataWarning::UnknownMetaEvent { track, tick, kind });
                    }
                    MetaKind::Tempo if meta.tempo() == Some(0) => {
                        warn!(track, tick, "tempo of zero, clamping");
                        warnings.push(SequencerDataWarning::ZeroTempo { tick });
                    }
                    _ => {}
                }
                let is_end = meta.kind == MetaKind::EndOfTrack;
                out.push(TimedEvent {
                    tick,
                    event: MidiEvent::Meta(meta),
                });
                if is_end {
                    ended = true;
                    break;
                }
                continue;
            }
        };
        out.push(TimedEvent { tick, event });
    }

    // a malformed event also cuts the track short before its end marker
    if !ended {
        warn!(track, "track has no end-of-track event");
        warnings.push(SequencerDataWarning::MissingEndOfTrack { track });
    }
    out
}

/// Note-on with velocity 0 becomes a note-off.
fn channel_event(channel: u8, message: MidiMessage) -> MidiEvent {
    match message {
        MidiMessage::NoteOff { key, vel } => MidiEvent::NoteOff {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => MidiEvent::NoteOff {
            channel,
            note: key.as_int(),
            velocity: 0,
        },
        MidiMessage::NoteOn { key, vel } => MidiEvent::NoteOn {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::Aftertouch { key, vel } => MidiEvent::PolyPressure {
            channel,
            note: key.as_int(),
            pressure: vel.as_int(),
        },
        MidiMessage::Controller { controller, value } => MidiEvent::ControlChange {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => MidiEvent::ProgramChange {
            channel,
            program: program.as_int(),
        },
        MidiMessage::ChannelAftertouch { vel } => MidiEvent::ChannelPressure {
            channel,
            pressure: vel.as_int(),
        },
        MidiMessage::PitchBend { bend } => MidiEvent::PitchBend {
            channel,
            value: bend.0.as_int(),
        },
    }
}

/// Re-encode a typed meta message as its type byte and raw payload.
fn meta_event(message: MetaMessage<'_>) -> MetaEvent {
    let (kind, data): (MetaKind, Arc<[u8]>) = match message {
        MetaMessage::TrackNumber(n) => (
            MetaKind::SequenceNumber,
            n.map(|n| Arc::from(&n.to_be_bytes()[..])).unwrap_or_else(|| Arc::from(&[][..])),
        ),
        MetaMessage::Text(t) => (MetaKind::Text, Arc::from(t)),
        MetaMessage::Copyright(t) => (MetaKind::Copyright, Arc::from(t)),
        MetaMessage::TrackName(t) => (MetaKind::TrackName, Arc::from(t)),
        MetaMessage::InstrumentName(t) => (MetaKind::InstrumentName, Arc::from(t)),
        MetaMessage::Lyric(t) => (MetaKind::Lyric, Arc::from(t)),
        MetaMessage::Marker(t) => (MetaKind::Marker, Arc::from(t)),
        MetaMessage::CuePoint(t) => (MetaKind::CuePoint, Arc::from(t)),
        MetaMessage::ProgramName(t) => (MetaKind::ProgramName, Arc::from(t)),
        MetaMessage::DeviceName(t) => (MetaKind::DeviceName, Arc::from(t)),
        MetaMessage::MidiChannel(c) => (MetaKind::ChannelPrefix, Arc::from(&[c.as_int()][..])),
        MetaMessage::MidiPort(p) => (MetaKind::Port, Arc::from(&[p.as_int()][..])),
        MetaMessage::EndOfTrack => (MetaKind::EndOfTrack, Arc::from(&[][..])),
        MetaMessage::Tempo(t) => (MetaKind::Tempo, Arc::from(&t.as_int().to_be_bytes()[1..])),
        MetaMessage::SmpteOffset(time) => {
            let rate = match time.fps() {
                Fps::Fps24 => 0u8,
                Fps::Fps25 => 1,
                Fps::Fps29 => 2,
                Fps::Fps30 => 3,
            };
            let bytes = [
                rate << 5 | time.hour(),
                time.minute(),
                time.second(),
                time.frame(),
                time.subframe(),
            ];
            (MetaKind::SmpteOffset, Arc::from(&bytes[..]))
        }
        MetaMessage::TimeSignature(n, d, clocks, notes) => {
            (MetaKind::TimeSignature, Arc::from(&[n, d, clocks, notes][..]))
        }
        MetaMessage::KeySignature(sharps, minor) => (
            MetaKind::KeySignature,
            Arc::from(&[sharps as u8, u8::from(minor)][..]),
        ),
        MetaMessage::SequencerSpecific(d) => (MetaKind::SequencerSpecific, Arc::from(d)),
        MetaMessage::Unknown(kind, d) => (MetaKind::from_byte(kind), Arc::from(d)),
    };
    MetaEvent { kind, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smf(tracks: &[&[u8]], declared: u16) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&declared.to_be_bytes());
        out.extend_from_slice(&480u16.to_be_bytes());
        for t in tracks {
            out.extend_from_slice(b"MTrk");
            out.extend_from_slice(&(t.len() as u32).to_be_bytes());
            out.extend_from_slice(t);
        }
        out
    }

    const EOT: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

    #[test]
    fn test_running_status() {
        let mut track = vec![
            0x00, 0x90, 60, 100, // note on
            0x60, 62, 90, // running status note on
            0x60, 60, 0, // running status, vel 0 -> note off
        ];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        let ev = &file.tracks[0];
        assert_eq!(ev.len(), 4);
        assert_eq!(ev[1].tick, 0x60);
        assert_eq!(
            ev[1].event,
            MidiEvent::NoteOn {
                channel: 0,
                note: 62,
                velocity: 90
            }
        );
        assert_eq!(ev[2].tick, 0xC0);
        assert!(matches!(ev[2].event, MidiEvent::NoteOff { note: 60, velocity: 0, .. }));
        assert!(file.warnings.is_empty());
    }

    #[test]
    fn test_channel_messages_decode() {
        let mut track = vec![
            0x00, 0xB3, 7, 90, // volume on channel 3
            0x00, 0xC3, 14, // program
            0x00, 0xE3, 0x00, 0x40, // centred bend
            0x00, 0xA3, 60, 30, // poly pressure
            0x00, 0xD3, 50, // channel pressure
        ];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        let events: Vec<&MidiEvent> = file.tracks[0].iter().map(|e| &e.event).collect();
        assert_eq!(
            events[..5],
            [
                &MidiEvent::ControlChange {
                    channel: 3,
                    controller: 7,
                    value: 90
                },
                &MidiEvent::ProgramChange {
                    channel: 3,
                    program: 14
                },
                &MidiEvent::PitchBend {
                    channel: 3,
                    value: 8192
                },
                &MidiEvent::PolyPressure {
                    channel: 3,
                    note: 60,
                    pressure: 30
                },
                &MidiEvent::ChannelPressure {
                    channel: 3,
                    pressure: 50
                },
            ]
        );
    }

    #[test]
    fn test_meta_cancels_running_status() {
        // the data bytes after the meta event have no status: the track stops there
        let mut track = vec![0x00, 0x90, 60, 100, 0x00, 0xFF, 0x01, 0x01, b'x', 0x00, 62, 90];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        assert_eq!(file.tracks[0].len(), 2);
        assert_eq!(
            file.warnings,
            vec![SequencerDataWarning::MissingEndOfTrack { track: 0 }]
        );
    }

    #[test]
    fn test_track_count_mismatch() {
        let err = MidiFile::parse(&smf(&[&EOT, &EOT], 3)).unwrap_err();
        assert_eq!(
            err,
            FormatError::TrackCountMismatch {
                declared: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_truncated_track_keeps_complete_events() {
        let mut track = vec![0x00, 0x90, 60, 100];
        track.extend_from_slice(&EOT);
        let mut data = smf(&[&track], 1);
        data.truncate(data.len() - 2);
        let file = MidiFile::parse(&data).unwrap();
        assert_eq!(file.tracks[0].len(), 1);
        assert!(file.tracks[0][0].event.is_note_on());
        assert_eq!(
            file.warnings,
            vec![SequencerDataWarning::MissingEndOfTrack { track: 0 }]
        );
    }

    #[test]
    fn test_invalid_format_is_malformed() {
        let mut data = smf(&[&EOT], 1);
        data[9] = 7;
        assert!(matches!(
            MidiFile::parse(&data).unwrap_err(),
            FormatError::Malformed(_)
        ));
    }

    #[test]
    fn test_unknown_meta_preserved() {
        let mut track = vec![0x10, 0xFF, 0x4B, 0x02, 0xAB, 0xCD];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        match &file.tracks[0][0].event {
            MidiEvent::Meta(meta) => {
                assert_eq!(meta.kind, MetaKind::Unknown(0x4B));
                assert_eq!(&*meta.data, &[0xAB, 0xCD]);
            }
            other => panic!("expected meta, got {other:?}"),
        }
        assert_eq!(
            file.warnings,
            vec![SequencerDataWarning::UnknownMetaEvent {
                track: 0,
                tick: 0x10,
                kind: 0x4B
            }]
        );
    }

    #[test]
    fn test_meta_payloads_keep_file_bytes() {
        let mut track = vec![
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0xFF, 0x58, 0x04, 3, 2, 24, 8, // 3/4
            0x00, 0xFF, 0x59, 0x02, 0xFE, 0x01, // two flats, minor
            0x00, 0xFF, 0x06, 0x05, b'i', b'n', b't', b'r', b'o',
        ];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        let metas: Vec<&MetaEvent> = file.tracks[0]
            .iter()
            .filter_map(|e| match &e.event {
                MidiEvent::Meta(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(metas[0].tempo(), Some(500_000));
        assert_eq!(&*metas[1].data, &[3, 2, 24, 8]);
        assert_eq!(&*metas[2].data, &[0xFE, 0x01]);
        assert_eq!(metas[3].text().as_deref(), Some("intro"));
        assert_eq!(metas[4].kind, MetaKind::EndOfTrack);
    }

    #[test]
    fn test_zero_tempo_warns() {
        let mut track = vec![0x00, 0xFF, 0x51, 0x03, 0x00, 0x00, 0x00];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        assert_eq!(file.warnings, vec![SequencerDataWarning::ZeroTempo { tick: 0 }]);
    }

    #[test]
    fn test_sysex_captured() {
        let mut track = vec![0x00, 0xF0, 0x05, 0x7E, 0x7F, 0x09, 0x01, 0xF7];
        track.extend_from_slice(&EOT);
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        assert_eq!(
            file.tracks[0][0].event,
            MidiEvent::SysEx(Arc::from(&[0x7E, 0x7F, 0x09, 0x01, 0xF7][..]))
        );
    }

    #[test]
    fn test_unknown_chunks_skipped() {
        let mut data = smf(&[&EOT], 1);
        data.extend_from_slice(b"XFIH");
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&[1, 2]);
        assert_eq!(MidiFile::parse(&data).unwrap().tracks.len(), 1);
    }

    #[test]
    fn test_missing_end_of_track_warns() {
        let track = [0x00, 0x90, 60, 100];
        let file = MidiFile::parse(&smf(&[&track], 1)).unwrap();
        assert_eq!(
            file.warnings,
            vec![SequencerDataWarning::MissingEndOfTrack { track: 0 }]
        );
    }

    #[test]
    fn test_smpte_rejected() {
        let mut data = smf(&[&EOT], 1);
        data[12] = 0xE7;
        data[13] = 0x28;
        assert_eq!(
            MidiFile::parse(&data).unwrap_err(),
            FormatError::UnsupportedTiming(0xE728)
        );
    }

    #[test]
    fn test_zero_division_rejected() {
        let mut data = smf(&[&EOT], 1);
        data[12] = 0;
        data[13] = 0;
        assert_eq!(
            MidiFile::parse(&data).unwrap_err(),
            FormatError::UnsupportedTiming(0)
        );
    }

    #[test]
    fn test_rmid_wrapper() {
        let inner = smf(&[&EOT], 1);
        let mut body = b"RMID".to_vec();
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(inner.len() as u32).to_le_bytes());
        body.extend_from_slice(&inner);
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        assert_eq!(MidiFile::parse(&data).unwrap().tracks.len(), 1);
    }

    #[test]
    fn test_riff_without_rmid_is_malformed() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"WAVE");
        assert!(matches!(
            MidiFile::parse(&data).unwrap_err(),
            FormatError::Malformed(_)
        ));
    }

    #[test]
    fn test_not_midi() {
        assert_eq!(
            MidiFile::parse(b"OggS....").unwrap_err(),
            FormatError::UnknownContainer("OggS".into())
        );
    }
}
