//! A parsed song: tracks, tempo map and loop region.

use crate::error::{Result, SequencerDataWarning};
use crate::event::{MetaKind, MidiEvent, TimedEvent};
use crate::file::MidiFile;
use crate::tempo_map::TempoMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Inclusive start, exclusive end, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub name: Option<String>,
    pub events: Vec<TimedEvent>,
}

/// Immutable, ready-to-sequence song.
#[derive(Debug, Clone)]
pub struct Song {
    pub name: Arc<str>,
    pub format: u16,
    pub tracks: Vec<Track>,
    pub tempo_map: TempoMap,
    /// Tick of the last event in any track.
    pub end_tick: u64,
    pub first_note_on: Option<u64>,
    pub loop_region: LoopRegion,
    /// Seconds at `end_tick`.
    pub duration: f64,
    pub warnings: Vec<SequencerDataWarning>,
}

const UNTITLED: &str = "Untitled";

fn marker_text(ev: &MidiEvent) -> Option<String> {
    match ev {
        MidiEvent::Meta(meta) if meta.kind == MetaKind::Marker => {
            meta.text().map(|t| t.trim().to_ascii_lowercase())
        }
        _ => None,
    }
}

impl Song {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_named(data, None)
    }

    /// `alt_name` (usually the file name) is used when no track carries a name.
    pub fn parse_named(data: &[u8], alt_name: Option<&str>) -> Result<Self> {
        Ok(Self::from_file(MidiFile::parse(data)?, alt_name))
    }

    pub fn from_file(file: MidiFile, alt_name: Option<&str>) -> Self {
        let MidiFile {
            format,
            ticks_per_quarter,
            tracks,
            warnings,
        } = file;

        let mut tempo_changes = Vec::new();
        let mut end_tick = 0u64;
        let mut first_note_on: Option<u64> = None;
        let mut marker_start = None;
        let mut marker_end = None;
        let mut cc111_start = None;

        let tracks: Vec<Track> = tracks
            .into_iter()
            .map(|events| {
                let mut name = None;
                for e in &events {
                    end_tick = end_tick.max(e.tick);
                    match &e.event {
                        MidiEvent::NoteOn { .. } => {
                            first_note_on = Some(first_note_on.map_or(e.tick, |t| t.min(e.tick)));
                        }
                        MidiEvent::ControlChange { controller: 111, .. } => {
                            cc111_start.get_or_insert(e.tick);
                        }
                        MidiEvent::Meta(meta) => {
                            if let Some(tempo) = meta.tempo() {
                                tempo_changes.push((e.tick, tempo));
                            }
                            if meta.kind == MetaKind::TrackName && name.is_none() {
                                name = meta.text().map(|t| t.trim().to_string());
                            }
                        }
                        _ => {}
                    }
                    match marker_text(&e.event).as_deref() {
                        Some("loopstart") => {
                            marker_start.get_or_insert(e.tick);
                        }
                        Some("loopend") => {
                            marker_end.get_or_insert(e.tick);
                        }
                        _ => {}
                    }
                }
                Track { name, events }
            })
            .collect();

        let tempo_map = TempoMap::from_changes(ticks_per_quarter, tempo_changes);

        let mut loop_region = LoopRegion {
            start: marker_start
                .or(cc111_start)
                .or(first_note_on)
                .unwrap_or(0),
            end: marker_end.unwrap_or(end_tick),
        };
        if loop_region.start >= loop_region.end {
            loop_region = LoopRegion {
                start: 0,
                end: end_tick,
            };
        }

        let name: Arc<str> = tracks
            .first()
            .and_then(|t| t.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| alt_name.map(str::to_string))
            .unwrap_or_else(|| UNTITLED.to_string())
            .into();

        let duration = tempo_map.tick_to_seconds(end_tick as f64);
        debug!(name = %name, tracks = tracks.len(), end_tick, duration, "song ready");

        Self {
            name,
            format,
            tracks,
            tempo_map,
            end_tick,
            first_note_on,
            loop_region,
            duration,
            warnings,
        }
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.tempo_map.ticks_per_quarter()
    }

    pub fn tick_to_seconds(&self, tick: f64) -> f64 {
        self.tempo_map.tick_to_seconds(tick)
    }

    pub fn seconds_to_tick(&self, seconds: f64) -> f64 {
        self.tempo_map.seconds_to_tick(seconds)
    }

    /// Bitmask of channels that carry any channel message.
    pub fn used_channels(&self) -> u32 {
        self.tracks
            .iter()
            .flat_map(|t| &t.events)
            .filter_map(|e| e.event.channel())
            .fold(0u32, |mask, ch| mask | (1 << ch))
    }
}
