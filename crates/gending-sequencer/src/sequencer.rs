//! Song transport and tick scheduler.
//!
//! The sequencer owns no audio. Each render quantum the caller passes the
//! elapsed real time and the synthesizer's control surface to
//! [`Sequencer::advance`], which converts time to ticks through the song's
//! tempo map and dispatches every due event in tick order across tracks.

use crate::error::{Error, Result};
use crate::options::SequencerOptions;
use crate::snapshot::Snapshot;
use crate::state::PlaybackState;
use gending_core::{EventPublisher, Notification};
use gending_midi::{LoopRegion, MidiEvent, Song};
use gending_synth::SynthControl;
use std::sync::Arc;
use tracing::debug;

/// Loop wraps handled within one `advance` call. Leftover time past the
/// last pass is dropped.
const MAX_LOOP_PASSES: usize = 64;

/// Slack when rounding a seek target up to the first tick still to play.
const TICK_EPSILON: f64 = 1e-6;

pub struct Sequencer {
    options: SequencerOptions,
    playlist: Vec<Arc<Song>>,
    index: Option<usize>,
    song: Option<Arc<Song>>,
    state: PlaybackState,
    /// Per-track index of the next event to dispatch.
    cursors: Vec<usize>,
    /// Cursor positions and channel state at the loop start, captured on load.
    loop_cursors: Vec<usize>,
    loop_snapshot: Option<Snapshot>,
    /// Fractional tick. Every event at or before `floor(position)` is behind us.
    position: f64,
    playback_rate: f64,
    loop_enabled: bool,
    at_end: bool,
    last_time_notify: f64,
    publisher: EventPublisher,
}

impl Sequencer {
    pub fn new(options: SequencerOptions) -> Result<Self> {
        options.validate()?;
        let loop_enabled = options.loop_enabled;
        Ok(Self {
            options,
            playlist: Vec::new(),
            index: None,
            song: None,
            state: PlaybackState::Stopped,
            cursors: Vec::new(),
            loop_cursors: Vec::new(),
            loop_snapshot: None,
            position: 0.0,
            playback_rate: 1.0,
            loop_enabled,
            at_end: false,
            last_time_notify: f64::NEG_INFINITY,
            publisher: EventPublisher::detached(),
        })
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn set_publisher(&mut self, publisher: EventPublisher) {
        self.publisher = publisher;
    }

    pub fn options(&self) -> &SequencerOptions {
        &self.options
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn song(&self) -> Option<&Arc<Song>> {
        self.song.as_ref()
    }

    pub fn song_index(&self) -> Option<usize> {
        self.index
    }

    pub fn playlist(&self) -> &[Arc<Song>] {
        &self.playlist
    }

    /// Current position in ticks, fractional.
    pub fn current_tick(&self) -> f64 {
        self.position
    }

    /// Current position in song seconds (unaffected by playback rate).
    pub fn current_time(&self) -> f64 {
        self.song
            .as_ref()
            .map_or(0.0, |song| song.tick_to_seconds(self.position))
    }

    pub fn duration(&self) -> f64 {
        self.song.as_ref().map_or(0.0, |song| song.duration)
    }

    /// Tempo in effect at the current position.
    pub fn current_bpm(&self) -> Option<f64> {
        self.song
            .as_ref()
            .map(|song| song.tempo_map.bpm_at(self.position as u64))
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// Clamped to the configured range. Takes effect on the next quantum.
    pub fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = self.options.clamp_rate(rate);
        debug!("Playback rate set to {}", self.playback_rate);
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
        debug!("Loop {}", if enabled { "enabled" } else { "disabled" });
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Start or resume from the current tick. A song that ran to its end
    /// starts over.
    pub fn play(&mut self, synth: &mut impl SynthControl) {
        let Some(song) = self.song.clone() else {
            return;
        };
        if self.at_end {
            let start = self.start_tick(&song);
            self.seek_tick(&song, start, synth);
        }
        if self.state != PlaybackState::Playing {
            self.state = PlaybackState::Playing;
            debug!("Sequencer playing at tick {:.1}", self.position);
        }
    }

    /// Stop advancing. Sounding voices are left alone.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            debug!("Sequencer paused at tick {:.1}", self.position);
        }
    }

    /// Release every note and rewind to tick 0.
    pub fn stop(&mut self, synth: &mut impl SynthControl) {
        if let Some(song) = self.song.clone() {
            self.seek_tick(&song, 0.0, synth);
        }
        self.state = PlaybackState::Stopped;
        debug!("Sequencer stopped");
    }

    /// Jump to `seconds` (clamped to the song). The transport state is kept.
    pub fn seek(&mut self, seconds: f64, synth: &mut impl SynthControl) {
        let Some(song) = self.song.clone() else {
            return;
        };
        let seconds = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, song.duration)
        };
        let tick = song.seconds_to_tick(seconds).min(song.end_tick as f64);
        self.seek_tick(&song, tick, synth);
        debug!("Seeked to {:.3}s (tick {:.1})", seconds, tick);
    }

    /// Notes are released; channel state is rebuilt as straight playback
    /// would have left it; dispatch resumes with the first event at or after
    /// `tick`.
    fn seek_tick(&mut self, song: &Song, tick: f64, synth: &mut impl SynthControl) {
        synth.all_notes_off(None);
        let tick = tick.max(0.0);
        let resume = (tick - TICK_EPSILON).max(0.0).ceil() as u64;
        Snapshot::capture_with(song, resume, &mut self.cursors).restore(synth);
        self.position = tick;
        self.at_end = false;
        self.notify_time(true);
    }

    // =========================================================================
    // Playlist
    // =========================================================================

    /// Replace the playlist and load its first song.
    pub fn load_songs(&mut self, songs: Vec<Arc<Song>>, synth: &mut impl SynthControl) {
        self.playlist = songs;
        if self.playlist.is_empty() {
            synth.all_notes_off(None);
            self.index = None;
            self.song = None;
            self.loop_snapshot = None;
            self.state = PlaybackState::Stopped;
            self.position = 0.0;
            debug!("Playlist cleared");
            return;
        }
        debug!("Loaded playlist of {} songs", self.playlist.len());
        self.load_song(0, synth);
    }

    pub fn select_song(&mut self, index: usize, synth: &mut impl SynthControl) -> Result<()> {
        if index >= self.playlist.len() {
            return Err(Error::SongIndexOutOfRange {
                index,
                len: self.playlist.len(),
            });
        }
        self.load_song(index, synth);
        Ok(())
    }

    /// Next song, wrapping to the first.
    pub fn next_song(&mut self, synth: &mut impl SynthControl) -> Result<()> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(Error::EmptyPlaylist);
        }
        let next = self.index.map_or(0, |i| (i + 1) % len);
        self.load_song(next, synth);
        Ok(())
    }

    /// Previous song, wrapping to the last.
    pub fn previous_song(&mut self, synth: &mut impl SynthControl) -> Result<()> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(Error::EmptyPlaylist);
        }
        let previous = self.index.map_or(0, |i| (i + len - 1) % len);
        self.load_song(previous, synth);
        Ok(())
    }

    fn start_tick(&self, song: &Song) -> f64 {
        if self.options.skip_to_first_note_on {
            song.first_note_on.unwrap_or(0) as f64
        } else {
            0.0
        }
    }

    /// Full reset of sequencer and synthesizer state, then position at the
    /// song's start.
    fn load_song(&mut self, index: usize, synth: &mut impl SynthControl) {
        let Some(song) = self.playlist.get(index).cloned() else {
            return;
        };
        synth.reset_system();

        let tracks = song.tracks.len();
        self.cursors.clear();
        self.cursors.resize(tracks, 0);
        self.loop_cursors.clear();
        self.loop_cursors.resize(tracks, 0);
        self.loop_snapshot = Some(Snapshot::capture_with(
            &song,
            song.loop_region.start,
            &mut self.loop_cursors,
        ));

        let start = self.start_tick(&song);
        if start > 0.0 {
            Snapshot::capture_with(&song, start.ceil() as u64, &mut self.cursors).restore(synth);
        }
        self.position = start;
        self.at_end = false;
        self.index = Some(index);
        self.song = Some(Arc::clone(&song));
        self.state = if self.options.auto_play {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        };

        debug!(
            "Loaded song {} '{}' ({} tracks, {:.2}s)",
            index, song.name, tracks, song.duration
        );
        self.publisher.publish(Notification::SongChanged {
            index,
            name: Arc::clone(&song.name),
        });
        self.notify_time(true);
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Loop region in effect, if looping applies to this song.
    fn active_loop(&self, song: &Song) -> Option<LoopRegion> {
        let region = song.loop_region;
        (self.loop_enabled && region.start < region.end).then_some(region)
    }

    /// Move the song forward by `elapsed` real seconds, scaled by the
    /// playback rate, and dispatch everything that became due.
    pub fn advance(&mut self, elapsed: f64, synth: &mut impl SynthControl) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(song) = self.song.clone() else {
            return;
        };
        let mut remaining = if elapsed.is_finite() {
            elapsed.max(0.0) * self.playback_rate
        } else {
            0.0
        };

        for _ in 0..MAX_LOOP_PASSES {
            let now = song.tick_to_seconds(self.position);
            let target = song.seconds_to_tick(now + remaining);

            if let Some(region) = self.active_loop(&song) {
                // at or past the loop end (after a seek) wrap before playing anything
                if self.position >= region.end as f64 {
                    self.wrap_to_loop_start(region, synth);
                    continue;
                }
                if target >= region.end as f64 {
                    self.dispatch_until(&song, region.end.saturating_sub(1), synth);
                    remaining = (now + remaining - song.tick_to_seconds(region.end as f64)).max(0.0);
                    self.wrap_to_loop_start(region, synth);
                    continue;
                }
            } else if target >= song.end_tick as f64 {
                self.dispatch_until(&song, song.end_tick, synth);
                self.position = song.end_tick as f64;
                self.finish_song(synth);
                return;
            }

            self.dispatch_until(&song, target.floor() as u64, synth);
            self.position = target;
            break;
        }
        self.notify_time(false);
    }

    fn wrap_to_loop_start(&mut self, region: LoopRegion, synth: &mut impl SynthControl) {
        synth.all_notes_off(None);
        if let Some(snapshot) = &self.loop_snapshot {
            snapshot.restore(synth);
        }
        self.cursors.copy_from_slice(&self.loop_cursors);
        self.position = region.start as f64;
        debug!("Looped back to tick {}", region.start);
    }

    fn finish_song(&mut self, synth: &mut impl SynthControl) {
        let Some(index) = self.index else {
            return;
        };
        self.publisher.publish(Notification::SongEnded { index });
        debug!("Song {} ended", index);

        if self.options.auto_advance && index + 1 < self.playlist.len() {
            self.load_song(index + 1, synth);
            self.state = PlaybackState::Playing;
            return;
        }
        self.state = PlaybackState::Paused;
        self.at_end = true;
        self.notify_time(true);
    }

    /// Dispatch, in tick order across tracks, every pending event whose tick
    /// is at most `limit`. Ties go to the lower track index.
    fn dispatch_until(&mut self, song: &Song, limit: u64, synth: &mut impl SynthControl) {
        loop {
            let mut best: Option<(usize, u64)> = None;
            for (t, (track, cursor)) in song.tracks.iter().zip(self.cursors.iter()).enumerate() {
                if let Some(e) = track.events.get(*cursor) {
                    if e.tick <= limit && best.map_or(true, |(_, bt)| e.tick < bt) {
                        best = Some((t, e.tick));
                    }
                }
            }
            let Some((t, tick)) = best else {
                break;
            };
            let event = &song.tracks[t].events[self.cursors[t]].event;
            self.cursors[t] += 1;
            self.dispatch(tick, event, synth);
        }
    }

    fn dispatch(&self, tick: u64, event: &MidiEvent, synth: &mut impl SynthControl) {
        match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => synth.note_on(*channel, *note, *velocity),
            MidiEvent::NoteOff { channel, note, .. } => synth.note_off(*channel, *note),
            MidiEvent::PolyPressure {
                channel,
                note,
                pressure,
            } => synth.poly_pressure(*channel, *note, *pressure),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => synth.controller_change(*channel, *controller, *value, false),
            MidiEvent::ProgramChange { channel, program } => synth.program_change(*channel, *program),
            MidiEvent::ChannelPressure { channel, pressure } => {
                synth.channel_pressure(*channel, *pressure)
            }
            MidiEvent::PitchBend { channel, value } => synth.pitch_bend(*channel, *value),
            MidiEvent::SysEx(data) => synth.system_exclusive(data),
            MidiEvent::Meta(meta) if meta.kind.is_text() => {
                self.publisher.publish(Notification::TextMetaEvent {
                    tick,
                    kind: meta.kind.to_byte(),
                    data: Arc::clone(&meta.data),
                });
            }
            // tempo lives in the tempo map; the rest has no runtime effect
            MidiEvent::Meta(_) => {}
        }
    }

    fn notify_time(&mut self, force: bool) {
        let Some(song) = &self.song else {
            return;
        };
        let current = song.tick_to_seconds(self.position);
        if force || (current - self.last_time_notify).abs() >= self.options.time_notify_interval {
            self.last_time_notify = current;
            self.publisher.publish(Notification::TimeChanged {
                current,
                duration: song.duration,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gending_core::EventBus;
    use gending_midi::{TempoMap, TimedEvent, Track};

    #[derive(Debug, Default)]
    struct Recorder {
        notes: Vec<(u8, u8)>,
        controllers: Vec<(u8, u8, u8)>,
        notes_off_all: usize,
        system_resets: usize,
    }

    impl SynthControl for Recorder {
        fn note_on(&mut self, channel: u8, note: u8, _velocity: u8) {
            self.notes.push((channel, note));
        }
        fn note_off(&mut self, _channel: u8, _note: u8) {}
        fn controller_change(&mut self, channel: u8, controller: u8, value: u8, _lock: bool) {
            self.controllers.push((channel, controller, value));
        }
        fn program_change(&mut self, _channel: u8, _program: u8) {}
        fn pitch_bend(&mut self, _channel: u8, _value: u16) {}
        fn channel_pressure(&mut self, _channel: u8, _pressure: u8) {}
        fn poly_pressure(&mut self, _channel: u8, _note: u8, _pressure: u8) {}
        fn system_exclusive(&mut self, _data: &[u8]) {}
        fn all_notes_off(&mut self, _channel: Option<u8>) {
            self.notes_off_all += 1;
        }
        fn all_sound_off(&mut self, _channel: Option<u8>) {}
        fn reset_all_controllers(&mut self, _channel: Option<u8>) {}
        fn reset_system(&mut self) {
            self.system_resets += 1;
        }
    }

    /// 480 tpq at 120 bpm: one tick is 1/960 s. Notes every quarter.
    fn quarter_notes(count: u64) -> Arc<Song> {
        let mut events: Vec<TimedEvent> = (0..count)
            .map(|i| TimedEvent {
                tick: i * 480,
                event: MidiEvent::NoteOn {
                    channel: 0,
                    note: 60 + i as u8,
                    velocity: 100,
                },
            })
            .collect();
        events.push(TimedEvent {
            tick: count * 480,
            event: MidiEvent::Meta(gending_midi::MetaEvent {
                kind: gending_midi::MetaKind::EndOfTrack,
                data: Arc::from(&[][..]),
            }),
        });
        let end_tick = count * 480;
        Arc::new(Song {
            name: Arc::from("quarters"),
            format: 0,
            tracks: vec![Track { name: None, events }],
            tempo_map: TempoMap::new(480),
            end_tick,
            first_note_on: Some(0),
            loop_region: LoopRegion { start: 0, end: end_tick },
            duration: end_tick as f64 / 960.0,
            warnings: Vec::new(),
        })
    }

    fn sequencer(options: SequencerOptions) -> Sequencer {
        Sequencer::new(options).unwrap()
    }

    #[test]
    fn test_auto_play_dispatches_first_note() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        assert_eq!(synth.system_resets, 1);
        assert_eq!(seq.state(), PlaybackState::Playing);
        seq.advance(0.01, &mut synth);
        assert_eq!(synth.notes, vec![(0, 60)]);
    }

    #[test]
    fn test_events_dispatch_once_in_order() {
        let mut seq = sequencer(SequencerOptions {
            loop_enabled: false,
            ..Default::default()
        });
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        for _ in 0..400 {
            seq.advance(0.01, &mut synth);
        }
        assert_eq!(synth.notes, vec![(0, 60), (0, 61), (0, 62), (0, 63)]);
        assert_eq!(seq.state(), PlaybackState::Paused);
        assert_eq!(seq.current_tick(), 1920.0);
    }

    #[test]
    fn test_playback_rate_scales_time() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        seq.set_playback_rate(2.0);
        seq.advance(0.5, &mut synth);
        assert!((seq.current_time() - 1.0).abs() < 1e-9);
        assert_eq!(synth.notes.len(), 3);

        seq.set_playback_rate(100.0);
        assert_eq!(seq.playback_rate(), 8.0);
    }

    #[test]
    fn test_pause_stops_dispatch_without_silencing() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        seq.advance(0.1, &mut synth);
        seq.pause();
        let before = synth.notes_off_all;
        seq.advance(1.0, &mut synth);
        assert_eq!(synth.notes.len(), 1);
        assert_eq!(synth.notes_off_all, before);
    }

    #[test]
    fn test_stop_rewinds() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        seq.advance(1.2, &mut synth);
        seq.stop(&mut synth);
        assert_eq!(seq.state(), PlaybackState::Stopped);
        assert_eq!(seq.current_tick(), 0.0);
        seq.play(&mut synth);
        seq.advance(0.01, &mut synth);
        assert_eq!(synth.notes.last(), Some(&(0, 60)));
    }

    #[test]
    fn test_loop_wraps_with_overflow() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(2)], &mut synth);
        // song is 1 s long; 1.25 s lands a quarter second into the second pass
        seq.advance(1.25, &mut synth);
        assert_eq!(synth.notes, vec![(0, 60), (0, 61), (0, 60)]);
        assert!((seq.current_time() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_song_end_publishes_and_auto_advances() {
        let bus = EventBus::new(256);
        let mut seq = sequencer(SequencerOptions {
            loop_enabled: false,
            auto_advance: true,
            ..Default::default()
        })
        .with_publisher(bus.publisher());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(1), quarter_notes(2)], &mut synth);
        seq.advance(0.6, &mut synth);
        assert_eq!(seq.song_index(), Some(1));
        assert_eq!(seq.state(), PlaybackState::Playing);

        let seen = bus.drain();
        let ended = seen
            .iter()
            .position(|n| matches!(n, Notification::SongEnded { index: 0 }))
            .unwrap();
        let changed = seen
            .iter()
            .position(|n| matches!(n, Notification::SongChanged { index: 1, .. }))
            .unwrap();
        assert!(ended < changed);
    }

    #[test]
    fn test_play_after_end_restarts() {
        let mut seq = sequencer(SequencerOptions {
            loop_enabled: false,
            ..Default::default()
        });
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(1)], &mut synth);
        seq.advance(1.0, &mut synth);
        assert_eq!(seq.state(), PlaybackState::Paused);
        seq.play(&mut synth);
        seq.advance(0.01, &mut synth);
        assert_eq!(synth.notes, vec![(0, 60), (0, 60)]);
    }

    #[test]
    fn test_playlist_navigation_wraps() {
        let mut seq = sequencer(SequencerOptions::default());
        let mut synth = Recorder::default();
        assert!(matches!(seq.next_song(&mut synth), Err(Error::EmptyPlaylist)));

        seq.load_songs(vec![quarter_notes(1), quarter_notes(2), quarter_notes(3)], &mut synth);
        seq.previous_song(&mut synth).unwrap();
        assert_eq!(seq.song_index(), Some(2));
        seq.next_song(&mut synth).unwrap();
        assert_eq!(seq.song_index(), Some(0));
        assert_eq!(synth.system_resets, 3);
        assert!(matches!(
            seq.select_song(5, &mut synth),
            Err(Error::SongIndexOutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn test_time_notifications_throttled() {
        let bus = EventBus::new(1024);
        let mut seq = sequencer(SequencerOptions::default()).with_publisher(bus.publisher());
        let mut synth = Recorder::default();
        seq.load_songs(vec![quarter_notes(4)], &mut synth);
        bus.drain();
        // 0.5 s in 1 ms steps
        for _ in 0..500 {
            seq.advance(0.001, &mut synth);
        }
        let times = bus
            .drain()
            .into_iter()
            .filter(|n| matches!(n, Notification::TimeChanged { .. }))
            .count();
        assert!((4..=6).contains(&times), "got {times}");
    }
}
