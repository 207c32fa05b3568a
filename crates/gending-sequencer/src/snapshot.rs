//! Channel state as straight playback would leave it just before a tick.
//!
//! A seek or a loop jump skips the events in between, so the sequencer
//! captures a [`Snapshot`] from the song and replays it as plain controller
//! and program messages. Notes are never part of a snapshot.
//!
//! Everything here is fixed-size so replay can run on the render side.

use gending_midi::{MidiEvent, Song};
use gending_synth::channel::{cc, PITCH_BEND_CENTER};
use gending_synth::sysex::{self, SysExCommand, SysExParse};
use gending_synth::SynthControl;
use std::sync::Arc;

/// Channels addressable from a standard MIDI file.
pub const MIDI_CHANNELS: usize = 16;

/// Registered parameters tracked: bend range, fine tune, coarse tune.
const TRACKED_RPNS: usize = 3;

/// Data-entry values that select each tracked RPN's default.
const RPN_DEFAULTS: [(u8, u8); TRACKED_RPNS] = [(2, 0), (64, 0), (64, 0)];

/// Universal realtime master volume at full scale.
const FULL_MASTER_VOLUME: [u8; 8] = [0xF0, 0x7F, 0x7F, 0x04, 0x01, 0x7F, 0x7F, 0xF7];

/// Controllers that go through the RPN block instead of plain replay.
fn is_parameter_controller(controller: u8) -> bool {
    matches!(
        controller,
        cc::DATA_ENTRY
            | cc::DATA_ENTRY_LSB
            | cc::DATA_INCREMENT
            | cc::DATA_DECREMENT
            | cc::NRPN_LSB
            | cc::NRPN_MSB
            | cc::RPN_LSB
            | cc::RPN_MSB
    )
}

fn is_bank_select(controller: u8) -> bool {
    controller == cc::BANK_SELECT || controller == cc::BANK_SELECT_LSB
}

/// Channel mode messages (120..=127) carry no state to restore.
fn is_mode_message(controller: u8) -> bool {
    controller >= cc::ALL_SOUND_OFF
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    controllers: [u8; 128],
    /// Bit per controller written since the last reset.
    written: u128,
    program: Option<u8>,
    pitch_bend: Option<u16>,
    pressure: Option<u8>,
    /// Raw (data entry, data entry LSB) for RPN 0/0, 0/1 and 0/2.
    rpn: [Option<(u8, u8)>; TRACKED_RPNS],
    /// Last selection was an NRPN rather than an RPN.
    nrpn_selected: bool,
}

impl ChannelState {
    fn new() -> Self {
        let mut controllers = [0u8; 128];
        for c in [cc::RPN_MSB, cc::RPN_LSB, cc::NRPN_MSB, cc::NRPN_LSB] {
            controllers[usize::from(c)] = 127;
        }
        Self {
            controllers,
            written: 0,
            program: None,
            pitch_bend: None,
            pressure: None,
            rpn: [None; TRACKED_RPNS],
            nrpn_selected: false,
        }
    }

    fn value(&self, controller: u8) -> u8 {
        self.controllers[usize::from(controller)]
    }

    fn selected_rpn(&self) -> Option<usize> {
        if self.nrpn_selected || self.value(cc::RPN_MSB) != 0 {
            return None;
        }
        let lsb = usize::from(self.value(cc::RPN_LSB));
        (lsb < TRACKED_RPNS).then_some(lsb)
    }

    /// Controller reset keeps bank select and RPN values.
    fn reset_controllers(&mut self) {
        let fresh = Self::new();
        let bank_mask = (1u128 << cc::BANK_SELECT) | (1u128 << cc::BANK_SELECT_LSB);
        for c in 0..128u8 {
            if !is_bank_select(c) {
                self.controllers[usize::from(c)] = fresh.controllers[usize::from(c)];
            }
        }
        self.written &= bank_mask;
        self.pitch_bend = None;
        self.pressure = None;
        self.nrpn_selected = false;
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        match controller {
            cc::RESET_ALL_CONTROLLERS => return self.reset_controllers(),
            c if is_mode_message(c) => return,
            _ => {}
        }
        self.controllers[usize::from(controller)] = value;
        self.written |= 1u128 << controller;

        match controller {
            cc::RPN_MSB | cc::RPN_LSB => self.nrpn_selected = false,
            cc::NRPN_MSB | cc::NRPN_LSB => self.nrpn_selected = true,
            cc::DATA_ENTRY | cc::DATA_ENTRY_LSB => {
                if controller == cc::DATA_ENTRY {
                    self.controllers[usize::from(cc::DATA_ENTRY_LSB)] = 0;
                }
                if let Some(p) = self.selected_rpn() {
                    self.rpn[p] = Some((self.value(cc::DATA_ENTRY), self.value(cc::DATA_ENTRY_LSB)));
                }
            }
            cc::DATA_INCREMENT | cc::DATA_DECREMENT => {
                // only the bend range responds to increment/decrement
                if self.selected_rpn() == Some(0) {
                    let (msb, lsb) = self.rpn[0].unwrap_or(RPN_DEFAULTS[0]);
                    let msb = if controller == cc::DATA_INCREMENT {
                        msb.saturating_add(1).min(127)
                    } else {
                        msb.saturating_sub(1)
                    };
                    self.rpn[0] = Some((msb, lsb));
                }
            }
            _ => {}
        }
    }
}

/// What a song ever does to a channel, so replay can undo drift caused by
/// events past the snapshot tick.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelUsage {
    controllers: u128,
    program: bool,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    tick: u64,
    channels: [ChannelState; MIDI_CHANNELS],
    usage: [ChannelUsage; MIDI_CHANNELS],
    used_channels: u32,
    master_volume: Option<Arc<[u8]>>,
    song_sets_master_volume: bool,
}

impl Snapshot {
    /// Capture the state left by every event strictly before `tick`.
    pub fn capture(song: &Song, tick: u64) -> Self {
        let mut cursors = vec![0usize; song.tracks.len()];
        Self::capture_with(song, tick, &mut cursors)
    }

    /// Like [`capture`](Self::capture) with caller-owned track cursors.
    /// On return each cursor indexes its track's first event at or after
    /// `tick`, which is where playback from `tick` resumes.
    pub fn capture_with(song: &Song, tick: u64, cursors: &mut [usize]) -> Self {
        let mut snapshot = Self {
            tick,
            channels: [ChannelState::new(); MIDI_CHANNELS],
            usage: [ChannelUsage::default(); MIDI_CHANNELS],
            used_channels: song.used_channels(),
            master_volume: None,
            song_sets_master_volume: false,
        };

        for track in &song.tracks {
            for timed in &track.events {
                snapshot.note_usage(&timed.event);
            }
        }

        cursors.fill(0);
        // merge tracks by tick, earlier track first on ties
        loop {
            let mut best: Option<(usize, u64)> = None;
            for (t, (track, cursor)) in song.tracks.iter().zip(cursors.iter()).enumerate() {
                if let Some(e) = track.events.get(*cursor) {
                    if e.tick < tick && best.map_or(true, |(_, bt)| e.tick < bt) {
                        best = Some((t, e.tick));
                    }
                }
            }
            let Some((t, _)) = best else {
                break;
            };
            let event = &song.tracks[t].events[cursors[t]].event;
            cursors[t] += 1;
            snapshot.apply(event);
        }
        snapshot
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn note_usage(&mut self, event: &MidiEvent) {
        match event {
            MidiEvent::ControlChange {
                channel, controller, ..
            } => {
                if let Some(u) = self.usage.get_mut(usize::from(*channel)) {
                    u.controllers |= 1u128 << (controller & 0x7F);
                }
            }
            MidiEvent::ProgramChange { channel, .. } => {
                if let Some(u) = self.usage.get_mut(usize::from(*channel)) {
                    u.program = true;
                }
            }
            MidiEvent::SysEx(data) => {
                if let SysExParse::Command(SysExCommand::MasterVolume(_)) = sysex::parse(data) {
                    self.song_sets_master_volume = true;
                }
            }
            _ => {}
        }
    }

    fn apply(&mut self, event: &MidiEvent) {
        match event {
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => {
                if let Some(state) = self.channels.get_mut(usize::from(*channel)) {
                    state.control_change(controller & 0x7F, value & 0x7F);
                }
            }
            MidiEvent::ProgramChange { channel, program } => {
                if let Some(state) = self.channels.get_mut(usize::from(*channel)) {
                    state.program = Some(*program);
                }
            }
            MidiEvent::PitchBend { channel, value } => {
                if let Some(state) = self.channels.get_mut(usize::from(*channel)) {
                    state.pitch_bend = Some(*value);
                }
            }
            MidiEvent::ChannelPressure { channel, pressure } => {
                if let Some(state) = self.channels.get_mut(usize::from(*channel)) {
                    state.pressure = Some(*pressure);
                }
            }
            MidiEvent::SysEx(data) => match sysex::parse(data) {
                SysExParse::Command(SysExCommand::SystemReset) => {
                    self.channels = [ChannelState::new(); MIDI_CHANNELS];
                    self.master_volume = None;
                }
                SysExParse::Command(SysExCommand::MasterVolume(_)) => {
                    self.master_volume = Some(Arc::clone(data));
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Put the synthesizer's channels into the captured state.
    ///
    /// Order per channel: controller reset, bank select, program, plain
    /// controllers, RPN block, pitch bend, pressure. Locked controllers keep
    /// their values because every write here is unlocked.
    pub fn restore(&self, synth: &mut impl SynthControl) {
        if let Some(payload) = &self.master_volume {
            synth.system_exclusive(payload);
        } else if self.song_sets_master_volume {
            synth.system_exclusive(&FULL_MASTER_VOLUME);
        }

        for (index, (state, usage)) in self.channels.iter().zip(&self.usage).enumerate() {
            let touched = state.written != 0
                || state.program.is_some()
                || state.pitch_bend.is_some()
                || state.pressure.is_some();
            if self.used_channels & (1 << index) == 0 && !touched {
                continue;
            }
            let channel = index as u8;
            synth.reset_all_controllers(Some(channel));

            for c in [cc::BANK_SELECT, cc::BANK_SELECT_LSB] {
                if state.written & (1u128 << c) != 0 || usage.controllers & (1u128 << c) != 0 {
                    synth.controller_change(channel, c, state.value(c), false);
                }
            }
            if state.program.is_some() || usage.program {
                synth.program_change(channel, state.program.unwrap_or(0));
            }

            for c in 0..128u8 {
                if is_bank_select(c) || is_parameter_controller(c) || is_mode_message(c) {
                    continue;
                }
                if state.written & (1u128 << c) != 0 {
                    synth.controller_change(channel, c, state.value(c), false);
                }
            }

            let parameter_mask = (0..128u8)
                .filter(|c| is_parameter_controller(*c))
                .fold(0u128, |m, c| m | (1u128 << c));
            if (usage.controllers | state.written) & parameter_mask != 0 {
                Self::restore_parameters(state, channel, synth);
            }

            if let Some(bend) = state.pitch_bend.filter(|b| *b != PITCH_BEND_CENTER) {
                synth.pitch_bend(channel, bend);
            }
            if let Some(pressure) = state.pressure.filter(|p| *p != 0) {
                synth.channel_pressure(channel, pressure);
            }
        }
    }

    /// Rewrites the tracked RPN values, then the raw data-entry and
    /// selection controllers, leaving the same selection active.
    fn restore_parameters(state: &ChannelState, channel: u8, synth: &mut impl SynthControl) {
        for (p, value) in state.rpn.iter().enumerate() {
            let (msb, lsb) = value.unwrap_or(RPN_DEFAULTS[p]);
            synth.controller_change(channel, cc::RPN_MSB, 0, false);
            synth.controller_change(channel, cc::RPN_LSB, p as u8, false);
            synth.controller_change(channel, cc::DATA_ENTRY, msb, false);
            synth.controller_change(channel, cc::DATA_ENTRY_LSB, lsb, false);
        }

        // null selection so the raw data values land without effect
        synth.controller_change(channel, cc::RPN_MSB, 127, false);
        synth.controller_change(channel, cc::RPN_LSB, 127, false);
        synth.controller_change(channel, cc::DATA_ENTRY, state.value(cc::DATA_ENTRY), false);
        synth.controller_change(channel, cc::DATA_ENTRY_LSB, state.value(cc::DATA_ENTRY_LSB), false);

        let (first, last) = if state.nrpn_selected {
            ([cc::RPN_MSB, cc::RPN_LSB], [cc::NRPN_MSB, cc::NRPN_LSB])
        } else {
            ([cc::NRPN_MSB, cc::NRPN_LSB], [cc::RPN_MSB, cc::RPN_LSB])
        };
        for c in first.into_iter().chain(last) {
            synth.controller_change(channel, c, state.value(c), false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gending_midi::{LoopRegion, TempoMap, TimedEvent, Track};

    #[derive(Debug, Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl SynthControl for Recorder {
        fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
            self.log.push(format!("on {channel} {note} {velocity}"));
        }
        fn note_off(&mut self, channel: u8, note: u8) {
            self.log.push(format!("off {channel} {note}"));
        }
        fn controller_change(&mut self, channel: u8, controller: u8, value: u8, _lock: bool) {
            self.log.push(format!("cc {channel} {controller} {value}"));
        }
        fn program_change(&mut self, channel: u8, program: u8) {
            self.log.push(format!("pc {channel} {program}"));
        }
        fn pitch_bend(&mut self, channel: u8, value: u16) {
            self.log.push(format!("bend {channel} {value}"));
        }
        fn channel_pressure(&mut self, channel: u8, pressure: u8) {
            self.log.push(format!("pressure {channel} {pressure}"));
        }
        fn poly_pressure(&mut self, _channel: u8, _note: u8, _pressure: u8) {}
        fn system_exclusive(&mut self, data: &[u8]) {
            self.log.push(format!("sysex {}", data.len()));
        }
        fn all_notes_off(&mut self, _channel: Option<u8>) {}
        fn all_sound_off(&mut self, _channel: Option<u8>) {}
        fn reset_all_controllers(&mut self, channel: Option<u8>) {
            self.log.push(format!("reset {channel:?}"));
        }
        fn reset_system(&mut self) {}
    }

    fn song(events: Vec<(u64, MidiEvent)>) -> Song {
        let events = events
            .into_iter()
            .map(|(tick, event)| TimedEvent { tick, event })
            .collect();
        Song {
            name: Arc::from("test"),
            format: 0,
            tracks: vec![Track { name: None, events }],
            tempo_map: TempoMap::new(480),
            end_tick: 1920,
            first_note_on: None,
            loop_region: LoopRegion { start: 0, end: 1920 },
            duration: 2.0,
            warnings: Vec::new(),
        }
    }

    fn cc_event(channel: u8, controller: u8, value: u8) -> MidiEvent {
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        }
    }

    #[test]
    fn test_capture_excludes_events_at_tick() {
        let s = song(vec![
            (0, cc_event(0, cc::VOLUME, 90)),
            (480, cc_event(0, cc::VOLUME, 20)),
        ]);
        let snap = Snapshot::capture(&s, 480);
        assert_eq!(snap.channels[0].value(cc::VOLUME), 90);
        let snap = Snapshot::capture(&s, 481);
        assert_eq!(snap.channels[0].value(cc::VOLUME), 20);
    }

    #[test]
    fn test_restore_order() {
        let s = song(vec![
            (0, cc_event(0, cc::VOLUME, 90)),
            (0, MidiEvent::ProgramChange { channel: 0, program: 12 }),
            (0, cc_event(0, cc::BANK_SELECT, 1)),
            (10, MidiEvent::PitchBend { channel: 0, value: 9000 }),
        ]);
        let mut rec = Recorder::default();
        Snapshot::capture(&s, 100).restore(&mut rec);
        assert_eq!(
            rec.log,
            vec!["reset Some(0)", "cc 0 0 1", "pc 0 12", "cc 0 7 90", "bend 0 9000"]
        );
    }

    #[test]
    fn test_program_reverts_when_changed_later() {
        let s = song(vec![(500, MidiEvent::ProgramChange { channel: 3, program: 40 })]);
        let mut rec = Recorder::default();
        Snapshot::capture(&s, 0).restore(&mut rec);
        assert_eq!(rec.log, vec!["reset Some(3)", "pc 3 0"]);
    }

    #[test]
    fn test_controller_reset_clears_earlier_writes() {
        let s = song(vec![
            (0, cc_event(1, cc::BANK_SELECT, 2)),
            (0, cc_event(1, cc::EXPRESSION, 50)),
            (5, cc_event(1, cc::RESET_ALL_CONTROLLERS, 0)),
        ]);
        let snap = Snapshot::capture(&s, 10);
        assert_eq!(snap.channels[1].value(cc::EXPRESSION), 0);
        assert_eq!(snap.channels[1].written, 1u128 << cc::BANK_SELECT);
        assert_eq!(snap.channels[1].value(cc::BANK_SELECT), 2);
    }

    #[test]
    fn test_bend_range_tracked() {
        let s = song(vec![
            (0, cc_event(0, cc::RPN_MSB, 0)),
            (0, cc_event(0, cc::RPN_LSB, 0)),
            (0, cc_event(0, cc::DATA_ENTRY, 12)),
            (0, cc_event(0, cc::DATA_INCREMENT, 0)),
            (0, cc_event(0, cc::NRPN_MSB, 1)),
            (0, cc_event(0, cc::DATA_ENTRY, 99)),
        ]);
        let snap = Snapshot::capture(&s, 1);
        assert_eq!(snap.channels[0].rpn[0], Some((13, 0)));
        assert!(snap.channels[0].nrpn_selected);
        assert_eq!(snap.channels[0].rpn[1], None);
    }

    #[test]
    fn test_data_entry_msb_drops_previous_lsb() {
        let s = song(vec![
            (0, cc_event(0, cc::RPN_MSB, 0)),
            (0, cc_event(0, cc::RPN_LSB, 1)),
            (0, cc_event(0, cc::DATA_ENTRY, 64)),
            (0, cc_event(0, cc::DATA_ENTRY_LSB, 50)),
            (0, cc_event(0, cc::RPN_LSB, 0)),
            (0, cc_event(0, cc::DATA_ENTRY, 12)),
        ]);
        let snap = Snapshot::capture(&s, 1);
        assert_eq!(snap.channels[0].rpn[1], Some((64, 50)));
        assert_eq!(snap.channels[0].rpn[0], Some((12, 0)));
        assert_eq!(snap.channels[0].value(cc::DATA_ENTRY_LSB), 0);
    }

    #[test]
    fn test_system_reset_sysex_clears_state() {
        let s = song(vec![
            (0, cc_event(0, cc::VOLUME, 10)),
            (5, MidiEvent::SysEx(Arc::from(&[0x7E, 0x7F, 0x09, 0x01, 0xF7][..]))),
        ]);
        let snap = Snapshot::capture(&s, 10);
        assert_eq!(snap.channels[0].written, 0);
    }

    #[test]
    fn test_cursors_left_at_resume_point() {
        let s = song(vec![
            (0, cc_event(0, cc::VOLUME, 90)),
            (480, cc_event(0, cc::VOLUME, 80)),
            (480, cc_event(0, cc::VOLUME, 70)),
            (960, cc_event(0, cc::VOLUME, 60)),
        ]);
        let mut cursors = [7usize];
        Snapshot::capture_with(&s, 480, &mut cursors);
        assert_eq!(cursors, [1]);
        Snapshot::capture_with(&s, 2000, &mut cursors);
        assert_eq!(cursors, [4]);
    }

    #[test]
    fn test_master_volume_replayed() {
        let payload: Arc<[u8]> = Arc::from(&[0x7F, 0x7F, 0x04, 0x01, 0x00, 0x40, 0xF7][..]);
        let s = song(vec![(0, MidiEvent::SysEx(Arc::clone(&payload)))]);
        let mut rec = Recorder::default();
        Snapshot::capture(&s, 0).restore(&mut rec);
        assert_eq!(rec.log, vec!["sysex 8"]);

        let mut rec = Recorder::default();
        Snapshot::capture(&s, 1).restore(&mut rec);
        assert_eq!(rec.log, vec!["sysex 7"]);
    }
}
