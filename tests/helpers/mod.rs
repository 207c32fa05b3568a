//! Test helpers and fixtures for gending integration tests.
//!
//! Everything renders offline through [`Player::render`]; no audio device is
//! opened.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `TIME_EPSILON` (0.01 s): transport position after a rendered span
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use gending::prelude::*;
use gending::soundfont::fixtures::{single_zone_bank, SampleSpec};
use gending::soundfont::GeneratorType;
use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// Default test sample rate
pub const TEST_SAMPLE_RATE: u32 = 44_100;

/// Buffer size handed to `render`, deliberately not a multiple of the block.
pub const TEST_BUFFER_SIZE: usize = 500;

/// Ticks per quarter note of generated songs. At the default 120 bpm this
/// is 960 ticks per second.
pub const TPQ: u16 = 480;

// =============================================================================
// Sound bank and player
// =============================================================================

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// One looping 441 Hz sine covering every key.
pub fn sine_bank() -> Vec<u8> {
    single_zone_bank(
        SampleSpec::sine("sine", 4410, TEST_SAMPLE_RATE, 69, 441.0),
        (0, 127),
        &[(GeneratorType::SampleModes, 1)],
    )
}

/// Builder with the sine bank at the test sample rate.
pub fn test_builder() -> PlayerBuilder {
    init_tracing();
    Player::builder()
        .sound_bank_bytes(sine_bank())
        .sample_rate(TEST_SAMPLE_RATE)
}

pub fn test_player() -> (Player, PlayerHandle) {
    test_builder()
        .looping(false)
        .build()
        .expect("Failed to create test player")
}

/// Render `seconds` of audio in `TEST_BUFFER_SIZE` chunks.
pub fn render_seconds(player: &mut Player, seconds: f64) -> (Vec<f32>, Vec<f32>) {
    let total = (seconds * f64::from(player.sample_rate())).round() as usize;
    let mut left = vec![0.0; total];
    let mut right = vec![0.0; total];
    for (l, r) in left
        .chunks_mut(TEST_BUFFER_SIZE)
        .zip(right.chunks_mut(TEST_BUFFER_SIZE))
    {
        player.render(l, r);
    }
    (left, right)
}

/// Render a single small buffer so queued commands are applied.
pub fn pump(player: &mut Player) {
    render_seconds(player, 0.005);
}

// =============================================================================
// Standard MIDI Files
// =============================================================================

pub fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind,
    }
}

pub fn channel_message(delta: u32, channel: u8, message: MidiMessage) -> TrackEvent<'static> {
    event(
        delta,
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message,
        },
    )
}

pub fn controller(delta: u32, channel: u8, cc: u8, value: u8) -> TrackEvent<'static> {
    channel_message(
        delta,
        channel,
        MidiMessage::Controller {
            controller: u7::new(cc),
            value: u7::new(value),
        },
    )
}

pub fn end_of_track(delta: u32) -> TrackEvent<'static> {
    event(delta, TrackEventKind::Meta(MetaMessage::EndOfTrack))
}

/// One note per key on channel 0, each half a second: on at the start of
/// its slot, off 420 ticks later.
pub fn melody_events(keys: &[u8]) -> Vec<TrackEvent<'static>> {
    let mut events = Vec::new();
    for (i, &key) in keys.iter().enumerate() {
        events.push(channel_message(
            if i == 0 { 0 } else { 60 },
            0,
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        ));
        events.push(channel_message(
            420,
            0,
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        ));
    }
    events.push(end_of_track(60));
    events
}

/// Serialize tracks as a format 1 file.
pub fn smf_bytes(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TPQ)),
    ));
    smf.tracks = tracks;
    let mut buf = Vec::new();
    smf.write_std(&mut buf).expect("Failed to write SMF");
    buf
}

/// Four half-second notes: two seconds long.
pub fn melody() -> Vec<u8> {
    smf_bytes(vec![melody_events(&[60, 62, 64, 67])])
}

// =============================================================================
// Signal measurements
// =============================================================================

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
}

pub fn is_silent(samples: &[f32]) -> bool {
    peak(samples) < tolerances::SILENCE_THRESHOLD
}
