//! Player integration tests: control handle, render side and notifications
//! wired together the way the browser player drives them.

mod helpers;

use approx::assert_abs_diff_eq;
use gending::prelude::*;
use gending::Error;
use helpers::tolerances::{AUDIBLE_THRESHOLD, TIME_EPSILON};
use helpers::*;
use std::sync::{Arc, Mutex};

// =============================================================================
// Loading and playback
// =============================================================================

#[test]
fn test_load_midi_plays_audio_and_ends() {
    let (mut player, handle) = test_player();
    let bytes = melody();
    assert_eq!(handle.load_midi([(bytes.as_slice(), Some("Lancaran"))]).unwrap(), 1);

    let (left, right) = render_seconds(&mut player, 0.3);
    assert_eq!(handle.song_index(), Some(0));
    assert!(handle.is_playing());
    assert!(rms(&left) > AUDIBLE_THRESHOLD);
    assert!(rms(&right) > AUDIBLE_THRESHOLD);
    assert!(handle.active_voices() > 0);

    render_seconds(&mut player, 2.0);
    assert_eq!(handle.state(), PlaybackState::Paused);
    assert_abs_diff_eq!(handle.current_time(), 2.0, epsilon = TIME_EPSILON);

    // release tails are short with the default envelope
    render_seconds(&mut player, 0.2);
    let (tail, _) = render_seconds(&mut player, 0.1);
    assert!(is_silent(&tail));
}

#[test]
fn test_notifications_cover_a_song() {
    let (mut player, handle) = test_player();
    let bytes = melody();
    handle.load_midi([(bytes.as_slice(), Some("Lancaran"))]).unwrap();
    render_seconds(&mut player, 2.5);

    let seen = handle.events().drain();
    assert!(seen.contains(&Notification::SongChanged {
        index: 0,
        name: Arc::from("Lancaran"),
    }));
    let notes: Vec<u8> = seen
        .iter()
        .filter_map(|n| match n {
            Notification::NoteOn { note, .. } => Some(*note),
            _ => None,
        })
        .collect();
    assert_eq!(notes, vec![60, 62, 64, 67]);
    assert!(seen
        .iter()
        .any(|n| n.kind() == NotificationKind::TimeChanged));
    assert_eq!(
        seen.iter()
            .filter(|n| **n == Notification::SongEnded { index: 0 })
            .count(),
        1
    );
}

#[test]
fn test_subscribers_receive_filtered_notifications_on_dispatch() {
    let (mut player, handle) = test_player();
    let ended = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ended);
    handle.subscribe(Some(NotificationKind::SongEnded), move |n| {
        sink.lock().unwrap().push(n.clone());
    });

    let bytes = melody();
    handle.load_midi([(bytes.as_slice(), None)]).unwrap();
    render_seconds(&mut player, 2.5);
    assert!(ended.lock().unwrap().is_empty());

    assert!(handle.dispatch_events() > 0);
    assert_eq!(
        *ended.lock().unwrap(),
        vec![Notification::SongEnded { index: 0 }]
    );
}

#[test]
fn test_invalid_midi_loads_nothing() {
    let (mut player, handle) = test_player();
    let good = melody();
    let result = handle.load_midi([
        (good.as_slice(), Some("ok")),
        (b"MThd but not really".as_slice(), Some("bad")),
    ]);
    assert!(matches!(result, Err(Error::Midi(_))));

    pump(&mut player);
    assert_eq!(handle.song_index(), None);
    assert_eq!(handle.state(), PlaybackState::Stopped);
}

// =============================================================================
// Transport
// =============================================================================

#[test]
fn test_status_readback_follows_transport() {
    let (mut player, handle) = test_builder()
        .auto_play(false)
        .looping(true)
        .build()
        .unwrap();
    assert_eq!(handle.song_index(), None);
    assert!(handle.loop_enabled());

    let bytes = melody();
    handle.load_midi([(bytes.as_slice(), None)]).unwrap();
    pump(&mut player);
    assert_eq!(handle.state(), PlaybackState::Paused);
    assert_eq!(handle.song_index(), Some(0));
    assert_abs_diff_eq!(handle.duration(), 2.0, epsilon = 1e-9);

    handle.set_playback_rate(20.0);
    handle.set_loop(false);
    pump(&mut player);
    assert_eq!(handle.playback_rate(), 8.0);
    assert!(!handle.loop_enabled());

    handle.set_playback_rate(2.0);
    handle.play();
    render_seconds(&mut player, 0.5);
    assert!(handle.is_playing());
    assert_abs_diff_eq!(handle.current_time(), 1.0, epsilon = TIME_EPSILON);

    handle.pause();
    pump(&mut player);
    let paused_at = handle.current_time();
    render_seconds(&mut player, 0.2);
    assert_eq!(handle.current_time(), paused_at);

    handle.stop();
    pump(&mut player);
    assert_eq!(handle.state(), PlaybackState::Stopped);
    assert_eq!(handle.current_time(), 0.0);
}

#[test]
fn test_seek_moves_position_and_keeps_state() {
    let (mut player, handle) = test_builder().auto_play(false).build().unwrap();
    let bytes = melody();
    handle.load_midi([(bytes.as_slice(), None)]).unwrap();
    handle.seek(1.25);
    pump(&mut player);
    assert_eq!(handle.state(), PlaybackState::Paused);
    assert_abs_diff_eq!(handle.current_time(), 1.25, epsilon = 1e-9);

    // a seek past the end clamps to the duration
    handle.seek(99.0);
    pump(&mut player);
    assert_abs_diff_eq!(handle.current_time(), 2.0, epsilon = 1e-9);
}

#[test]
fn test_locked_controller_survives_loop_and_seek() {
    let (mut player, handle) = test_builder().looping(true).build().unwrap();
    let mut events = vec![controller(0, 0, 7, 100)];
    events.extend(melody_events(&[60, 62]));
    let bytes = smf_bytes(vec![events]);

    handle.controller_change(0, 7, 20, true);
    handle.load_midi([(bytes.as_slice(), None)]).unwrap();
    render_seconds(&mut player, 0.5);
    assert_eq!(player.synth().channel(0).unwrap().controller(7), 20);

    // one-second song: several passes through the loop
    render_seconds(&mut player, 2.3);
    assert!(handle.is_playing());
    assert_eq!(player.synth().channel(0).unwrap().controller(7), 20);

    handle.seek(0.25);
    pump(&mut player);
    assert_eq!(player.synth().channel(0).unwrap().controller(7), 20);

    handle.unlock_controller(0, 7);
    handle.seek(0.25);
    pump(&mut player);
    assert_eq!(player.synth().channel(0).unwrap().controller(7), 100);
}

// =============================================================================
// Playlist
// =============================================================================

#[test]
fn test_playlist_navigation_wraps() {
    let (mut player, handle) = test_player();
    let first = melody();
    let second = smf_bytes(vec![melody_events(&[72])]);
    handle
        .load_midi([
            (first.as_slice(), Some("Gambir Sawit")),
            (second.as_slice(), Some("Udan Mas")),
        ])
        .unwrap();
    pump(&mut player);
    assert_eq!(handle.song_index(), Some(0));

    handle.next_song();
    pump(&mut player);
    assert_eq!(handle.song_index(), Some(1));
    assert_abs_diff_eq!(handle.duration(), 0.5, epsilon = 1e-9);

    handle.next_song();
    pump(&mut player);
    assert_eq!(handle.song_index(), Some(0));

    handle.previous_song();
    pump(&mut player);
    assert_eq!(handle.song_index(), Some(1));

    // out of range is ignored
    handle.select_song(7);
    pump(&mut player);
    assert_eq!(handle.song_index(), Some(1));

    let names: Vec<Arc<str>> = handle
        .events()
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            Notification::SongChanged { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    let names: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    assert_eq!(names, vec!["Gambir Sawit", "Udan Mas", "Gambir Sawit", "Udan Mas"]);
}

#[test]
fn test_auto_advance_moves_to_next_song() {
    let (mut player, handle) = test_builder()
        .looping(false)
        .auto_advance(true)
        .build()
        .unwrap();
    let first = smf_bytes(vec![melody_events(&[60])]);
    let second = melody();
    handle
        .load_midi([(first.as_slice(), None), (second.as_slice(), None)])
        .unwrap();
    render_seconds(&mut player, 0.8);
    assert_eq!(handle.song_index(), Some(1));
    assert!(handle.is_playing());
}

// =============================================================================
// Queues and buffers
// =============================================================================

#[test]
fn test_full_transport_queue_drops_commands() {
    let config = PlayerConfig {
        transport_capacity: 2,
        ..Default::default()
    };
    let (mut player, handle) = test_builder().config(config).build().unwrap();
    assert!(handle.send(TransportCommand::Pause));
    assert!(handle.send(TransportCommand::Pause));
    assert!(!handle.send(TransportCommand::Pause));

    pump(&mut player);
    assert!(handle.send(TransportCommand::Play));
}

#[test]
fn test_render_interleaved_fills_only_two_channels() {
    let (mut player, handle) = test_player();
    let bytes = melody();
    handle.load_midi([(bytes.as_slice(), None)]).unwrap();

    let mut buffer = vec![1.0f32; 4 * 2048];
    player.render_interleaved(&mut buffer, 4);
    let frames: Vec<&[f32]> = buffer.chunks_exact(4).collect();
    assert!(frames.iter().all(|f| f[2] == 0.0 && f[3] == 0.0));
    assert!(frames.iter().any(|f| f[0].abs() > 0.0));

    let mut mono = vec![0.0f32; 1024];
    player.render_interleaved(&mut mono, 1);
    assert!(peak(&mono) > AUDIBLE_THRESHOLD);
}

#[test]
fn test_live_notes_sound_without_a_song() {
    let (mut player, handle) = test_player();
    handle.note_on(0, 69, 110);
    let (left, _) = render_seconds(&mut player, 0.1);
    assert!(rms(&left) > AUDIBLE_THRESHOLD);

    handle.all_notes_off();
    render_seconds(&mut player, 0.2);
    let (tail, _) = render_seconds(&mut player, 0.05);
    assert!(is_silent(&tail));
    assert_eq!(handle.dropped_commands(), 0);
}
