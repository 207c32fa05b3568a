//! Player: the synthesizer and sequencer wired across two contexts.
//!
//! [`Player`] lives on the render side and is driven by the audio callback.
//! [`PlayerHandle`] is the cloneable control-side surface used by the UI:
//! channel messages travel through the synthesizer's command ring, transport
//! commands through a bounded channel, both applied at the next block
//! boundary in enqueue order. Status flows back through atomics and
//! notifications through the [`EventBus`].

use crate::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use gending_core::{AtomicDouble, AtomicFlag, EventBus, Notification, NotificationKind, SubscriptionId};
use gending_midi::Song;
use gending_sequencer::{PlaybackState, Sequencer};
use gending_synth::{SynthCommand, SynthHandle, SynthStats, Synthesizer};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Transport request applied on the render side at a block boundary.
#[derive(Debug, Clone)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    /// Seconds into the song.
    Seek(f64),
    SetPlaybackRate(f64),
    SetLoop(bool),
    LoadSongs(Vec<Arc<Song>>),
    SelectSong(usize),
    NextSong,
    PreviousSong,
}

const NO_SONG: usize = usize::MAX;

/// Render-side state published for lock-free readback.
#[derive(Debug)]
pub(crate) struct PlayerStatus {
    state: AtomicU8,
    song_index: AtomicUsize,
    current_time: AtomicDouble,
    duration: AtomicDouble,
    playback_rate: AtomicDouble,
    loop_enabled: AtomicFlag,
    active_voices: AtomicUsize,
}

impl PlayerStatus {
    pub(crate) fn new(loop_enabled: bool) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Stopped.to_u8()),
            song_index: AtomicUsize::new(NO_SONG),
            current_time: AtomicDouble::new(0.0),
            duration: AtomicDouble::new(0.0),
            playback_rate: AtomicDouble::new(1.0),
            loop_enabled: AtomicFlag::new(loop_enabled),
            active_voices: AtomicUsize::new(0),
        }
    }

    fn store(&self, sequencer: &Sequencer, synth: &Synthesizer) {
        self.state.store(sequencer.state().to_u8(), Ordering::Release);
        self.song_index
            .store(sequencer.song_index().unwrap_or(NO_SONG), Ordering::Release);
        self.current_time.set(sequencer.current_time());
        self.duration.set(sequencer.duration());
        self.playback_rate.set(sequencer.playback_rate());
        self.loop_enabled.set(sequencer.loop_enabled());
        self.active_voices
            .store(synth.active_voice_count(), Ordering::Release);
    }
}

// ============================================================================
// Render side
// ============================================================================

/// Owns the synthesizer and sequencer. Call [`render`](Self::render) from the
/// audio callback; nothing here blocks.
pub struct Player {
    synth: Synthesizer,
    sequencer: Sequencer,
    transport: Receiver<TransportCommand>,
    status: Arc<PlayerStatus>,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
}

impl Player {
    pub(crate) fn new(
        synth: Synthesizer,
        sequencer: Sequencer,
        transport: Receiver<TransportCommand>,
        status: Arc<PlayerStatus>,
    ) -> Self {
        let block = synth.block_size();
        status.store(&sequencer, &synth);
        Self {
            synth,
            sequencer,
            transport,
            status,
            scratch_left: vec![0.0; block * 16],
            scratch_right: vec![0.0; block * 16],
        }
    }

    pub fn builder() -> crate::PlayerBuilder {
        crate::PlayerBuilder::default()
    }

    pub fn sample_rate(&self) -> u32 {
        self.synth.sample_rate()
    }

    pub fn synth(&self) -> &Synthesizer {
        &self.synth
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn stats(&self) -> SynthStats {
        self.synth.stats()
    }

    /// Fill one stereo buffer. Before each internal block: queued synth
    /// commands, then queued transport commands, then one block of sequencer
    /// time.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let Self {
            synth,
            sequencer,
            transport,
            ..
        } = self;
        let block_seconds = synth.settings().block_duration();
        synth.render_with(left, right, |synth| {
            while let Ok(command) = transport.try_recv() {
                apply_transport(sequencer, synth, command);
            }
            sequencer.advance(block_seconds, synth);
        });
        self.status.store(&self.sequencer, &self.synth);
    }

    /// Fill an interleaved buffer with `channels` channels. Channels past
    /// the first two are silent; a mono buffer gets the left channel.
    ///
    /// Buffers longer than the preallocated scratch are rendered in slices,
    /// so this never allocates.
    pub fn render_interleaved(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let slice_frames = self.scratch_left.len().max(1);
        let mut left = std::mem::take(&mut self.scratch_left);
        let mut right = std::mem::take(&mut self.scratch_right);

        for slice in output.chunks_mut(slice_frames * channels) {
            let frames = slice.len() / channels;
            self.render(&mut left[..frames], &mut right[..frames]);
            for (frame, samples) in slice.chunks_exact_mut(channels).enumerate() {
                for (ch, sample) in samples.iter_mut().enumerate() {
                    *sample = match ch {
                        0 => left[frame],
                        1 => right[frame],
                        _ => 0.0,
                    };
                }
            }
        }
        self.scratch_left = left;
        self.scratch_right = right;
    }
}

fn apply_transport(sequencer: &mut Sequencer, synth: &mut Synthesizer, command: TransportCommand) {
    let outcome = match command {
        TransportCommand::SelectSong(index) => sequencer.select_song(index, synth),
        TransportCommand::NextSong => sequencer.next_song(synth),
        TransportCommand::PreviousSong => sequencer.previous_song(synth),
        TransportCommand::Play => {
            sequencer.play(synth);
            Ok(())
        }
        TransportCommand::Pause => {
            sequencer.pause();
            Ok(())
        }
        TransportCommand::Stop => {
            sequencer.stop(synth);
            Ok(())
        }
        TransportCommand::Seek(seconds) => {
            sequencer.seek(seconds, synth);
            Ok(())
        }
        TransportCommand::SetPlaybackRate(rate) => {
            sequencer.set_playback_rate(rate);
            Ok(())
        }
        TransportCommand::SetLoop(enabled) => {
            sequencer.set_loop(enabled);
            Ok(())
        }
        TransportCommand::LoadSongs(songs) => {
            sequencer.load_songs(songs, synth);
            Ok(())
        }
    };
    if let Err(e) = outcome {
        warn!("Transport command ignored: {}", e);
    }
}

// ============================================================================
// Control side
// ============================================================================

/// Cloneable control surface for a [`Player`].
#[derive(Clone)]
pub struct PlayerHandle {
    synth: SynthHandle,
    transport: Sender<TransportCommand>,
    status: Arc<PlayerStatus>,
    events: Arc<EventBus>,
}

impl PlayerHandle {
    pub(crate) fn new(
        synth: SynthHandle,
        transport: Sender<TransportCommand>,
        status: Arc<PlayerStatus>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            synth,
            transport,
            status,
            events,
        }
    }

    /// The synthesizer's own handle, for callers that want
    /// [`SynthControl`](gending_synth::SynthControl) directly.
    pub fn synth(&self) -> SynthHandle {
        self.synth.clone()
    }

    /// Returns false when the queue was full and the command was dropped.
    pub fn send(&self, command: TransportCommand) -> bool {
        match self.transport.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!("Transport queue full, dropping {:?}", command);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    // --- Channel messages ---

    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.synth.send(SynthCommand::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    pub fn note_off(&self, channel: u8, note: u8) {
        self.synth.send(SynthCommand::NoteOff { channel, note });
    }

    /// With `lock` the value is pinned: later unlocked writes, including the
    /// song's own, are ignored until [`unlock_controller`](Self::unlock_controller).
    pub fn controller_change(&self, channel: u8, controller: u8, value: u8, lock: bool) {
        self.synth.send(SynthCommand::ControllerChange {
            channel,
            controller,
            value,
            lock,
        });
    }

    pub fn unlock_controller(&self, channel: u8, controller: u8) {
        self.synth.unlock_controller(channel, controller);
    }

    pub fn program_change(&self, channel: u8, program: u8) {
        self.synth.send(SynthCommand::ProgramChange { channel, program });
    }

    pub fn system_exclusive(&self, data: &[u8]) {
        self.synth.send(SynthCommand::SystemExclusive(Arc::from(data)));
    }

    /// Release held notes on every channel.
    pub fn all_notes_off(&self) {
        self.synth.send(SynthCommand::AllNotesOff(None));
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.synth.set_master_volume(volume);
    }

    // --- Transport ---

    pub fn play(&self) {
        self.send(TransportCommand::Play);
    }

    pub fn pause(&self) {
        self.send(TransportCommand::Pause);
    }

    pub fn stop(&self) {
        self.send(TransportCommand::Stop);
    }

    pub fn seek(&self, seconds: f64) {
        self.send(TransportCommand::Seek(seconds));
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.send(TransportCommand::SetPlaybackRate(rate));
    }

    pub fn set_loop(&self, enabled: bool) {
        self.send(TransportCommand::SetLoop(enabled));
    }

    pub fn load_songs(&self, songs: Vec<Arc<Song>>) {
        self.send(TransportCommand::LoadSongs(songs));
    }

    /// Parse every `(bytes, fallback name)` buffer, then load them as the
    /// playlist. Nothing is loaded if any buffer fails to parse.
    pub fn load_midi<'a, I>(&self, files: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a [u8], Option<&'a str>)>,
    {
        let songs = files
            .into_iter()
            .map(|(data, name)| Song::parse_named(data, name).map(Arc::new))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let count = songs.len();
        self.load_songs(songs);
        Ok(count)
    }

    pub fn select_song(&self, index: usize) {
        self.send(TransportCommand::SelectSong(index));
    }

    pub fn next_song(&self) {
        self.send(TransportCommand::NextSong);
    }

    pub fn previous_song(&self) {
        self.send(TransportCommand::PreviousSong);
    }

    // --- Status (as of the last rendered buffer) ---

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.status.state.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.state().is_playing()
    }

    pub fn song_index(&self) -> Option<usize> {
        match self.status.song_index.load(Ordering::Acquire) {
            NO_SONG => None,
            index => Some(index),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.status.current_time.get()
    }

    pub fn duration(&self) -> f64 {
        self.status.duration.get()
    }

    pub fn playback_rate(&self) -> f64 {
        self.status.playback_rate.get()
    }

    pub fn loop_enabled(&self) -> bool {
        self.status.loop_enabled.get()
    }

    pub fn active_voices(&self) -> usize {
        self.status.active_voices.load(Ordering::Acquire)
    }

    pub fn dropped_commands(&self) -> u64 {
        self.synth.dropped_count()
    }

    // --- Notifications ---

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// `None` subscribes to every kind.
    pub fn subscribe<F>(&self, filter: Option<NotificationKind>, callback: F) -> SubscriptionId
    where
        F: FnMut(&Notification) + Send + 'static,
    {
        self.events.subscribe(filter, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Deliver pending notifications to subscribers. Call from the UI loop.
    pub fn dispatch_events(&self) -> usize {
        self.events.dispatch()
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("state", &self.state())
            .field("song_index", &self.song_index())
            .field("current_time", &self.current_time())
            .finish()
    }
}
