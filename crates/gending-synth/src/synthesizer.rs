//! The render-side synthesizer: channels, voice pool and block renderer.

use crate::channel::{cc, Channel};
use crate::command::{command_queue, SynthCommand, SynthHandle};
use crate::control::SynthControl;
use crate::error::{Result, RuntimeSynthesisWarning};
use crate::pool::{AllocationResult, VoicePool};
use crate::settings::SynthesizerSettings;
use crate::sysex::{self, SysExCommand, SysExParse};
use crate::voice::{sample_region, RenderContext, Voice, VoiceSetup};
use gending_core::{EventPublisher, Notification};
use gending_soundfont::{GeneratorType, ModulatorList, ResolvedGenerators, SoundBank, ZoneLayers};
use ringbuf::traits::Consumer;
use ringbuf::HeapCons;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters for monitoring; cheap to read from the render side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthStats {
    pub active_voices: usize,
    pub fading_voices: usize,
    pub steals: u64,
    pub hard_truncations: u64,
    pub warnings: u64,
    pub dropped_commands: u64,
    pub samples_rendered: u64,
}

/// SoundFont synthesizer.
///
/// Lives in the render context. Control-side code talks to it through a
/// [`SynthHandle`]; code already running in the render context (the
/// sequencer) calls the [`SynthControl`] methods directly.
pub struct Synthesizer {
    bank: Arc<SoundBank>,
    settings: SynthesizerSettings,
    ctx: RenderContext,
    channels: Vec<Channel>,
    pool: VoicePool,
    commands: HeapCons<SynthCommand>,
    handle: SynthHandle,
    publisher: EventPublisher,
    master_volume: f32,
    block_left: Vec<f32>,
    block_right: Vec<f32>,
    /// Samples of the current block already handed out.
    block_read: usize,
    samples_rendered: u64,
    warning_count: u64,
    last_warning: Option<RuntimeSynthesisWarning>,
}

impl Synthesizer {
    pub fn new(bank: Arc<SoundBank>, settings: SynthesizerSettings) -> Result<Self> {
        settings.validate()?;
        let (handle, commands) = command_queue(settings.command_capacity);
        let ctx = RenderContext {
            output_rate: settings.sample_rate as f32,
            block_seconds: settings.block_duration() as f32,
            min_release: settings.min_release_time,
            interpolation: settings.interpolation,
            loop_release: settings.loop_release,
        };
        let channels = (0..settings.channel_count).map(|i| Channel::new(i as u8)).collect();

        debug!(
            "Created synthesizer: {} presets, {} Hz, block {}, polyphony {}",
            bank.presets.len(),
            settings.sample_rate,
            settings.block_size,
            settings.max_polyphony
        );

        Ok(Self {
            pool: VoicePool::new(settings.max_polyphony, settings.steal_fade_samples()),
            block_left: vec![0.0; settings.block_size],
            block_right: vec![0.0; settings.block_size],
            block_read: settings.block_size,
            master_volume: settings.master_volume,
            bank,
            ctx,
            channels,
            commands,
            handle,
            publisher: EventPublisher::detached(),
            settings,
            samples_rendered: 0,
            warning_count: 0,
            last_warning: None,
        })
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn set_publisher(&mut self, publisher: EventPublisher) {
        self.publisher = publisher;
    }

    /// A new control-side handle feeding this synthesizer's command queue.
    pub fn handle(&self) -> SynthHandle {
        self.handle.clone()
    }

    pub fn settings(&self) -> &SynthesizerSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.settings.block_size
    }

    pub fn bank(&self) -> &Arc<SoundBank> {
        &self.bank
    }

    pub fn channel(&self, index: u8) -> Option<&Channel> {
        self.channels.get(usize::from(index))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Voices currently owning a pool slot.
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.pool.voices()
    }

    pub fn active_voice_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn fading_voice_count(&self) -> usize {
        self.pool.fading_count()
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn last_warning(&self) -> Option<RuntimeSynthesisWarning> {
        self.last_warning
    }

    pub fn warning_count(&self) -> u64 {
        self.warning_count
    }

    pub fn stats(&self) -> SynthStats {
        SynthStats {
            active_voices: self.pool.active_count(),
            fading_voices: self.pool.fading_count(),
            steals: self.pool.steal_count(),
            hard_truncations: self.pool.hard_truncations(),
            warnings: self.warning_count,
            dropped_commands: self.handle.dropped_count(),
            samples_rendered: self.samples_rendered,
        }
    }

    /// Apply every queued command, in enqueue order.
    pub fn process_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Some(command) = self.commands.try_pop() {
            self.apply(command);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, command: SynthCommand) {
        match command {
            SynthCommand::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            SynthCommand::NoteOff { channel, note } => self.note_off(channel, note),
            SynthCommand::ControllerChange {
                channel,
                controller,
                value,
                lock,
            } => self.controller_change(channel, controller, value, lock),
            SynthCommand::UnlockController {
                channel,
                controller,
            } => {
                if let Some(ch) = self.channels.get_mut(usize::from(channel)) {
                    ch.unlock(controller);
                }
            }
            SynthCommand::ProgramChange { channel, program } => self.program_change(channel, program),
            SynthCommand::PitchBend { channel, value } => self.pitch_bend(channel, value),
            SynthCommand::ChannelPressure { channel, pressure } => self.channel_pressure(channel, pressure),
            SynthCommand::PolyPressure {
                channel,
                note,
                pressure,
            } => self.poly_pressure(channel, note, pressure),
            SynthCommand::SystemExclusive(data) => self.system_exclusive(&data),
            SynthCommand::AllNotesOff(channel) => self.all_notes_off(channel),
            SynthCommand::AllSoundOff(channel) => self.all_sound_off(channel),
            SynthCommand::ResetAllControllers(channel) => self.reset_all_controllers(channel),
            SynthCommand::ResetSystem => self.reset_system(),
            SynthCommand::SetMasterVolume(volume) => self.set_master_volume(volume),
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        if volume.is_finite() {
            self.master_volume = volume.max(0.0);
        }
    }

    /// Fill `left` and `right` (equal length; extra samples in the longer
    /// one are left alone).
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.render_with(left, right, |_| {});
    }

    /// Like [`render`](Self::render), calling `before_block` at the start of
    /// every internal block, after queued commands are applied. The
    /// sequencer hooks in here so its events land on block boundaries.
    pub fn render_with<F>(&mut self, left: &mut [f32], right: &mut [f32], mut before_block: F)
    where
        F: FnMut(&mut Self),
    {
        let n = left.len().min(right.len());
        let block = self.settings.block_size;
        let mut written = 0;
        while written < n {
            if self.block_read >= block {
                self.process_commands();
                before_block(self);
                self.render_block();
                self.block_read = 0;
            }
            let take = (block - self.block_read).min(n - written);
            let src = self.block_read..self.block_read + take;
            left[written..written + take].copy_from_slice(&self.block_left[src.clone()]);
            right[written..written + take].copy_from_slice(&self.block_right[src]);
            self.block_read += take;
            written += take;
        }
    }

    fn render_block(&mut self) {
        self.block_left.fill(0.0);
        self.block_right.fill(0.0);
        self.pool.render(
            &self.channels,
            &self.bank.sample_data,
            &self.ctx,
            &mut self.block_left,
            &mut self.block_right,
        );
        let gain = self.master_volume;
        if gain != 1.0 {
            self.block_left.iter_mut().for_each(|s| *s *= gain);
            self.block_right.iter_mut().for_each(|s| *s *= gain);
        }
        self.samples_rendered += self.block_left.len() as u64;
    }

    fn report(&mut self, warning: RuntimeSynthesisWarning) {
        self.warning_count += 1;
        self.last_warning = Some(warning);
        // rate-limited: the render path may hit the same problem every note
        if self.warning_count.is_power_of_two() {
            warn!(count = self.warning_count, "{:?}", warning);
        }
    }

    fn publish(&self, notification: Notification) {
        self.publisher.publish(notification);
    }

    fn targets(&self, channel: Option<u8>) -> std::ops::Range<usize> {
        match channel {
            Some(c) if usize::from(c) < self.channels.len() => usize::from(c)..usize::from(c) + 1,
            Some(_) => 0..0,
            None => 0..self.channels.len(),
        }
    }

    fn in_targets(channel: u8, targets: &std::ops::Range<usize>) -> bool {
        targets.contains(&usize::from(channel))
    }

    /// Spawn one voice per matching preset-zone × instrument-zone pair.
    fn start_note(&mut self, channel: u8, key: u8, velocity: u8) {
        let ch = usize::from(channel);
        let (bank_number, program) = (self.channels[ch].bank(), self.channels[ch].program());
        let bank = Arc::clone(&self.bank);
        let Some(preset_index) = bank.resolve_preset(bank_number, u16::from(program)) else {
            self.report(RuntimeSynthesisWarning::MissingPreset {
                channel,
                bank: bank_number,
                program,
            });
            return;
        };

        // same key struck again
        self.pool
            .release_where(&self.ctx, |v| v.channel() == channel && v.key() == key && v.is_key_held());

        let first_new_id = self.pool.peek_next_id();
        let preset = &bank.presets[preset_index];
        for preset_zone in preset.zones_for(key, velocity) {
            let Some(instrument) = preset_zone.link.and_then(|i| bank.instruments.get(i)) else {
                continue;
            };
            for instrument_zone in instrument.zones_for(key, velocity) {
                let Some((sample_index, header)) = instrument_zone
                    .link
                    .and_then(|i| bank.samples.get(i).map(|h| (i, h)))
                else {
                    continue;
                };
                let layers = ZoneLayers {
                    preset_global: preset.global.as_ref(),
                    preset_zone,
                    instrument_global: instrument.global.as_ref(),
                    instrument_zone,
                };
                let generators = ResolvedGenerators::resolve(&layers, self.settings.layering);
                let region = sample_region(header, &generators, bank.sample_data.len());
                if region.is_empty() {
                    self.report(RuntimeSynthesisWarning::ZeroLengthSample { sample: sample_index });
                    continue;
                }
                let mut modulators = ModulatorList::new();
                let dropped = modulators.build(&bank.default_modulators, &layers);
                if dropped > 0 {
                    self.report(RuntimeSynthesisWarning::ModulatorOverflow { dropped });
                }

                let class = generators.get(GeneratorType::ExclusiveClass);
                if class != 0 {
                    self.pool.fade_where(|v| {
                        v.channel() == channel && v.exclusive_class() == class && v.id() < first_new_id
                    });
                }

                let setup = VoiceSetup {
                    channel,
                    key,
                    velocity,
                    generators,
                    modulators,
                    region,
                    loop_allowed: header.sample_type.permits_looping(),
                    sample_rate: header.sample_rate,
                    root_key: header.root_key(),
                    pitch_correction: header.pitch_correction,
                };
                if let AllocationResult::Stolen { stolen_voice_id, .. } =
                    self.pool.allocate(&setup, &self.channels[ch], &self.ctx)
                {
                    if self.pool.steal_count().is_power_of_two() {
                        debug!("Polyphony ceiling reached, stole voice {}", stolen_voice_id);
                    }
                }
            }
        }
    }

    fn set_sustain(&mut self, channel: u8, on: bool) {
        if on {
            return;
        }
        for v in self.pool.voices_mut().filter(|v| v.channel() == channel) {
            v.set_sustained(false);
        }
        self.pool
            .release_where(&self.ctx, |v| v.channel() == channel && v.wants_release());
    }

    fn set_sostenuto(&mut self, channel: u8, on: bool) {
        for v in self.pool.voices_mut().filter(|v| v.channel() == channel) {
            if on {
                if v.is_key_held() {
                    v.set_sostenuto_held(true);
                }
            } else {
                v.set_sostenuto_held(false);
            }
        }
        if !on {
            self.pool
                .release_where(&self.ctx, |v| v.channel() == channel && v.wants_release());
        }
    }
}

impl SynthControl for Synthesizer {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if usize::from(channel) >= self.channels.len() {
            return;
        }
        let (note, velocity) = (note & 0x7F, velocity & 0x7F);
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }
        self.start_note(channel, note, velocity);
        self.publish(Notification::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        let Some(state) = self.channels.get(usize::from(channel)) else {
            return;
        };
        let note = note & 0x7F;
        let sustain = state.sustain();
        for v in self
            .pool
            .voices_mut()
            .filter(|v| v.channel() == channel && v.key() == note && v.is_key_held())
        {
            v.key_up(sustain);
        }
        self.pool
            .release_where(&self.ctx, |v| v.channel() == channel && v.key() == note && v.wants_release());
        self.publish(Notification::NoteOff { channel, note });
    }

    fn controller_change(&mut self, channel: u8, controller: u8, value: u8, lock: bool) {
        let Some(state) = self.channels.get_mut(usize::from(channel)) else {
            return;
        };
        let (controller, value) = (controller & 0x7F, value & 0x7F);
        let (sustain_before, sostenuto_before) = (state.sustain(), state.sostenuto());
        if !state.set_controller(controller, value, lock) {
            return;
        }
        let (sustain_after, sostenuto_after) = (state.sustain(), state.sostenuto());

        self.publish(Notification::ControllerChange {
            channel,
            controller,
            value,
        });

        match controller {
            cc::SUSTAIN if sustain_before != sustain_after => self.set_sustain(channel, sustain_after),
            cc::SOSTENUTO if sostenuto_before != sostenuto_after => self.set_sostenuto(channel, sostenuto_after),
            cc::ALL_SOUND_OFF => self.all_sound_off(Some(channel)),
            cc::RESET_ALL_CONTROLLERS => self.reset_all_controllers(Some(channel)),
            // all-notes-off and the mode messages that imply it
            cc::ALL_NOTES_OFF..=127 => self.all_notes_off(Some(channel)),
            _ => {}
        }
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        let Some(state) = self.channels.get_mut(usize::from(channel)) else {
            return;
        };
        state.set_program(program);
        let (program, bank) = (state.program(), state.bank());
        self.publish(Notification::ProgramChanged {
            channel,
            program,
            bank,
        });
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        if let Some(state) = self.channels.get_mut(usize::from(channel)) {
            state.set_pitch_bend(value);
        }
    }

    fn channel_pressure(&mut self, channel: u8, pressure: u8) {
        if let Some(state) = self.channels.get_mut(usize::from(channel)) {
            state.set_channel_pressure(pressure);
        }
    }

    fn poly_pressure(&mut self, channel: u8, note: u8, pressure: u8) {
        if let Some(state) = self.channels.get_mut(usize::from(channel)) {
            state.set_poly_pressure(note, pressure);
        }
    }

    fn system_exclusive(&mut self, data: &[u8]) {
        match sysex::parse(data) {
            SysExParse::Command(SysExCommand::SystemReset) => self.reset_system(),
            SysExParse::Command(SysExCommand::MasterVolume(volume)) => self.set_master_volume(volume),
            SysExParse::Unsupported { manufacturer } => {
                self.report(RuntimeSynthesisWarning::UnsupportedSysEx { manufacturer })
            }
            SysExParse::Empty => {}
        }
    }

    fn all_notes_off(&mut self, channel: Option<u8>) {
        let targets = self.targets(channel);
        for v in self
            .pool
            .voices_mut()
            .filter(|v| Self::in_targets(v.channel(), &targets))
        {
            v.set_sustained(false);
            v.set_sostenuto_held(false);
        }
        self.pool
            .release_where(&self.ctx, |v| Self::in_targets(v.channel(), &targets));
        if channel.is_none() {
            self.publish(Notification::StopAll);
        }
    }

    fn all_sound_off(&mut self, channel: Option<u8>) {
        let targets = self.targets(channel);
        self.pool.fade_where(|v| Self::in_targets(v.channel(), &targets));
        if channel.is_none() {
            self.publish(Notification::StopAll);
        }
    }

    fn reset_all_controllers(&mut self, channel: Option<u8>) {
        let targets = self.targets(channel);
        for state in &mut self.channels[targets.clone()] {
            state.reset_controllers();
        }
        for v in self
            .pool
            .voices_mut()
            .filter(|v| Self::in_targets(v.channel(), &targets))
        {
            v.set_sustained(false);
            v.set_sostenuto_held(false);
        }
        self.pool
            .release_where(&self.ctx, |v| Self::in_targets(v.channel(), &targets) && v.wants_release());
        self.publish(Notification::AllControllersReset { channel });
    }

    fn reset_system(&mut self) {
        self.all_sound_off(None);
        for state in &mut self.channels {
            state.reset_all();
        }
        self.master_volume = self.settings.master_volume;
        debug!("Synthesizer system reset");
        self.publish(Notification::AllControllersReset { channel: None });
    }
}
