//! Per-note synthesis: one [`Voice`] renders one sample zone for one note.
//!
//! Every block the voice re-derives its effective generator values from
//! the resolved zone generators plus its modulators, read against the
//! owning channel's live controller state. Envelopes and LFOs are stepped
//! once per block; gain is ramped per sample so block-rate changes do not
//! click.

pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod oscillator;

use crate::channel::Channel;
use crate::settings::{Interpolation, LoopReleaseMode};
use envelope::{cb_to_gain, EnvelopeParams, EnvelopeStage, ModulationEnvelope, VolumeEnvelope};
use filter::LowPass;
use gending_soundfont::{GeneratorType, ModulatorList, ResolvedGenerators, SampleHeader, GENERATOR_COUNT};
use lfo::{cents_to_hz, Lfo};
use oscillator::{LoopMode, Oscillator, SampleRegion};
use std::f32::consts::FRAC_PI_2;

/// Upper bound on sample frames advanced per output frame (ten octaves up).
pub const MAX_PLAYBACK_RATIO: f64 = 1024.0;

/// Unique identifier for a voice instance, scoped to one synthesizer.
pub type VoiceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    /// Key held, or held by a pedal.
    Playing,
    /// Release stage running.
    Released,
}

/// Fixed per-block rendering parameters shared by every voice.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub output_rate: f32,
    pub block_seconds: f32,
    pub min_release: f32,
    pub interpolation: Interpolation,
    pub loop_release: LoopReleaseMode,
}

/// Everything a voice needs at note-on, resolved from the sound bank.
#[derive(Debug, Clone, Copy)]
pub struct VoiceSetup {
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    pub generators: ResolvedGenerators,
    pub modulators: ModulatorList,
    pub region: SampleRegion,
    pub loop_allowed: bool,
    pub sample_rate: u32,
    pub root_key: u8,
    pub pitch_correction: i8,
}

/// Absolute sample region after the zone's address-offset generators,
/// clamped to the sample data.
pub fn sample_region(header: &SampleHeader, generators: &ResolvedGenerators, data_len: usize) -> SampleRegion {
    let offset = |fine: GeneratorType, coarse: GeneratorType| {
        i64::from(generators.get(fine)) + i64::from(generators.get(coarse)) * 32768
    };
    let clamp = |base: u32, delta: i64| (i64::from(base) + delta).clamp(0, data_len as i64) as usize;

    let start = clamp(
        header.start,
        offset(GeneratorType::StartAddrsOffset, GeneratorType::StartAddrsCoarseOffset),
    );
    let end = clamp(
        header.end,
        offset(GeneratorType::EndAddrsOffset, GeneratorType::EndAddrsCoarseOffset),
    )
    .max(start);
    let loop_start = clamp(
        header.loop_start,
        offset(GeneratorType::StartloopAddrsOffset, GeneratorType::StartloopAddrsCoarseOffset),
    );
    let loop_end = clamp(
        header.loop_end,
        offset(GeneratorType::EndloopAddrsOffset, GeneratorType::EndloopAddrsCoarseOffset),
    );
    SampleRegion {
        start,
        end,
        loop_start,
        loop_end,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fade {
    remaining: u32,
    total: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Voice {
    id: VoiceId,
    state: VoiceState,
    channel: u8,
    key: u8,
    velocity: u8,
    /// Key after the `keynum` override; drives pitch and key scaling.
    effective_key: u8,
    generators: ResolvedGenerators,
    modulators: ModulatorList,
    oscillator: Oscillator,
    volume_env: VolumeEnvelope,
    modulation_env: ModulationEnvelope,
    vibrato_lfo: Lfo,
    modulation_lfo: Lfo,
    filter: LowPass,
    root_key: f32,
    pitch_correction: f32,
    rate_ratio: f64,
    gain_left: f32,
    gain_right: f32,
    /// Envelope times attenuation at the end of the last block.
    level: f32,
    fade: Option<Fade>,
    key_held: bool,
    sustained: bool,
    sostenuto_held: bool,
    start_order: u64,
    release_order: u64,
}

impl Voice {
    /// (Re)initialize this voice in place for a new note.
    pub fn start(&mut self, id: VoiceId, order: u64, setup: &VoiceSetup, channel: &Channel, ctx: &RenderContext) {
        let g = &setup.generators;
        let forced_key = g.get(GeneratorType::Keynum);
        let forced_velocity = g.get(GeneratorType::Velocity);
        let effective_key = if forced_key >= 0 { forced_key as u8 } else { setup.key };
        let velocity = if forced_velocity >= 0 {
            forced_velocity as u8
        } else {
            setup.velocity
        };
        let overriding_root = g.get(GeneratorType::OverridingRootKey);
        let root_key = if overriding_root >= 0 {
            overriding_root
        } else {
            i32::from(setup.root_key)
        };

        let mut oscillator = Oscillator::default();
        oscillator.start(
            setup.region,
            LoopMode::from_generator(g.get(GeneratorType::SampleModes)),
            setup.loop_allowed,
            ctx.interpolation,
        );
        let mut filter = LowPass::default();
        filter.reset();

        *self = Self {
            id,
            state: VoiceState::Playing,
            channel: setup.channel,
            key: setup.key,
            velocity,
            effective_key,
            generators: setup.generators,
            modulators: setup.modulators,
            oscillator,
            filter,
            root_key: root_key as f32,
            pitch_correction: f32::from(setup.pitch_correction),
            rate_ratio: if setup.sample_rate == 0 {
                1.0
            } else {
                f64::from(setup.sample_rate) / f64::from(ctx.output_rate)
            },
            key_held: true,
            sostenuto_held: false,
            start_order: order,
            ..Self::default()
        };

        let m = self.modulated(channel);
        self.volume_env.start(self.volume_params(&m));
        self.modulation_env.start(self.modulation_params(&m));
        self.vibrato_lfo
            .start(envelope::timecents_to_seconds(m[GeneratorType::DelayVibLfo.index()]));
        self.modulation_lfo
            .start(envelope::timecents_to_seconds(m[GeneratorType::DelayModLfo.index()]));
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != VoiceState::Idle
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn exclusive_class(&self) -> i32 {
        self.generators.get(GeneratorType::ExclusiveClass)
    }

    pub fn generators(&self) -> &ResolvedGenerators {
        &self.generators
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.volume_env.stage()
    }

    /// Releasing or fading out; preferred when stealing.
    pub fn is_releasing(&self) -> bool {
        self.state == VoiceState::Released || self.fade.is_some()
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn start_order(&self) -> u64 {
        self.start_order
    }

    pub fn release_order(&self) -> u64 {
        self.release_order
    }

    pub fn is_key_held(&self) -> bool {
        self.key_held
    }

    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    /// Key released. With the sustain pedal down the voice keeps playing.
    pub fn key_up(&mut self, sustain_pedal: bool) {
        self.key_held = false;
        if sustain_pedal {
            self.sustained = true;
        }
    }

    pub fn set_sustained(&mut self, sustained: bool) {
        self.sustained = sustained;
    }

    pub fn set_sostenuto_held(&mut self, held: bool) {
        self.sostenuto_held = held;
    }

    /// Playing with nothing left holding it.
    pub fn wants_release(&self) -> bool {
        self.state == VoiceState::Playing && !self.key_held && !self.sustained && !self.sostenuto_held
    }

    pub fn release(&mut self, order: u64, ctx: &RenderContext) {
        if self.state != VoiceState::Playing {
            return;
        }
        self.state = VoiceState::Released;
        self.key_held = false;
        self.sustained = false;
        self.sostenuto_held = false;
        if self.release_order == 0 {
            self.release_order = order;
        }
        self.volume_env.release(ctx.min_release);
        self.modulation_env.release();
        self.oscillator.release(ctx.loop_release);
    }

    /// Fade to silence over `samples` output samples, whatever the envelope does.
    pub fn begin_fade(&mut self, samples: u32, order: u64) {
        if !self.is_active() {
            return;
        }
        let samples = samples.max(1);
        match self.fade {
            Some(f) if f.remaining <= samples => {}
            _ => {
                self.fade = Some(Fade {
                    remaining: samples,
                    total: samples,
                })
            }
        }
        if self.release_order == 0 {
            self.release_order = order;
        }
    }

    pub fn kill(&mut self) {
        self.state = VoiceState::Idle;
        self.fade = None;
        self.level = 0.0;
    }

    /// Effective generator values: resolved zone values plus modulator
    /// contributions, clamped to each id's limits.
    fn modulated(&self, channel: &Channel) -> [f32; GENERATOR_COUNT] {
        let mut values = [0.0f32; GENERATOR_COUNT];
        for g in GeneratorType::ALL {
            values[g.index()] = self.generators.get(g) as f32;
        }
        for m in self.modulators.as_slice() {
            let Some(destination) = m.destination_generator() else {
                continue;
            };
            let Some(input) = channel.source_input(m.source, self.effective_key, self.velocity) else {
                continue;
            };
            let primary = m.source.map(input);
            let secondary = if m.amount_source.is_none() {
                1.0
            } else {
                channel
                    .source_input(m.amount_source, self.effective_key, self.velocity)
                    .map_or(0.0, |v| m.amount_source.map(v))
            };
            values[destination.index()] += m.transform.apply(primary * secondary * f32::from(m.amount));
        }
        for g in GeneratorType::ALL {
            let info = g.info();
            let v = &mut values[g.index()];
            *v = v.clamp(f32::from(info.min), f32::from(info.max));
        }
        values
    }

    fn volume_params(&self, m: &[f32; GENERATOR_COUNT]) -> EnvelopeParams {
        use GeneratorType as G;
        EnvelopeParams::from_timecents(
            m[G::DelayVolEnv.index()],
            m[G::AttackVolEnv.index()],
            m[G::HoldVolEnv.index()],
            m[G::DecayVolEnv.index()],
            m[G::SustainVolEnv.index()],
            m[G::ReleaseVolEnv.index()],
            m[G::KeynumToVolEnvHold.index()],
            m[G::KeynumToVolEnvDecay.index()],
            self.effective_key,
        )
    }

    fn modulation_params(&self, m: &[f32; GENERATOR_COUNT]) -> EnvelopeParams {
        use GeneratorType as G;
        let mut p = EnvelopeParams::from_timecents(
            m[G::DelayModEnv.index()],
            m[G::AttackModEnv.index()],
            m[G::HoldModEnv.index()],
            m[G::DecayModEnv.index()],
            0.0,
            m[G::ReleaseModEnv.index()],
            m[G::KeynumToModEnvHold.index()],
            m[G::KeynumToModEnvDecay.index()],
            self.effective_key,
        );
        // sustainModEnv is a decrease in 0.1% units
        p.sustain = 1.0 - m[G::SustainModEnv.index()] / 1000.0;
        p
    }

    /// Mix one block into `left`/`right`. Returns false once the voice has
    /// finished and its slot can be reused.
    pub fn render(
        &mut self,
        channel: &Channel,
        data: &[i16],
        ctx: &RenderContext,
        left: &mut [f32],
        right: &mut [f32],
    ) -> bool {
        use GeneratorType as G;
        if !self.is_active() {
            return false;
        }

        let m = self.modulated(channel);
        let dt = ctx.block_seconds;

        self.volume_env.set_params(self.volume_params(&m));
        self.modulation_env.set_params(self.modulation_params(&m));
        let env_gain = self.volume_env.advance(dt);
        let mod_env = self.modulation_env.advance(dt);
        let vib = self.vibrato_lfo.advance(dt, cents_to_hz(m[G::FreqVibLfo.index()]));
        let mod_lfo = self.modulation_lfo.advance(dt, cents_to_hz(m[G::FreqModLfo.index()]));

        // the wheel is not key-scaled: scaleTuning 0 zones still bend
        let cents = (f32::from(self.effective_key) - self.root_key) * m[G::ScaleTuning.index()]
            + m[G::CoarseTune.index()] * 100.0
            + m[G::FineTune.index()]
            + self.pitch_correction
            + channel.pitch_bend_cents()
            + channel.tuning_cents()
            + vib * m[G::VibLfoToPitch.index()]
            + mod_lfo * m[G::ModLfoToPitch.index()]
            + mod_env * m[G::ModEnvToPitch.index()];
        let ratio = f64::from(cents / 1200.0).exp2() * self.rate_ratio;

        let cutoff = m[G::InitialFilterFc.index()]
            + mod_env * m[G::ModEnvToFilterFc.index()]
            + mod_lfo * m[G::ModLfoToFilterFc.index()];
        self.filter.set(cutoff, m[G::InitialFilterQ.index()], ctx.output_rate);

        let attenuation = (m[G::InitialAttenuation.index()] - mod_lfo * m[G::ModLfoToVolume.index()]).max(0.0);
        let level = env_gain * cb_to_gain(attenuation);
        let angle = (m[G::Pan.index()] + 500.0) / 1000.0 * FRAC_PI_2;
        let (pan_right, pan_left) = angle.sin_cos();
        let target_left = level * pan_left;
        let target_right = level * pan_right;

        if !(ratio.is_finite() && target_left.is_finite() && target_right.is_finite() && cutoff.is_finite()) {
            self.kill();
            return false;
        }
        let ratio = ratio.min(MAX_PLAYBACK_RATIO);

        let n = left.len().min(right.len());
        let inv = 1.0 / n.max(1) as f32;
        let step_left = (target_left - self.gain_left) * inv;
        let step_right = (target_right - self.gain_right) * inv;
        let mut gain_left = self.gain_left;
        let mut gain_right = self.gain_right;

        for i in 0..n {
            let fade = match self.fade.as_mut() {
                Some(f) => {
                    if f.remaining == 0 {
                        break;
                    }
                    f.remaining -= 1;
                    f.remaining as f32 / f.total as f32
                }
                None => 1.0,
            };
            let sample = self.filter.process(self.oscillator.next(data, ratio));
            gain_left += step_left;
            gain_right += step_right;
            left[i] += sample * gain_left * fade;
            right[i] += sample * gain_right * fade;
        }

        self.gain_left = target_left;
        self.gain_right = target_right;
        self.level = level * self.fade.map_or(1.0, |f| f.remaining as f32 / f.total as f32);

        let faded_out = matches!(self.fade, Some(Fade { remaining: 0, .. }));
        if faded_out || self.volume_env.is_finished() || self.oscillator.is_finished() {
            self.kill();
            return false;
        }
        true
    }
}
