//! Six-stage envelopes evaluated analytically from elapsed time.
//!
//! Each call to `advance` moves the clock forward by one block and returns
//! the value at the end of that block. Stage parameters may change between
//! blocks; the value is always derived from the current parameters and the
//! elapsed time, never integrated.

/// Attenuation (centibels) at which a voice counts as silent.
pub const SILENCE_CB: f32 = 960.0;

/// Attenuation swept by a full decay or release stage.
const STAGE_SWEEP_CB: f32 = 1000.0;

/// SoundFont timecents to seconds. The format's `-32768` means zero.
#[inline]
pub fn timecents_to_seconds(tc: f32) -> f32 {
    if tc <= -32768.0 {
        0.0
    } else {
        (tc / 1200.0).exp2()
    }
}

#[inline]
pub fn cb_to_gain(cb: f32) -> f32 {
    10f32.powf(-cb / 200.0)
}

#[inline]
pub fn gain_to_cb(gain: f32) -> f32 {
    if gain <= 0.0 {
        SILENCE_CB
    } else {
        (-200.0 * gain.log10()).clamp(0.0, SILENCE_CB)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// Stage durations in seconds plus the sustain level.
///
/// For the volume envelope `sustain` is an attenuation in centibels; for
/// the modulation envelope it is a level in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvelopeParams {
    /// Build from generator values in timecents. `key_to_hold`/`key_to_decay`
    /// scale hold and decay by key distance from 60.
    #[allow(clippy::too_many_arguments)]
    pub fn from_timecents(
        delay: f32,
        attack: f32,
        hold: f32,
        decay: f32,
        sustain: f32,
        release: f32,
        key_to_hold: f32,
        key_to_decay: f32,
        key: u8,
    ) -> Self {
        let key_offset = 60.0 - f32::from(key);
        Self {
            delay: timecents_to_seconds(delay),
            attack: timecents_to_seconds(attack),
            hold: timecents_to_seconds(hold + key_to_hold * key_offset),
            decay: timecents_to_seconds(decay + key_to_decay * key_offset),
            sustain,
            release: timecents_to_seconds(release),
        }
    }
}

/// Where in the pre-release stages `elapsed` falls, and how far into it.
fn locate(p: &EnvelopeParams, elapsed: f32) -> (EnvelopeStage, f32) {
    let mut t = elapsed;
    if t < p.delay {
        return (EnvelopeStage::Delay, t);
    }
    t -= p.delay;
    if t < p.attack {
        return (EnvelopeStage::Attack, t);
    }
    t -= p.attack;
    if t < p.hold {
        return (EnvelopeStage::Hold, t);
    }
    t -= p.hold;
    (EnvelopeStage::Decay, t)
}

#[derive(Debug, Clone, Copy, Default)]
struct Clock {
    elapsed: f32,
    /// Seconds since release, once released.
    released: Option<f32>,
}

impl Clock {
    fn tick(&mut self, dt: f32) {
        match self.released.as_mut() {
            Some(r) => *r += dt,
            None => self.elapsed += dt,
        }
    }
}

/// Volume envelope. Attack rises linearly in amplitude; decay and release
/// fall linearly in centibels.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeEnvelope {
    params: EnvelopeParams,
    clock: Clock,
    release_from_cb: f32,
    stage: EnvelopeStage,
    gain: f32,
}

impl VolumeEnvelope {
    pub fn start(&mut self, params: EnvelopeParams) {
        *self = Self {
            params,
            ..Self::default()
        };
        self.evaluate();
    }

    pub fn set_params(&mut self, params: EnvelopeParams) {
        self.params = params;
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_finished(&self) -> bool {
        self.stage == EnvelopeStage::Finished
    }

    pub fn is_released(&self) -> bool {
        self.clock.released.is_some()
    }

    /// Enter release from the current level. `min_release` floors the
    /// release time.
    pub fn release(&mut self, min_release: f32) {
        if self.is_released() || self.is_finished() {
            return;
        }
        self.release_from_cb = gain_to_cb(self.gain);
        self.params.release = self.params.release.max(min_release);
        self.clock.released = Some(0.0);
        self.evaluate();
    }

    pub fn advance(&mut self, dt: f32) -> f32 {
        if self.stage != EnvelopeStage::Finished {
            self.clock.tick(dt);
            self.evaluate();
        }
        self.gain
    }

    fn evaluate(&mut self) {
        let p = self.params;
        let (stage, cb) = if let Some(r) = self.clock.released {
            let cb = if p.release > 0.0 {
                self.release_from_cb + r / p.release * STAGE_SWEEP_CB
            } else {
                SILENCE_CB
            };
            (EnvelopeStage::Release, cb)
        } else {
            match locate(&p, self.clock.elapsed) {
                (EnvelopeStage::Delay, _) => {
                    self.stage = EnvelopeStage::Delay;
                    self.gain = 0.0;
                    return;
                }
                (EnvelopeStage::Attack, t) => {
                    self.stage = EnvelopeStage::Attack;
                    self.gain = if p.attack > 0.0 { t / p.attack } else { 1.0 };
                    return;
                }
                (EnvelopeStage::Hold, _) => (EnvelopeStage::Hold, 0.0),
                (_, t) => {
                    let sustain = p.sustain.max(0.0);
                    let swept = if p.decay > 0.0 {
                        t / p.decay * STAGE_SWEEP_CB
                    } else {
                        f32::INFINITY
                    };
                    if swept >= sustain {
                        (EnvelopeStage::Sustain, sustain)
                    } else {
                        (EnvelopeStage::Decay, swept)
                    }
                }
            }
        };

        if cb >= SILENCE_CB {
            self.stage = EnvelopeStage::Finished;
            self.gain = 0.0;
        } else {
            self.stage = stage;
            self.gain = cb_to_gain(cb);
        }
    }
}

/// Modulation envelope, linear in `0.0..=1.0` throughout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulationEnvelope {
    params: EnvelopeParams,
    clock: Clock,
    release_from: f32,
    value: f32,
}

impl ModulationEnvelope {
    pub fn start(&mut self, params: EnvelopeParams) {
        *self = Self {
            params,
            ..Self::default()
        };
        self.evaluate();
    }

    pub fn set_params(&mut self, params: EnvelopeParams) {
        self.params = params;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn release(&mut self) {
        if self.clock.released.is_none() {
            self.release_from = self.value;
            self.clock.released = Some(0.0);
        }
    }

    pub fn advance(&mut self, dt: f32) -> f32 {
        self.clock.tick(dt);
        self.evaluate();
        self.value
    }

    fn evaluate(&mut self) {
        let p = self.params;
        let sustain = p.sustain.clamp(0.0, 1.0);
        self.value = if let Some(r) = self.clock.released {
            if p.release > 0.0 {
                (self.release_from - r / p.release).max(0.0)
            } else {
                0.0
            }
        } else {
            match locate(&p, self.clock.elapsed) {
                (EnvelopeStage::Delay, _) => 0.0,
                (EnvelopeStage::Attack, t) => {
                    if p.attack > 0.0 {
                        t / p.attack
                    } else {
                        1.0
                    }
                }
                (EnvelopeStage::Hold, _) => 1.0,
                (_, t) => {
                    if p.decay > 0.0 {
                        (1.0 - t / p.decay).max(sustain)
                    } else {
                        sustain
                    }
                }
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(attack: f32, hold: f32, decay: f32, sustain: f32, release: f32) -> EnvelopeParams {
        EnvelopeParams {
            delay: 0.0,
            attack,
            hold,
            decay,
            sustain,
            release,
        }
    }

    #[test]
    fn test_timecents() {
        assert_relative_eq!(timecents_to_seconds(0.0), 1.0);
        assert_relative_eq!(timecents_to_seconds(1200.0), 2.0);
        assert_relative_eq!(timecents_to_seconds(-1200.0), 0.5);
        assert_eq!(timecents_to_seconds(-32768.0), 0.0);
    }

    #[test]
    fn test_volume_stages() {
        let mut env = VolumeEnvelope::default();
        env.start(params(0.1, 0.1, 1.0, 500.0, 0.5));
        assert_eq!(env.stage(), EnvelopeStage::Attack);
        assert_relative_eq!(env.advance(0.05), 0.5, epsilon = 1e-5);
        env.advance(0.1);
        assert_eq!(env.stage(), EnvelopeStage::Hold);
        assert_relative_eq!(env.gain(), 1.0);
        // 0.25s into decay: 250 cB
        env.advance(0.3);
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        assert_relative_eq!(env.gain(), cb_to_gain(250.0), epsilon = 1e-4);
        env.advance(1.0);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert_relative_eq!(env.gain(), cb_to_gain(500.0), epsilon = 1e-6);
    }

    #[test]
    fn test_release_reaches_silence() {
        let mut env = VolumeEnvelope::default();
        env.start(params(0.0, 0.0, 1.0, 0.0, 0.2));
        env.advance(0.01);
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        env.release(0.01);
        assert_eq!(env.stage(), EnvelopeStage::Release);
        // 960 of 1000 cB swept after 0.192s
        env.advance(0.19);
        assert!(!env.is_finished());
        env.advance(0.005);
        assert!(env.is_finished());
        assert_eq!(env.gain(), 0.0);
    }

    #[test]
    fn test_release_floor() {
        let mut env = VolumeEnvelope::default();
        env.start(params(0.0, 1.0, 1.0, 0.0, 0.0));
        env.advance(0.001);
        env.release(0.1);
        env.advance(0.05);
        assert!(!env.is_finished());
        assert_relative_eq!(env.gain(), cb_to_gain(500.0), epsilon = 1e-4);
    }

    #[test]
    fn test_full_sustain_attenuation_finishes() {
        let mut env = VolumeEnvelope::default();
        env.start(params(0.0, 0.0, 0.1, 1440.0, 1.0));
        env.advance(0.2);
        assert!(env.is_finished());
    }

    #[test]
    fn test_release_during_delay_is_silent() {
        let mut env = VolumeEnvelope::default();
        env.start(EnvelopeParams {
            delay: 1.0,
            ..params(0.1, 0.0, 1.0, 0.0, 1.0)
        });
        env.advance(0.1);
        assert_eq!(env.stage(), EnvelopeStage::Delay);
        env.release(0.0);
        assert!(env.is_finished());
    }

    #[test]
    fn test_modulation_envelope() {
        let mut env = ModulationEnvelope::default();
        env.start(params(0.1, 0.0, 1.0, 0.5, 0.5));
        assert_relative_eq!(env.advance(0.05), 0.5, epsilon = 1e-5);
        assert_relative_eq!(env.advance(0.25), 0.8, epsilon = 1e-5);
        assert_relative_eq!(env.advance(1.0), 0.5, epsilon = 1e-6);
        env.release();
        assert_relative_eq!(env.advance(0.25), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_keynum_scaling() {
        let p = EnvelopeParams::from_timecents(-12000.0, -12000.0, 0.0, 0.0, 0.0, 0.0, 100.0, 0.0, 72);
        // 12 keys above 60 at 100 tc/key shortens hold by an octave
        assert_relative_eq!(p.hold, 0.5, epsilon = 1e-6);
        assert_relative_eq!(p.decay, 1.0);
    }
}
