//! Sample playback: fractional cursor, interpolation, loop handling.

use crate::settings::{Interpolation, LoopReleaseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    NoLoop,
    Continuous,
    /// Loop while the key is held, then play the remainder.
    UntilRelease,
}

impl LoopMode {
    /// `sampleModes` generator: 1 loops, 3 loops until release, 0 and 2 do not.
    pub fn from_generator(value: i32) -> Self {
        match value {
            1 => Self::Continuous,
            3 => Self::UntilRelease,
            _ => Self::NoLoop,
        }
    }
}

/// Absolute frame positions in the bank's sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleRegion {
    pub start: usize,
    pub end: usize,
    pub loop_start: usize,
    pub loop_end: usize,
}

impl SampleRegion {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loop points are usable only inside the region with start before end.
    pub fn loop_is_valid(&self) -> bool {
        self.loop_start < self.loop_end && self.loop_start >= self.start && self.loop_end <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Oscillator {
    region: SampleRegion,
    mode: LoopMode,
    /// Still wrapping at loop end.
    looping: bool,
    position: f64,
    interpolation: Interpolation,
    finished: bool,
}

impl Oscillator {
    /// `mode` is downgraded to [`LoopMode::NoLoop`] when the loop points
    /// are unusable or `loop_allowed` is false.
    pub fn start(&mut self, region: SampleRegion, mode: LoopMode, loop_allowed: bool, interpolation: Interpolation) {
        let mode = if loop_allowed && region.loop_is_valid() {
            mode
        } else {
            LoopMode::NoLoop
        };
        *self = Self {
            region,
            mode,
            looping: mode != LoopMode::NoLoop,
            position: region.start as f64,
            interpolation,
            finished: region.is_empty(),
        };
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Note-off for loop-until-release samples.
    pub fn release(&mut self, behaviour: LoopReleaseMode) {
        if self.mode != LoopMode::UntilRelease || !self.looping {
            return;
        }
        self.looping = false;
        if behaviour == LoopReleaseMode::JumpToTail {
            let r = self.region;
            let pos = self.position;
            if pos >= r.loop_start as f64 && pos < r.loop_end as f64 {
                self.position = r.loop_end as f64 + pos.fract();
            }
        }
    }

    /// Next output sample in `-1.0..1.0`, advancing by `ratio` frames.
    /// Returns 0 once the region is exhausted.
    #[inline]
    pub fn next(&mut self, data: &[i16], ratio: f64) -> f32 {
        if self.finished {
            return 0.0;
        }
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let value = match self.interpolation {
            Interpolation::Linear => {
                let x0 = self.frame(data, index as isize);
                let x1 = self.frame(data, index as isize + 1);
                x0 + (x1 - x0) * frac
            }
            Interpolation::Cubic => {
                let i = index as isize;
                hermite(
                    self.frame(data, i - 1),
                    self.frame(data, i),
                    self.frame(data, i + 1),
                    self.frame(data, i + 2),
                    frac,
                )
            }
        };

        self.position += ratio;
        let r = self.region;
        if self.looping {
            if self.position >= r.loop_end as f64 {
                let len = (r.loop_end - r.loop_start) as f64;
                self.position = (self.position - r.loop_start as f64).rem_euclid(len) + r.loop_start as f64;
            }
        } else if self.position >= r.end as f64 {
            self.finished = true;
        }
        value
    }

    /// Read one frame, wrapping across the loop seam while looping and
    /// reading silence outside the region.
    #[inline]
    fn frame(&self, data: &[i16], index: isize) -> f32 {
        let r = self.region;
        let mut i = index;
        if self.looping {
            let len = (r.loop_end - r.loop_start) as isize;
            if i >= r.loop_end as isize {
                i = (i - r.loop_start as isize).rem_euclid(len) + r.loop_start as isize;
            } else if i < r.loop_start as isize && self.position >= r.loop_start as f64 {
                i += len;
            }
        }
        if i < r.start as isize || i >= r.end as isize {
            return 0.0;
        }
        data.get(i as usize).map_or(0.0, |&s| f32::from(s) / 32768.0)
    }
}

/// 4-point, 3rd-order Hermite.
#[inline]
fn hermite(x0: f32, x1: f32, x2: f32, x3: f32, t: f32) -> f32 {
    let c1 = 0.5 * (x2 - x0);
    let c2 = x0 - 2.5 * x1 + 2.0 * x2 - 0.5 * x3;
    let c3 = 0.5 * (x3 - x0) + 1.5 * (x1 - x2);
    ((c3 * t + c2) * t + c1) * t + x1
}
