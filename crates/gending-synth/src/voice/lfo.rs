//! Triangle LFO with a start delay.

/// Absolute cents to Hz (`0` cents is 8.176 Hz).
#[inline]
pub fn cents_to_hz(cents: f32) -> f32 {
    8.176 * (cents / 1200.0).exp2()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lfo {
    delay: f32,
    elapsed: f32,
    phase: f32,
    value: f32,
}

impl Lfo {
    pub fn start(&mut self, delay: f32) {
        *self = Self {
            delay,
            ..Self::default()
        };
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance by `dt` seconds at `frequency` Hz and return the bipolar value.
    /// Frequency may change between calls without a phase jump.
    pub fn advance(&mut self, dt: f32, frequency: f32) -> f32 {
        let before = self.elapsed;
        self.elapsed += dt;
        if self.elapsed > self.delay {
            let running = self.elapsed - before.max(self.delay);
            self.phase = (self.phase + running * frequency).fract();
            self.value = triangle(self.phase);
        }
        self.value
    }
}

/// 0 at phase 0, +1 at 0.25, -1 at 0.75.
fn triangle(phase: f32) -> f32 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_frequency() {
        assert_relative_eq!(cents_to_hz(0.0), 8.176);
        assert_relative_eq!(cents_to_hz(1200.0), 16.352, epsilon = 1e-4);
    }

    #[test]
    fn test_delay_then_triangle() {
        let mut lfo = Lfo::default();
        lfo.start(0.5);
        assert_eq!(lfo.advance(0.25, 1.0), 0.0);
        assert_eq!(lfo.advance(0.25, 1.0), 0.0);
        assert_relative_eq!(lfo.advance(0.25, 1.0), 1.0, epsilon = 1e-5);
        assert_relative_eq!(lfo.advance(0.25, 1.0), 0.0, epsilon = 1e-5);
        assert_relative_eq!(lfo.advance(0.25, 1.0), -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_delay_boundary_inside_block() {
        let mut lfo = Lfo::default();
        lfo.start(0.1);
        // only 0.125s of the block runs past the delay
        assert_relative_eq!(lfo.advance(0.225, 1.0), 0.5, epsilon = 1e-5);
    }
}
