//! Resonant low-pass biquad (RBJ cookbook), one per voice.

use std::f32::consts::PI;

/// Cutoff at or above this many absolute cents with no resonance is a
/// pass-through.
const BYPASS_CENTS: f32 = 13500.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct LowPass {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    /// Last (cutoff cents, Q centibels) the coefficients were built for.
    tuned: Option<(f32, f32)>,
    bypass: bool,
}

impl LowPass {
    pub fn reset(&mut self) {
        *self = Self {
            bypass: true,
            ..Self::default()
        };
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Retune for a cutoff in absolute cents and a resonance in centibels.
    /// Coefficients are rebuilt only when either value moved.
    pub fn set(&mut self, cutoff_cents: f32, q_cb: f32, sample_rate: f32) {
        if let Some((c, q)) = self.tuned {
            if (c - cutoff_cents).abs() < 1.0 && (q - q_cb).abs() < 0.5 {
                return;
            }
        }
        self.tuned = Some((cutoff_cents, q_cb));

        let bypass = cutoff_cents >= BYPASS_CENTS && q_cb <= 0.0;
        if bypass {
            self.bypass = true;
            return;
        }
        if self.bypass {
            self.x1 = 0.0;
            self.x2 = 0.0;
            self.y1 = 0.0;
            self.y2 = 0.0;
            self.bypass = false;
        }

        let hz = (8.176 * (cutoff_cents / 1200.0).exp2()).clamp(5.0, sample_rate * 0.45);
        let q = std::f32::consts::FRAC_1_SQRT_2 * 10f32.powf(q_cb.max(0.0) / 200.0);
        let w0 = 2.0 * PI * hz / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        self.b1 = (1.0 - cos) / a0;
        self.b0 = self.b1 * 0.5;
        self.b2 = self.b0;
        self.a1 = -2.0 * cos / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        if self.bypass {
            return x;
        }
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}
