//! Piecewise-constant tempo map converting between ticks and seconds.

use serde::{Deserialize, Serialize};

/// 120 BPM.
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Floor applied to a tempo of zero.
pub const MIN_MICROS_PER_QUARTER: u32 = 1;

/// One breakpoint: from `tick` on, a quarter note lasts `micros_per_quarter`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u64,
    pub micros_per_quarter: u32,
    /// Seconds elapsed at `tick`.
    seconds: f64,
}

impl TempoChange {
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn bpm(&self) -> f64 {
        60_000_000.0 / f64::from(self.micros_per_quarter)
    }
}

/// Breakpoints with strictly increasing ticks; the first is always at tick 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMap {
    ticks_per_quarter: u16,
    points: Vec<TempoChange>,
}

impl TempoMap {
    /// Constant 120 BPM.
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self::from_changes(ticks_per_quarter, std::iter::empty())
    }

    /// Build from (tick, µs-per-quarter) pairs in any order. A later change
    /// at an already-seen tick replaces the earlier one. Zero tempos are
    /// clamped to [`MIN_MICROS_PER_QUARTER`].
    pub fn from_changes(ticks_per_quarter: u16, changes: impl IntoIterator<Item = (u64, u32)>) -> Self {
        let mut raw: Vec<(u64, u32)> = changes.into_iter().collect();
        // stable: equal ticks keep file order so the last one wins below
        raw.sort_by_key(|(tick, _)| *tick);

        let mut points: Vec<TempoChange> = vec![TempoChange {
            tick: 0,
            micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
            seconds: 0.0,
        }];
        for (tick, tempo) in raw {
            let micros_per_quarter = tempo.max(MIN_MICROS_PER_QUARTER);
            match points.last_mut() {
                Some(last) if last.tick == tick => last.micros_per_quarter = micros_per_quarter,
                _ => points.push(TempoChange {
                    tick,
                    micros_per_quarter,
                    seconds: 0.0,
                }),
            }
        }

        let tpq = f64::from(ticks_per_quarter.max(1));
        for i in 1..points.len() {
            let prev = points[i - 1];
            let span = (points[i].tick - prev.tick) as f64;
            points[i].seconds = prev.seconds + span * f64::from(prev.micros_per_quarter) / 1e6 / tpq;
        }

        Self {
            ticks_per_quarter: ticks_per_quarter.max(1),
            points,
        }
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn points(&self) -> &[TempoChange] {
        &self.points
    }

    fn segment_for_tick(&self, tick: f64) -> &TempoChange {
        let idx = self.points.partition_point(|p| (p.tick as f64) <= tick);
        &self.points[idx.saturating_sub(1)]
    }

    fn segment_for_seconds(&self, seconds: f64) -> &TempoChange {
        let idx = self.points.partition_point(|p| p.seconds <= seconds);
        &self.points[idx.saturating_sub(1)]
    }

    /// Seconds elapsed at a (possibly fractional) tick. Negative ticks map to 0.
    pub fn tick_to_seconds(&self, tick: f64) -> f64 {
        let tick = tick.max(0.0);
        let p = self.segment_for_tick(tick);
        let tpq = f64::from(self.ticks_per_quarter);
        p.seconds + (tick - p.tick as f64) * f64::from(p.micros_per_quarter) / 1e6 / tpq
    }

    /// Fractional tick reached after `seconds`. Inverse of [`tick_to_seconds`](Self::tick_to_seconds).
    pub fn seconds_to_tick(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        let p = self.segment_for_seconds(seconds);
        let tpq = f64::from(self.ticks_per_quarter);
        p.tick as f64 + (seconds - p.seconds) * 1e6 * tpq / f64::from(p.micros_per_quarter)
    }

    pub fn micros_per_quarter_at(&self, tick: u64) -> u32 {
        self.segment_for_tick(tick as f64).micros_per_quarter
    }

    pub fn bpm_at(&self, tick: u64) -> f64 {
        self.segment_for_tick(tick as f64).bpm()
    }
}
