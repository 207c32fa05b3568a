//! Polyphonic voice pool with a hard ceiling and voice stealing.
//!
//! Every slot owns one sounding voice plus a tail: when a slot is stolen
//! its old voice moves into the tail and fades out over a short ramp while
//! the new voice starts. Only owners count against the ceiling.
//!
//! Victim choice is deterministic:
//! - a releasing voice with the lowest current level, ties to the earliest release;
//! - otherwise the oldest-started voice, ties to the lowest id.
//!
//! All methods are RT-safe (no allocations after construction).

use crate::channel::Channel;
use crate::voice::{RenderContext, Voice, VoiceId, VoiceSetup};

/// Result of placing a new voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationResult {
    /// Started in a free slot.
    Allocated { voice_id: VoiceId, slot_index: usize },
    /// Started in place of an existing voice, which now fades out.
    Stolen {
        voice_id: VoiceId,
        slot_index: usize,
        stolen_voice_id: VoiceId,
    },
}

impl AllocationResult {
    pub fn voice_id(&self) -> VoiceId {
        match *self {
            Self::Allocated { voice_id, .. } | Self::Stolen { voice_id, .. } => voice_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    voice: Voice,
    tail: Voice,
}

pub struct VoicePool {
    slots: Vec<Slot>,
    next_voice_id: VoiceId,
    /// Shared counter for start and release ordering.
    order: u64,
    fade_samples: u32,
    steals: u64,
    hard_truncations: u64,
}

impl VoicePool {
    pub fn new(capacity: usize, fade_samples: u32) -> Self {
        Self {
            slots: vec![Slot::default(); capacity.max(1)],
            next_voice_id: 1,
            order: 0,
            fade_samples,
            steals: 0,
            hard_truncations: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Voice id the next allocation will receive.
    pub fn peek_next_id(&self) -> VoiceId {
        self.next_voice_id
    }

    fn next_order(order: &mut u64) -> u64 {
        *order += 1;
        *order
    }

    /// Start a voice for `setup`, stealing one if the pool is full.
    pub fn allocate(&mut self, setup: &VoiceSetup, channel: &Channel, ctx: &RenderContext) -> AllocationResult {
        let voice_id = self.next_voice_id;
        self.next_voice_id += 1;
        let order = Self::next_order(&mut self.order);

        let result = match self.slots.iter().position(|s| !s.voice.is_active()) {
            Some(slot_index) => AllocationResult::Allocated { voice_id, slot_index },
            None => {
                let slot_index = self.find_slot_to_steal();
                let slot = &mut self.slots[slot_index];
                if slot.tail.is_active() {
                    // the previous tail has not finished fading; cut it
                    slot.tail.kill();
                    self.hard_truncations += 1;
                }
                std::mem::swap(&mut slot.voice, &mut slot.tail);
                slot.tail.begin_fade(self.fade_samples, order);
                self.steals += 1;
                AllocationResult::Stolen {
                    voice_id,
                    slot_index,
                    stolen_voice_id: slot.tail.id(),
                }
            }
        };

        let slot_index = match result {
            AllocationResult::Allocated { slot_index, .. } | AllocationResult::Stolen { slot_index, .. } => slot_index,
        };
        self.slots[slot_index].voice.start(voice_id, order, setup, channel, ctx);
        result
    }

    /// Only called with every slot owned.
    fn find_slot_to_steal(&self) -> usize {
        let releasing = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.voice.is_releasing())
            .min_by(|(_, a), (_, b)| {
                a.voice
                    .level()
                    .total_cmp(&b.voice.level())
                    .then(a.voice.release_order().cmp(&b.voice.release_order()))
            });
        if let Some((i, _)) = releasing {
            return i;
        }

        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| (s.voice.start_order(), s.voice.id()))
            .map_or(0, |(i, _)| i)
    }

    /// Sounding voices that own a slot.
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().map(|s| &s.voice).filter(|v| v.is_active())
    }

    pub fn voices_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.iter_mut().map(|s| &mut s.voice).filter(|v| v.is_active())
    }

    /// Release every owned voice matching `pred`. Returns how many were released.
    pub fn release_where(&mut self, ctx: &RenderContext, mut pred: impl FnMut(&Voice) -> bool) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.voice.is_active() && pred(&slot.voice) {
                slot.voice.release(Self::next_order(&mut self.order), ctx);
                count += 1;
            }
        }
        count
    }

    /// Fade out every matching voice, tails included.
    pub fn fade_where(&mut self, mut pred: impl FnMut(&Voice) -> bool) -> usize {
        let mut count = 0;
        for slot in &mut self.slots {
            for voice in [&mut slot.voice, &mut slot.tail] {
                if voice.is_active() && pred(voice) {
                    voice.begin_fade(self.fade_samples, Self::next_order(&mut self.order));
                    count += 1;
                }
            }
        }
        count
    }

    /// Mix every owner and tail into the buffers, reclaiming finished voices.
    pub fn render(
        &mut self,
        channels: &[Channel],
        data: &[i16],
        ctx: &RenderContext,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        for slot in &mut self.slots {
            for voice in [&mut slot.voice, &mut slot.tail] {
                if !voice.is_active() {
                    continue;
                }
                match channels.get(usize::from(voice.channel())) {
                    Some(channel) => {
                        voice.render(channel, data, ctx, left, right);
                    }
                    None => voice.kill(),
                }
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.voice.is_active()).count()
    }

    /// Stolen voices still fading in a tail.
    pub fn fading_count(&self) -> usize {
        self.slots.iter().filter(|s| s.tail.is_active()).count()
    }

    pub fn steal_count(&self) -> u64 {
        self.steals
    }

    /// Tails cut without finishing their fade because their slot was stolen again.
    pub fn hard_truncations(&self) -> u64 {
        self.hard_truncations
    }

    /// Silence everything at once.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.voice.kill();
            slot.tail.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Interpolation, LoopReleaseMode};
    use crate::voice::oscillator::SampleRegion;
    use gending_soundfont::{GeneratorType, ModulatorList, ResolvedGenerators};

    fn ctx() -> RenderContext {
        RenderContext {
            output_rate: 44_100.0,
            block_seconds: 64.0 / 44_100.0,
            min_release: 0.01,
            interpolation: Interpolation::Linear,
            loop_release: LoopReleaseMode::FinishCycle,
        }
    }

    fn setup(key: u8) -> VoiceSetup {
        let mut generators = ResolvedGenerators::defaults();
        generators.set(GeneratorType::ReleaseVolEnv, 0);
        VoiceSetup {
            channel: 0,
            key,
            velocity: 100,
            generators,
            modulators: ModulatorList::new(),
            region: SampleRegion {
                start: 0,
                end: 44_100,
                loop_start: 0,
                loop_end: 0,
            },
            loop_allowed: true,
            sample_rate: 44_100,
            root_key: 60,
            pitch_correction: 0,
        }
    }

    fn render_block(pool: &mut VoicePool, channels: &[Channel], data: &[i16]) {
        let mut l = [0.0f32; 64];
        let mut r = [0.0f32; 64];
        pool.render(channels, data, &ctx(), &mut l, &mut r);
    }

    #[test]
    fn test_basic_allocation() {
        let ch = Channel::new(0);
        let mut pool = VoicePool::new(4, 32);
        let a = pool.allocate(&setup(60), &ch, &ctx());
        assert_eq!(a, AllocationResult::Allocated { voice_id: 1, slot_index: 0 });
        let b = pool.allocate(&setup(64), &ch, &ctx());
        assert_eq!(b, AllocationResult::Allocated { voice_id: 2, slot_index: 1 });
        assert_eq!(pool.active_count(), 2);
    }

    #[test]
    fn test_steals_oldest_when_nothing_releasing() {
        let ch = Channel::new(0);
        let mut pool = VoicePool::new(2, 32);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(64), &ch, &ctx());
        let c = pool.allocate(&setup(67), &ch, &ctx());
        assert_eq!(
            c,
            AllocationResult::Stolen {
                voice_id: 3,
                slot_index: 0,
                stolen_voice_id: 1
            }
        );
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.fading_count(), 1);
    }

    #[test]
    fn test_prefers_releasing_victim() {
        let ch = Channel::new(0);
        let data = vec![8000i16; 44_100];
        let mut pool = VoicePool::new(3, 32);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(62), &ch, &ctx());
        pool.allocate(&setup(64), &ch, &ctx());
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        pool.release_where(&ctx(), |v| v.key() == 62);
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        match pool.allocate(&setup(65), &ch, &ctx()) {
            AllocationResult::Stolen { stolen_voice_id, .. } => assert_eq!(stolen_voice_id, 2),
            other => panic!("expected a steal, got {other:?}"),
        }
    }

    #[test]
    fn test_quietest_releasing_wins() {
        let ch = Channel::new(0);
        let data = vec![8000i16; 44_100];
        let mut pool = VoicePool::new(2, 32);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(62), &ch, &ctx());
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        pool.release_where(&ctx(), |v| v.key() == 60);
        for _ in 0..20 {
            render_block(&mut pool, std::slice::from_ref(&ch), &data);
        }
        // voice 2 released later, so it is louder than voice 1
        pool.release_where(&ctx(), |v| v.key() == 62);
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        match pool.allocate(&setup(64), &ch, &ctx()) {
            AllocationResult::Stolen { stolen_voice_id, .. } => assert_eq!(stolen_voice_id, 1),
            other => panic!("expected a steal, got {other:?}"),
        }
    }

    #[test]
    fn test_restealing_a_slot_truncates_tail() {
        let ch = Channel::new(0);
        let mut pool = VoicePool::new(1, 1000);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(62), &ch, &ctx());
        assert_eq!(pool.hard_truncations(), 0);
        pool.allocate(&setup(64), &ch, &ctx());
        assert_eq!(pool.hard_truncations(), 1);
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.fading_count(), 1);
        assert_eq!(pool.steal_count(), 2);
    }

    #[test]
    fn test_tails_finish_fading() {
        let ch = Channel::new(0);
        let data = vec![8000i16; 44_100];
        let mut pool = VoicePool::new(1, 100);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(62), &ch, &ctx());
        assert_eq!(pool.fading_count(), 1);
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        render_block(&mut pool, std::slice::from_ref(&ch), &data);
        assert_eq!(pool.fading_count(), 0);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_reset() {
        let ch = Channel::new(0);
        let mut pool = VoicePool::new(2, 32);
        pool.allocate(&setup(60), &ch, &ctx());
        pool.allocate(&setup(62), &ch, &ctx());
        pool.allocate(&setup(64), &ch, &ctx());
        pool.reset();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.fading_count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_pool_never_exceeds_capacity(
            capacity in 1usize..8,
            keys in proptest::collection::vec(0u8..128, 1..40),
        ) {
            let ch = Channel::new(0);
            let data = vec![8000i16; 44_100];
            let mut pool = VoicePool::new(capacity, 32);
            let mut last_id = 0;
            for (i, key) in keys.iter().enumerate() {
                let id = pool.allocate(&setup(*key), &ch, &ctx()).voice_id();
                proptest::prop_assert!(id > last_id);
                last_id = id;
                proptest::prop_assert!(pool.active_count() <= capacity);
                if i % 3 == 0 {
                    render_block(&mut pool, std::slice::from_ref(&ch), &data);
                }
            }
        }
    }
}
