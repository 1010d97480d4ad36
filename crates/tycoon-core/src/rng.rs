//! The park's random stream.
//!
//! Every random decision in the tick (guest wandering, littering, breakdowns,
//! weather) draws from the one [`SimRng`] stored in the simulation context.
//! Its state is part of the checksum and is the seed recorded with each
//! snapshot, so two peers agree on every roll as long as they agree on state.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;

/// SplitMix64 increment.
const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// High half of the next draw.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in `0..bound`; 0 when `bound` is 0.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        ((u64::from(self.next_u32()) * u64::from(bound)) >> 32) as u32
    }

    /// True once in `n` draws on average. `one_in(0)` never fires.
    pub fn one_in(&mut self, n: u32) -> bool {
        n != 0 && self.next_below(n) == 0
    }

    /// Random heading, 0 to 3.
    pub fn direction(&mut self) -> u8 {
        self.next_below(4) as u8
    }

    /// Random index into a collection of `len` items.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let bound = u32::try_from(len).unwrap_or(u32::MAX);
        Some(self.next_below(bound) as usize)
    }

    /// True with `probability`, clamped to `[0, 1]`.
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::ONE {
            return true;
        }
        // The fractional bits of an I32F32 below one are a 32-bit threshold.
        u64::from(self.next_u32()) < probability.to_bits() as u64
    }

    pub fn state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_seeds_roll_identically() {
        let mut a = SimRng::new(0x5EED);
        let mut b = SimRng::new(0x5EED);
        let rolls_a: Vec<u32> = (0..64).map(|_| a.next_below(1000)).collect();
        let rolls_b: Vec<u32> = (0..64).map(|_| b.next_below(1000)).collect();
        assert_eq!(rolls_a, rolls_b);
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn state_moves_every_draw() {
        let mut rng = SimRng::new(3);
        let before = rng.state();
        rng.direction();
        assert_ne!(rng.state(), before);
    }

    #[test]
    fn bounded_helpers_stay_in_range() {
        let mut rng = SimRng::new(11);
        for _ in 0..500 {
            assert!(rng.direction() < 4);
            assert!(rng.index(7).is_some_and(|i| i < 7));
        }
        assert_eq!(rng.index(0), None);
        assert_eq!(rng.next_below(0), 0);
        assert!(!rng.one_in(0));
        assert!(rng.one_in(1));
    }

    #[test]
    fn chance_respects_bounds_and_rate() {
        let mut rng = SimRng::new(77);
        assert!(!rng.chance(Fixed64::ZERO));
        assert!(rng.chance(Fixed64::ONE));
        assert!(!rng.chance(Fixed64::from_num(-2)));

        let quarter = Fixed64::from_num(0.25);
        let hits = (0..8000).filter(|_| rng.chance(quarter)).count();
        assert!((1600..=2400).contains(&hits), "got {hits}");
    }

    #[test]
    fn restored_state_continues_the_stream() {
        let mut rng = SimRng::new(9);
        rng.next_u64();
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SimRng = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_u64(), rng.next_u64());
    }
}
