//! Per-game randomness. Each simulation owns exactly one `Dice`, seeded
//! from its config, so independent games never share generator state.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Die {
    D6,
    D8,
    D10,
    D12,
    D20,
}

impl Die {
    pub const fn sides(self) -> u8 {
        match self {
            Die::D6 => 6,
            Die::D8 => 8,
            Die::D10 => 10,
            Die::D12 => 12,
            Die::D20 => 20,
        }
    }
}

/// Anything that can produce a face value for a die.
pub trait Roller {
    fn roll(&mut self, die: Die) -> u8;
}

#[derive(Debug, Clone)]
pub struct Dice {
    rng: ChaCha8Rng,
    seed: u64,
    rolls: u64,
}

impl Dice {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            rolls: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rolls_made(&self) -> u64 {
        self.rolls
    }

    pub fn roll_sum(&mut self, count: u8, die: Die) -> u32 {
        (0..count).map(|_| u32::from(self.roll(die))).sum()
    }

    /// Bernoulli draw. Certain outcomes do not consume randomness.
    pub fn chance(&mut self, probability: f64) -> bool {
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 || probability.is_nan() {
            return false;
        }
        self.rng.gen_bool(probability)
    }

    /// Uniform pick in `0..len`; `len` must be non-zero.
    pub fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    pub(crate) fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

impl Roller for Dice {
    fn roll(&mut self, die: Die) -> u8 {
        self.rolls += 1;
        self.rng.gen_range(1..=die.sides())
    }
}

/// Rolls supplied up front (physical dice, audited replays), falling back to
/// the game's dice once the preset values run out.
pub struct PresetRolls<'a> {
    preset: std::slice::Iter<'a, u8>,
    fallback: &'a mut Dice,
}

impl<'a> PresetRolls<'a> {
    pub fn new(preset: &'a [u8], fallback: &'a mut Dice) -> Self {
        Self {
            preset: preset.iter(),
            fallback,
        }
    }
}

impl Roller for PresetRolls<'_> {
    fn roll(&mut self, die: Die) -> u8 {
        match self.preset.next() {
            Some(&value) => value.clamp(1, die.sides()),
            None => self.fallback.roll(die),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_rolls() {
        let mut a = Dice::from_seed(42);
        let mut b = Dice::from_seed(42);
        let left: Vec<u8> = (0..32).map(|_| a.roll(Die::D20)).collect();
        let right: Vec<u8> = (0..32).map(|_| b.roll(Die::D20)).collect();
        assert_eq!(left, right);
        assert_eq!(a.rolls_made(), 32);
    }

    #[test]
    fn rolls_stay_on_the_die() {
        let mut dice = Dice::from_seed(7);
        for die in [Die::D6, Die::D8, Die::D10, Die::D12, Die::D20] {
            for _ in 0..200 {
                let value = dice.roll(die);
                assert!((1..=die.sides()).contains(&value));
            }
        }
    }

    #[test]
    fn two_d10_spans_two_to_twenty() {
        let mut dice = Dice::from_seed(3);
        for _ in 0..500 {
            let total = dice.roll_sum(2, Die::D10);
            assert!((2..=20).contains(&total));
        }
    }

    #[test]
    fn preset_rolls_take_priority_then_fall_back() {
        let mut dice = Dice::from_seed(1);
        let mut roller = PresetRolls::new(&[20, 1], &mut dice);
        assert_eq!(roller.roll(Die::D20), 20);
        assert_eq!(roller.roll(Die::D20), 1);
        let fallback = roller.roll(Die::D20);
        assert!((1..=20).contains(&fallback));
        assert_eq!(dice.rolls_made(), 1);
    }

    #[test]
    fn certain_chances_skip_the_rng() {
        let mut dice = Dice::from_seed(9);
        assert!(dice.chance(1.0));
        assert!(!dice.chance(0.0));
        assert_eq!(dice.rolls_made(), 0);
    }
}
