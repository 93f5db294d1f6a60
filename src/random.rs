//! Deterministic randomness for moves and setup.
//!
//! The generator is a ChaCha8 stream whose seed and word position live in
//! `ctx._random`. Restoring the position makes every replay of an action
//! produce the same numbers, and the state never leaves the server because
//! filtered views drop `_random`.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Serializable PRNG position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RandomState {
    /// Seed the stream was created from.
    pub seed: u64,
    /// ChaCha8 word position within the stream.
    #[serde(rename = "prngstate")]
    pub word_pos: u64,
}

impl RandomState {
    /// State at the start of the stream for `seed`.
    pub fn new(seed: u64) -> Self {
        Self { seed, word_pos: 0 }
    }
}

/// Random number API handed to moves and setup.
#[derive(Debug, Clone)]
pub struct Random {
    inner: ChaCha8Rng,
    seed: u64,
}

impl Random {
    /// Resumes the stream described by `state`.
    #[instrument]
    pub fn from_state(state: RandomState) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(state.seed);
        inner.set_word_pos(u128::from(state.word_pos));
        Self {
            inner,
            seed: state.seed,
        }
    }

    /// Current position, to be written back into `ctx._random`.
    pub fn state(&self) -> RandomState {
        RandomState {
            seed: self.seed,
            word_pos: u64::try_from(self.inner.get_word_pos()).unwrap_or(u64::MAX),
        }
    }

    /// Uniform number in `[0, 1)`.
    pub fn number(&mut self) -> f64 {
        self.inner.gen_range(0.0..1.0)
    }

    /// Rolls one die with `sides` faces, returning `1..=sides`.
    pub fn die(&mut self, sides: u32) -> u32 {
        self.inner.gen_range(1..=sides.max(1))
    }

    /// Rolls `count` dice with `sides` faces each.
    pub fn roll(&mut self, sides: u32, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.die(sides)).collect()
    }

    /// Six-sided die.
    pub fn d6(&mut self) -> u32 {
        self.die(6)
    }

    /// Uniform index in `0..len`, `None` for an empty range.
    pub fn index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.inner.gen_range(0..len))
    }

    /// Returns `items` in shuffled order.
    pub fn shuffle<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        items.shuffle(&mut self.inner);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_state_same_sequence() {
        let mut first = Random::from_state(RandomState::new(42));
        let mut second = Random::from_state(RandomState::new(42));
        assert_eq!(first.roll(6, 20), second.roll(6, 20));
    }

    #[test]
    fn test_resume_from_saved_position() {
        let mut rng = Random::from_state(RandomState::new(7));
        let _ = rng.roll(20, 5);
        let saved = rng.state();
        let expected = rng.roll(20, 5);

        let mut resumed = Random::from_state(saved);
        assert_eq!(resumed.roll(20, 5), expected);
    }

    #[test]
    fn test_die_bounds() {
        let mut rng = Random::from_state(RandomState::new(1));
        for _ in 0..200 {
            let value = rng.d6();
            assert!((1..=6).contains(&value));
        }
        assert_eq!(rng.die(0), 1);
        assert_eq!(rng.index(0), None);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = Random::from_state(RandomState::new(3));
        let mut shuffled = rng.shuffle((0..10).collect::<Vec<u32>>());
        shuffled.sort_unstable();
        assert_eq!(shuffled, (0..10).collect::<Vec<u32>>());
    }
}
