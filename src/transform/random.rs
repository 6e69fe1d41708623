//! Seeded randomness for reproducible variation.
//!
//! PCG-32 is a fixed, documented algorithm, so a seed yields the same draw
//! sequence on every platform. Shuffles are done here with explicit draws
//! instead of `rand`'s slice helpers so the sequence never depends on how a
//! library version happens to consume the generator.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

pub struct SeededRng {
    rng: Pcg32,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed as u64),
        }
    }

    /// Uniform draw in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw in [min, max); returns `min` when the range is empty
    pub fn range(&mut self, min: f64, max: f64) -> f64 {
        let u = self.uniform();
        if max > min {
            min + u * (max - min)
        } else {
            min
        }
    }

    /// Uniformly pick one element; consumes one draw even for a single element
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.index(items.len());
        items.get(index)
    }

    /// Fisher-Yates shuffle, walking from the back
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }

    fn index(&mut self, len: usize) -> usize {
        ((self.uniform() * len as f64) as usize).min(len - 1)
    }
}
