//! Short random identifiers for stored objects.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    sync::{Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Generates lowercase identifiers from an owned, seedable random source.
///
/// Uniqueness is probabilistic: no check is made against ids already in use.
pub struct NameGenerator {
    rng: Mutex<StdRng>,
}

impl NameGenerator {
    /// Seed from the current wall-clock time.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos)
    }

    /// Deterministic generator, used by tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(&self, length: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_length_from_lowercase_alphabet() {
        let names = NameGenerator::new();
        for length in [0, 1, 6, 32] {
            let name = names.generate(length);
            assert_eq!(name.len(), length);
            assert!(name.bytes().all(|b| b.is_ascii_lowercase()));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = NameGenerator::with_seed(42);
        let b = NameGenerator::with_seed(42);
        let first: Vec<String> = (0..5).map(|_| a.generate(6)).collect();
        let second: Vec<String> = (0..5).map(|_| b.generate(6)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn successive_names_differ() {
        let names = NameGenerator::with_seed(7);
        let a = names.generate(12);
        let b = names.generate(12);
        assert_ne!(a, b);
    }
}
