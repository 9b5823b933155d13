use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;

/// Length of every generated short id.
pub const SHORT_ID_LEN: usize = 6;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Produces random short id candidates.
///
/// The generator owns a single non-cryptographic RNG seeded once at
/// construction. It keeps no record of what it has produced, so candidates
/// can repeat; uniqueness is the caller's problem.
#[derive(Debug)]
pub struct IdGenerator {
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic generator, mostly useful in tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Draw a fresh 6-letter candidate.
    pub fn generate_candidate(&self) -> String {
        // A poisoned lock still holds a usable RNG.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        (0..SHORT_ID_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
