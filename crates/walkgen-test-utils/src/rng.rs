//! Seeded randomness for irregular caller clocks.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// ChaCha8 stream fixed by `seed`.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `count` sorted times drawn uniformly from `(start, end)`.
///
/// Used to oversample a caller clock at irregular instants.
pub fn jittered_times(rng: &mut ChaCha8Rng, start: f64, end: f64, count: usize) -> Vec<f64> {
    let mut times: Vec<f64> = (0..count)
        .map(|_| start + (end - start) * rng.gen_range(0.02..0.98))
        .collect();
    times.sort_by(f64::total_cmp);
    times
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
