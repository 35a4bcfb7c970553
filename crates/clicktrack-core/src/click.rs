//! Synthesized fallback click.
//!
//! When no click sample is available on disk, the metronome falls back to a
//! short white-noise burst with an exponential decay envelope.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::TickBuffer;

/// Duration of the synthesized click in seconds.
const CLICK_SECS: f64 = 0.03;
/// Peak gain of the synthesized click.
const CLICK_GAIN: f32 = 0.3;
/// Fixed seed: the click must be identical across runs.
const CLICK_SEED: u64 = 42;

/// Generate the fallback click at the given sample rate.
pub fn noise_burst(sample_rate: u32) -> TickBuffer {
    let len = (sample_rate as f64 * CLICK_SECS) as usize;
    let mut rng = StdRng::seed_from_u64(CLICK_SEED);

    let mut samples = Vec::with_capacity(len);
    for i in 0..len {
        let envelope = (-40.0 * i as f32 / len as f32).exp();
        samples.push(rng.random_range(-1.0..1.0) * envelope * CLICK_GAIN);
    }

    TickBuffer::new(samples, sample_rate)
}
