//! Audio output backend abstraction.
//!
//! The scheduler never talks to a sound device directly. It goes through
//! [`OutputBackend`], which exposes the three capabilities it needs: a
//! monotonic clock in seconds, decoding raw sample bytes into a
//! [`TickBuffer`], and scheduling a one-shot playback of that buffer at an
//! arbitrary clock time. The cpal-backed implementation lives in
//! [`crate::device`]; tests use an in-memory mock.

use std::io::Cursor;
use std::sync::Arc;

use crate::error::Error;

/// Lifecycle state of an output backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendState {
    /// Clock advancing, playback audible.
    Running,
    /// Clock frozen until [`OutputBackend::resume`] is called.
    Suspended,
    /// Torn down for good; a new backend must be created.
    Closed,
}

/// An immutable decoded click sample.
///
/// Mono `f32` samples behind an `Arc`: cheap to clone and shared read-only
/// by every scheduled playback. Two buffers are "the same" when they share
/// sample storage, which is what the scheduler diffs on.
#[derive(Clone, Debug)]
pub struct TickBuffer {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl TickBuffer {
    /// Wrap decoded samples at the given rate.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    /// The decoded samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate of the decoded data in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the sample in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Identity comparison: true when both buffers share sample storage.
    pub fn same_as(&self, other: &TickBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// A clock-and-mixer resource capable of sample-accurate one-shot playback.
pub trait OutputBackend: Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> BackendState;

    /// Resume a suspended backend. Fails if the backend is closed.
    fn resume(&self) -> Result<(), Error>;

    /// Seconds on the backend's own clock. Monotonically increasing while
    /// running, never reset mid-run.
    fn current_time(&self) -> f64;

    /// Decode raw sample bytes into a playable buffer.
    fn decode(&self, bytes: &[u8]) -> Result<TickBuffer, Error>;

    /// Schedule `buffer` for one-shot playback starting at clock time
    /// `when`. A `when` in the past starts playback mid-sample rather than
    /// delaying it.
    fn play_at(&self, buffer: &TickBuffer, when: f64) -> Result<(), Error>;
}

/// Decode WAV bytes into a mono [`TickBuffer`].
///
/// Integer formats are normalized to `f32`, multi-channel data is averaged
/// down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<TickBuffer, Error> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(Error::Decode("WAV data reports zero channels".to_string()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            let raw: Vec<f32> = reader.into_samples::<f32>().filter_map(|s| s.ok()).collect();
            mix_to_mono(&raw, channels)
        }
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            let raw: Vec<f32> = reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_value)
                .collect();
            mix_to_mono(&raw, channels)
        }
    };

    if samples.is_empty() {
        return Err(Error::Decode("no samples in WAV data".to_string()));
    }

    Ok(TickBuffer::new(samples, spec.sample_rate))
}

/// Mix multi-channel audio to mono by averaging channels.
fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
