//! Tempo validation and tick-interval arithmetic.

use crate::error::Error;

/// Lowest supported tempo in beats per minute.
pub const MIN_BPM: u32 = 30;
/// Highest supported tempo in beats per minute.
pub const MAX_BPM: u32 = 300;

/// A validated beats-per-minute value.
///
/// Construction enforces the supported range, so an existing `Tempo` always
/// yields a positive, finite inter-tick interval. Absent or invalid tempo is
/// expressed as `Option<Tempo>` at the scheduler boundary rather than as a
/// sentinel value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tempo {
    bpm: u32,
}

impl Tempo {
    /// Create a tempo, validating it against [`MIN_BPM`]..=[`MAX_BPM`].
    pub fn new(bpm: u32) -> Result<Self, Error> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(Error::TempoOutOfRange(bpm, MIN_BPM, MAX_BPM));
        }
        Ok(Self { bpm })
    }

    /// Parse a raw, possibly junk value from an external source.
    ///
    /// Non-finite, non-positive and out-of-range values all map to `None`,
    /// which the scheduler treats as "inactive" rather than as an error.
    pub fn from_raw(raw: f64) -> Option<Self> {
        if !raw.is_finite() || raw < 1.0 {
            return None;
        }
        Self::new(raw.round() as u32).ok()
    }

    /// The tempo in beats per minute.
    pub fn bpm(self) -> u32 {
        self.bpm
    }

    /// Seconds between consecutive ticks at this tempo.
    #[inline]
    pub fn interval(self) -> f64 {
        60.0 / self.bpm as f64
    }
}

impl std::fmt::Display for Tempo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bpm", self.bpm)
    }
}
