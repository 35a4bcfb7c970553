//! Clicktrack core - the look-ahead scheduling engine behind the `click`
//! metronome.
//!
//! This crate provides the building blocks for a bounded, self-correcting
//! metronome:
//!
//! - **Timing** - validated tempo and tick-interval arithmetic
//! - **Backend** - the audio clock-and-mixer abstraction plus WAV decoding
//! - **Loader** - idempotent click-sample loading and backend lifecycle
//! - **Scheduler** - the look-ahead tick scheduler with its tick ceiling
//! - **Runtime** - the scan thread and its parameter handle
//! - **Click** - synthesized fallback click sample
//!
//! # Architecture
//!
//! Activation parameters flow one way: a caller resolves the backend and
//! buffer through [`TickLoader`], hands them to a [`Runtime`], and then
//! drives `(tempo, active)` through the [`RuntimeHandle`]. The
//! [`TickScheduler`] owns all run state and talks to the world only
//! through [`OutputBackend`] and [`TickObserver`].
//!
//! # Feature Flags
//!
//! - `native` (default) - cpal output backend and device listing

pub mod backend;
pub mod click;
pub mod error;
pub mod loader;
pub mod runtime;
pub mod scheduler;
pub mod timing;

// Native-only module (requires system audio)
#[cfg(feature = "native")]
pub mod device;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience (platform-independent)
pub use backend::{decode_wav, BackendState, OutputBackend, TickBuffer};
pub use error::Error;
pub use loader::{FileSource, SampleSource, TickLoader};
pub use runtime::{Runtime, RuntimeHandle};
pub use scheduler::{
    TickObserver, TickScheduler, LOOKAHEAD_SECS, SCAN_INTERVAL_MS, START_OFFSET_SECS, TICK_CEILING,
};
pub use timing::{Tempo, MAX_BPM, MIN_BPM};

// Native-only re-exports
#[cfg(feature = "native")]
pub use device::{list_output_devices, CpalBackend, OutputDeviceInfo};
