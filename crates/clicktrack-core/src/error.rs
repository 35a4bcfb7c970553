use std::io;
use thiserror::Error;

/// Errors produced by the clicktrack core.
///
/// Backend failures during a running tick sequence are deliberately *not*
/// represented here: a playback call that fails mid-run is logged and
/// swallowed by the scheduler so a lost click never kills the scan loop.
/// This enum covers the recoverable setup-time failures (loading, decoding,
/// opening and resuming the output backend) plus parameter validation.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading the click sample from its source failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Tempo outside the supported beats-per-minute range.
    #[error("tempo {0} bpm outside supported range {1}..={2}")]
    TempoOutOfRange(u32, u32, u32),

    /// The click sample bytes could not be decoded.
    #[error("failed to decode click sample: {0}")]
    Decode(String),

    /// The output backend has been closed and must be recreated.
    #[error("audio backend is closed")]
    BackendClosed,

    /// Resuming a suspended output backend failed.
    #[error("failed to resume audio backend: {0}")]
    Resume(String),

    /// Opening or configuring the audio output failed.
    #[error("audio output error: {0}")]
    Output(String),

    /// Scheduling a one-shot playback failed.
    #[error("playback scheduling failed: {0}")]
    Playback(String),
}
