//! cpal output backend.
//!
//! Implements [`OutputBackend`] over a cpal output stream. The backend
//! clock is a frame counter advanced by the audio callback, so
//! `current_time` is exactly the amount of audio rendered — it freezes
//! while the stream is suspended, like the scheduler expects. Scheduled
//! playbacks become voices that the callback mixes in at their start
//! frame, which is what gives sample-accurate spacing even though the
//! scan loop is only millisecond-accurate.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::backend::{decode_wav, BackendState, OutputBackend, TickBuffer};
use crate::error::Error;

const STATE_RUNNING: u8 = 0;
const STATE_SUSPENDED: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// One scheduled playback of the click buffer.
struct Voice {
    buffer: TickBuffer,
    /// Frame on the backend clock at which sample 0 plays.
    start_frame: i64,
}

/// State shared between the backend handle and the audio callback.
struct Shared {
    frame_clock: AtomicU64,
    voices: Mutex<Vec<Voice>>,
    state: AtomicU8,
    sample_rate: u32,
}

// cpal streams are not Send on every platform. The stream here is only
// ever driven by the audio thread; off-thread access is limited to
// play()/pause(), which take &self.
struct StreamCell(cpal::Stream);
unsafe impl Send for StreamCell {}
unsafe impl Sync for StreamCell {}

/// Audio output backend over the default cpal output device.
pub struct CpalBackend {
    shared: Arc<Shared>,
    stream: StreamCell,
}

impl CpalBackend {
    /// Open the default output device and start the stream.
    pub fn open() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("no output device found".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::Output(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate;

        log::info!(
            "opening audio output: {} Hz, {} channels, {sample_format}",
            sample_rate,
            config.channels
        );

        let shared = Arc::new(Shared {
            frame_clock: AtomicU64::new(0),
            voices: Mutex::new(Vec::new()),
            state: AtomicU8::new(STATE_SUSPENDED),
            sample_rate,
        });

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&shared)),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&shared)),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&shared)),
            other => Err(Error::Output(format!("unsupported sample format: {other}"))),
        }?;

        stream.play().map_err(|e| Error::Output(e.to_string()))?;
        shared.state.store(STATE_RUNNING, Ordering::Relaxed);

        Ok(Self {
            shared,
            stream: StreamCell(stream),
        })
    }

    /// Device sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Pause the stream, freezing the backend clock.
    pub fn suspend(&self) -> Result<(), Error> {
        if self.state() == BackendState::Closed {
            return Err(Error::BackendClosed);
        }
        self.stream
            .0
            .pause()
            .map_err(|e| Error::Output(e.to_string()))?;
        self.shared.state.store(STATE_SUSPENDED, Ordering::Relaxed);
        Ok(())
    }

    /// Tear the backend down for good. Pending voices are dropped; a new
    /// backend must be opened to play again.
    pub fn close(&self) {
        let _ = self.stream.0.pause();
        self.shared.state.store(STATE_CLOSED, Ordering::Relaxed);
        if let Ok(mut voices) = self.shared.voices.lock() {
            voices.clear();
        }
    }
}

impl OutputBackend for CpalBackend {
    fn state(&self) -> BackendState {
        match self.shared.state.load(Ordering::Relaxed) {
            STATE_RUNNING => BackendState::Running,
            STATE_SUSPENDED => BackendState::Suspended,
            _ => BackendState::Closed,
        }
    }

    fn resume(&self) -> Result<(), Error> {
        if self.state() == BackendState::Closed {
            return Err(Error::BackendClosed);
        }
        self.stream
            .0
            .play()
            .map_err(|e| Error::Resume(e.to_string()))?;
        self.shared.state.store(STATE_RUNNING, Ordering::Relaxed);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.shared.frame_clock.load(Ordering::Relaxed) as f64 / self.shared.sample_rate as f64
    }

    fn decode(&self, bytes: &[u8]) -> Result<TickBuffer, Error> {
        let buffer = decode_wav(bytes)?;
        if buffer.sample_rate() == self.shared.sample_rate {
            return Ok(buffer);
        }
        Ok(TickBuffer::new(
            resample_linear(buffer.samples(), buffer.sample_rate(), self.shared.sample_rate),
            self.shared.sample_rate,
        ))
    }

    fn play_at(&self, buffer: &TickBuffer, when: f64) -> Result<(), Error> {
        if self.state() == BackendState::Closed {
            return Err(Error::BackendClosed);
        }

        let buffer = if buffer.sample_rate() == self.shared.sample_rate {
            buffer.clone()
        } else {
            TickBuffer::new(
                resample_linear(buffer.samples(), buffer.sample_rate(), self.shared.sample_rate),
                self.shared.sample_rate,
            )
        };

        // A start frame in the past begins mid-sample via the offset
        // arithmetic in the callback rather than playing late.
        let start_frame = (when * self.shared.sample_rate as f64).round() as i64;
        let Ok(mut voices) = self.shared.voices.lock() else {
            return Err(Error::Playback("voice queue unavailable".to_string()));
        };
        voices.push(Voice {
            buffer,
            start_frame,
        });
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, Error>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| render::<T>(&shared, data, channels),
            |err| log::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| Error::Output(e.to_string()))
}

/// Mix all due voices into one output buffer, advancing the frame clock.
fn render<T>(shared: &Shared, data: &mut [T], channels: usize)
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let frames = data.len() / channels;
    let base = shared.frame_clock.fetch_add(frames as u64, Ordering::Relaxed) as i64;

    let silence = T::from_sample(0.0f32);
    for sample in data.iter_mut() {
        *sample = silence;
    }

    let Ok(mut voices) = shared.voices.lock() else {
        return;
    };
    if voices.is_empty() {
        return;
    }

    for frame in 0..frames {
        let global = base + frame as i64;
        let mut mixed = 0.0f32;
        for voice in voices.iter() {
            let offset = global - voice.start_frame;
            if offset >= 0 {
                if let Some(&sample) = voice.buffer.samples().get(offset as usize) {
                    mixed += sample;
                }
            }
        }
        if mixed != 0.0 {
            let value = T::from_sample(mixed.clamp(-1.0, 1.0));
            for channel in 0..channels {
                data[frame * channels + channel] = value;
            }
        }
    }

    let horizon = base + frames as i64;
    voices.retain(|voice| horizon - voice.start_frame < voice.buffer.samples().len() as i64);
}

/// Linear resampler for the short click buffer.
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from as f64 / to as f64;
    let out_len = ((samples.len() as f64 / ratio).round() as usize).max(1);
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let index = (pos as usize).min(last);
        let frac = (pos - index as f64) as f32;
        let a = samples[index];
        let b = samples[(index + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Information about an output device.
#[derive(Clone, Debug)]
pub struct OutputDeviceInfo {
    /// Device name as reported by the system.
    pub name: String,
    /// Channel count of the default output configuration.
    pub channels: u16,
    /// Sample rate of the default output configuration.
    pub sample_rate: u32,
    /// Whether this is the system default output.
    pub is_default: bool,
}

/// List the available output devices, default first.
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>, Error> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    let all = host
        .output_devices()
        .map_err(|e| Error::Output(e.to_string()))?;
    for device in all {
        let Ok(name) = device.name() else { continue };
        let Ok(config) = device.default_output_config() else {
            continue;
        };
        let is_default = default_name.as_deref() == Some(name.as_str());
        devices.push(OutputDeviceInfo {
            name,
            channels: config.channels(),
            sample_rate: config.sample_rate(),
            is_default,
        });
    }

    devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(devices)
}
