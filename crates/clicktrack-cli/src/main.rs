//! `click` - command-line front-end for the clicktrack metronome.
//!
//! Loads the click sample (or synthesizes one), starts the scheduling
//! runtime, renders each tick on the console, and exits when the tick
//! ceiling stops the run or on Ctrl-C.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Sender};

use clicktrack_core::{
    click, list_output_devices, CpalBackend, FileSource, Runtime, Tempo, TickLoader, TickObserver,
    MAX_BPM, MIN_BPM, TICK_CEILING,
};

#[derive(Parser, Debug)]
#[command(
    name = "click",
    about = "Play a bounded metronome click at the given tempo",
    version
)]
struct Args {
    /// Tempo in beats per minute
    #[arg(short, long, default_value_t = 120, value_parser = clap::value_parser!(u32).range(MIN_BPM as i64..=MAX_BPM as i64))]
    bpm: u32,

    /// Path to the click sample (WAV); a synthesized click is used when
    /// the file does not exist
    #[arg(short, long, default_value = "tick.wav")]
    sample: PathBuf,

    /// List available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

/// Renders ticks as console flashes and signals the ceiling stop.
struct ConsoleObserver {
    beat: u32,
    stopped_tx: Sender<()>,
}

impl TickObserver for ConsoleObserver {
    fn on_tick(&mut self) {
        self.beat += 1;
        println!("  * tick {:>2}/{}", self.beat, TICK_CEILING);
    }

    fn on_stop(&mut self) {
        let _ = self.stopped_tx.send(());
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_devices {
        return print_devices();
    }

    let tempo = Tempo::new(args.bpm)?;

    // The backend and buffer must be fully resolved before activation;
    // the runtime never creates them on its own.
    let (backend, buffer) = if args.sample.exists() {
        let mut loader = TickLoader::new(CpalBackend::open, FileSource::new(&args.sample));
        loader
            .ensure_ready()
            .context("audio backend not ready; metronome stays inactive")?;
        let backend = loader
            .backend()
            .cloned()
            .context("no backend after ensure_ready")?;
        let buffer = loader
            .buffer()
            .cloned()
            .context("no click buffer after ensure_ready")?;
        (backend, buffer)
    } else {
        log::warn!(
            "{}: no such sample, using synthesized click",
            args.sample.display()
        );
        let backend = Arc::new(CpalBackend::open()?);
        let buffer = click::noise_burst(backend.sample_rate());
        (backend, buffer)
    };

    let (stopped_tx, stopped_rx) = bounded(1);
    let runtime = Runtime::start(
        backend,
        ConsoleObserver {
            beat: 0,
            stopped_tx,
        },
    );
    runtime.handle().set_buffer(Some(buffer))?;
    runtime.handle().set_parameters(Some(tempo), true)?;
    println!("{tempo} - {TICK_CEILING} ticks");

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;

    loop {
        if stopped_rx.recv_timeout(Duration::from_millis(50)).is_ok() {
            break;
        }
        if interrupted.load(Ordering::Relaxed) {
            println!("interrupted");
            runtime.handle().set_parameters(None, false)?;
            break;
        }
    }

    // Let the last scheduled click ring out before tearing the stream down.
    std::thread::sleep(Duration::from_millis(200));
    runtime.shutdown();
    Ok(())
}

fn print_devices() -> Result<()> {
    let devices = list_output_devices()?;
    if devices.is_empty() {
        println!("No output devices found.");
        return Ok(());
    }
    for device in devices {
        let marker = if device.is_default { " [default]" } else { "" };
        println!(
            "{}{} ({} ch, {} Hz)",
            device.name, marker, device.channels, device.sample_rate
        );
    }
    Ok(())
}
