//! Runtime thread driving the scheduler's scan cadence.
//!
//! The scan loop is not a free-running timer: each pass applies all pending
//! parameter changes first and then scans, so cancellation always lands
//! between scans and at most one live scan chain exists per runtime. The
//! thread owns the [`TickScheduler`] outright; everything reaches it
//! through the message channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::backend::{OutputBackend, TickBuffer};
use crate::scheduler::{TickObserver, TickScheduler, SCAN_INTERVAL_MS};
use crate::timing::Tempo;

enum Command {
    SetParameters { tempo: Option<Tempo>, active: bool },
    SetBuffer(Option<TickBuffer>),
}

/// Handle for feeding activation parameters to the runtime thread.
///
/// This is the activation-controller boundary: callers must have run the
/// loader's `ensure_ready` to completion before flipping active to true,
/// and must hand the resulting buffer over via
/// [`set_buffer`](RuntimeHandle::set_buffer).
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: Sender<Command>,
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Apply a new `(tempo, active)` pair. The scheduler diffs internally;
    /// sending unchanged values is harmless.
    pub fn set_parameters(&self, tempo: Option<Tempo>, active: bool) -> Result<()> {
        self.command_tx
            .send(Command::SetParameters { tempo, active })
            .map_err(|e| anyhow::anyhow!("runtime thread is gone: {}", e))
    }

    /// Install or clear the decoded click buffer.
    pub fn set_buffer(&self, buffer: Option<TickBuffer>) -> Result<()> {
        self.command_tx
            .send(Command::SetBuffer(buffer))
            .map_err(|e| anyhow::anyhow!("runtime thread is gone: {}", e))
    }

    /// Signal the runtime thread to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Owns the scan thread for one scheduler.
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn the scan thread over an already-created backend.
    pub fn start<B, O>(backend: Arc<B>, observer: O) -> Runtime
    where
        B: OutputBackend + 'static,
        O: TickObserver + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shutdown = Arc::clone(&shutdown);
        let thread_handle = thread::spawn(move || {
            let scheduler = TickScheduler::new(backend, observer);
            run_loop(scheduler, command_rx, thread_shutdown);
        });

        Runtime {
            handle: RuntimeHandle {
                command_tx,
                shutdown,
            },
            thread_handle: Some(thread_handle),
        }
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop<B: OutputBackend, O: TickObserver>(
    mut scheduler: TickScheduler<B, O>,
    command_rx: Receiver<Command>,
    shutdown: Arc<AtomicBool>,
) {
    let cadence = Duration::from_millis(SCAN_INTERVAL_MS);

    while !shutdown.load(Ordering::Relaxed) {
        // Waiting on the channel doubles as the scan delay; a parameter
        // change wakes the loop early and is applied before the next scan.
        match command_rx.recv_timeout(cadence) {
            Ok(command) => {
                apply(&mut scheduler, command);
                while let Ok(command) = command_rx.try_recv() {
                    apply(&mut scheduler, command);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        scheduler.scan();
    }
    log::debug!("runtime thread exiting");
}

fn apply<B: OutputBackend, O: TickObserver>(
    scheduler: &mut TickScheduler<B, O>,
    command: Command,
) {
    match command {
        Command::SetParameters { tempo, active } => scheduler.set_parameters(tempo, active),
        Command::SetBuffer(buffer) => scheduler.set_buffer(buffer),
    }
}
