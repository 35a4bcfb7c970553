//! Look-ahead tick scheduler.
//!
//! The scheduler turns `(tempo, active)` parameters into a bounded sequence
//! of evenly spaced ticks on the backend clock. Each scan pass drains every
//! tick due within a fixed look-ahead window and hands it to the backend at
//! its precise clock time, so audible spacing does not inherit the scan
//! cadence's jitter.
//!
//! Tick times are produced by repeated addition of the interval to the
//! anchor set when the run was armed; the anchor is never resynchronized to
//! "now" during a run. That is the drift-correction property: scan-loop
//! jitter moves *when* a tick gets scheduled, never *for when*.

use std::sync::Arc;

use crate::backend::{OutputBackend, TickBuffer};
use crate::timing::Tempo;

/// Seconds between arming a run and its first tick.
pub const START_OFFSET_SECS: f64 = 0.05;
/// Horizon within which a scan pass schedules ticks.
pub const LOOKAHEAD_SECS: f64 = 0.1;
/// Wall-clock cadence of the scan loop in milliseconds.
pub const SCAN_INTERVAL_MS: u64 = 25;
/// Maximum ticks emitted per activation before auto-stop.
pub const TICK_CEILING: u32 = 16;

/// Observer notified of tick and auto-stop events.
///
/// `on_tick` fires at scan time, up to [`LOOKAHEAD_SECS`] before the
/// corresponding audio is audible (back-to-back on the first tick of a
/// run). Callers needing frame-accurate visual sync must delay their own
/// effect by `when - current_time` themselves.
pub trait TickObserver: Send {
    /// Called once per emitted tick. Must be cheap and non-blocking.
    fn on_tick(&mut self);

    /// Called exactly once per activation when the tick ceiling is reached.
    fn on_stop(&mut self);
}

/// State of one activation. Created on arming, dropped on teardown.
struct RunState {
    /// Backend-clock seconds at which the next tick is due.
    next_tick_time: f64,
    /// Ticks emitted since this run was armed.
    tick_count: u32,
    /// Set once when the ceiling is reached; never cleared for this run.
    stopped: bool,
    /// Inter-tick interval frozen at arming time.
    interval: f64,
}

/// Self-correcting look-ahead tick scheduler.
///
/// Driven externally: [`set_parameters`](TickScheduler::set_parameters) and
/// [`set_buffer`](TickScheduler::set_buffer) feed it state changes, and
/// [`scan`](TickScheduler::scan) must be called on a fixed cadence (the
/// runtime thread does both, see [`crate::runtime`]). The scheduler does no
/// work at all unless it is active, has a tempo and has a decoded buffer.
pub struct TickScheduler<B: OutputBackend, O: TickObserver> {
    backend: Arc<B>,
    observer: O,
    tempo: Option<Tempo>,
    active: bool,
    buffer: Option<TickBuffer>,
    run: Option<RunState>,
}

impl<B: OutputBackend, O: TickObserver> TickScheduler<B, O> {
    /// Create an idle scheduler over the given backend.
    ///
    /// The backend must already exist; the scheduler never creates one.
    /// Only the loader may do that, before activation.
    pub fn new(backend: Arc<B>, observer: O) -> Self {
        Self {
            backend,
            observer,
            tempo: None,
            active: false,
            buffer: None,
            run: None,
        }
    }

    /// Apply externally synchronized activation parameters.
    ///
    /// Diffs against the previous pair: an unchanged call is a no-op, any
    /// effective change tears the current run down before a new one may be
    /// armed, so ticks from the old run can never outlive the change.
    pub fn set_parameters(&mut self, tempo: Option<Tempo>, active: bool) {
        if self.tempo == tempo && self.active == active {
            return;
        }
        self.tempo = tempo;
        self.active = active;
        self.rearm();
    }

    /// Install (or clear) the decoded click buffer.
    ///
    /// Compared by identity, not content: a reloaded buffer ends the
    /// current run even if its samples are equal.
    pub fn set_buffer(&mut self, buffer: Option<TickBuffer>) {
        let unchanged = match (&self.buffer, &buffer) {
            (Some(current), Some(next)) => current.same_as(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.buffer = buffer;
        self.rearm();
    }

    /// True while a run is armed and below the ceiling.
    pub fn is_armed(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.stopped)
    }

    /// Ticks emitted by the current run, if any.
    pub fn tick_count(&self) -> u32 {
        self.run.as_ref().map_or(0, |run| run.tick_count.min(TICK_CEILING))
    }

    /// Emit every tick due within the look-ahead window.
    ///
    /// A single pass can emit more than one tick if the backend clock has
    /// advanced past several due times, e.g. under CPU starvation. Runs
    /// synchronously to completion; never suspends mid-drain.
    pub fn scan(&mut self) {
        let horizon = self.backend.current_time() + LOOKAHEAD_SECS;
        loop {
            let due = match self.run.as_ref() {
                Some(run) if !run.stopped && run.next_tick_time < horizon => run.next_tick_time,
                _ => return,
            };
            self.emit_tick(due);
            if let Some(run) = self.run.as_mut() {
                run.next_tick_time = due + run.interval;
            }
        }
    }

    /// Tear down the current run, dropping its state.
    fn cancel(&mut self) {
        self.run = None;
    }

    /// Cancel and, if the entry condition holds, arm a fresh run.
    ///
    /// Arming emits the first tick immediately so the opening beat is not
    /// delayed by up to a scan period.
    fn rearm(&mut self) {
        self.cancel();

        let Some(tempo) = self.tempo else { return };
        if !self.active || self.buffer.is_none() {
            return;
        }

        let interval = tempo.interval();
        let start = self.backend.current_time() + START_OFFSET_SECS;
        self.run = Some(RunState {
            next_tick_time: start,
            tick_count: 0,
            stopped: false,
            interval,
        });
        log::debug!("armed run: {tempo}, first tick at {start:.3}s");

        self.emit_tick(start);
        if let Some(run) = self.run.as_mut() {
            run.next_tick_time = start + interval;
        }
    }

    /// Emit one tick due at clock time `when`.
    ///
    /// Past the ceiling this fires the stop observer instead, with neither
    /// a tick notification nor audio for the would-be tick: exactly
    /// [`TICK_CEILING`] ticks are audible and visible per activation.
    fn emit_tick(&mut self, when: f64) {
        let Some(run) = self.run.as_mut() else { return };

        run.tick_count += 1;
        if run.tick_count > TICK_CEILING {
            run.stopped = true;
            log::debug!("tick ceiling reached, stopping run");
            self.observer.on_stop();
            return;
        }

        // Observer first, then audio; perceived as simultaneous because the
        // audio start time is scheduled precisely.
        self.observer.on_tick();

        let Some(buffer) = self.buffer.as_ref() else { return };
        if let Err(e) = self.backend.play_at(buffer, when) {
            // A lost click must not kill the scan loop.
            log::warn!("tick playback at {when:.3}s failed: {e}");
        }
    }
}

impl<B: OutputBackend, O: TickObserver> Drop for TickScheduler<B, O> {
    fn drop(&mut self) {
        self.cancel();
    }
}
