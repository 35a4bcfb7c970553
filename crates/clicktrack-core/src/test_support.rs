//! Shared test doubles: a deterministic mock backend and a counting
//! observer. Compiled for tests only.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::backend::{BackendState, OutputBackend, TickBuffer};
use crate::error::Error;
use crate::scheduler::TickObserver;

enum Clock {
    /// Advanced explicitly by the test.
    Manual(Mutex<f64>),
    /// Follows wall-clock time; for runtime-thread tests.
    Wall(Instant),
}

/// An [`OutputBackend`] with a test-controlled clock that records every
/// scheduled playback time.
pub(crate) struct MockBackend {
    clock: Clock,
    state: Mutex<BackendState>,
    plays: Mutex<Vec<f64>>,
    decodes: AtomicUsize,
    resumes: AtomicUsize,
    /// Zero-based playback call indices that should fail.
    failing_plays: Mutex<Vec<usize>>,
    play_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::bare())
    }

    /// Unwrapped variant for factory closures that hand ownership over.
    pub fn bare() -> Self {
        Self::with_clock(Clock::Manual(Mutex::new(0.0)))
    }

    pub fn wall_clock() -> Arc<Self> {
        Arc::new(Self::with_clock(Clock::Wall(Instant::now())))
    }

    fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            state: Mutex::new(BackendState::Running),
            plays: Mutex::new(Vec::new()),
            decodes: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            failing_plays: Mutex::new(Vec::new()),
            play_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_time(&self, t: f64) {
        match &self.clock {
            Clock::Manual(clock) => *clock.lock().unwrap() = t,
            Clock::Wall(_) => panic!("wall-clock mock cannot be set"),
        }
    }

    pub fn advance(&self, dt: f64) {
        match &self.clock {
            Clock::Manual(clock) => *clock.lock().unwrap() += dt,
            Clock::Wall(_) => panic!("wall-clock mock cannot be advanced"),
        }
    }

    pub fn set_state(&self, state: BackendState) {
        *self.state.lock().unwrap() = state;
    }

    /// Scheduled playback times, in call order.
    pub fn plays(&self) -> Vec<f64> {
        self.plays.lock().unwrap().clone()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }

    /// Make the `index`-th playback call (zero-based) return an error.
    pub fn fail_play_at(&self, index: usize) {
        self.failing_plays.lock().unwrap().push(index);
    }
}

impl OutputBackend for MockBackend {
    fn state(&self) -> BackendState {
        *self.state.lock().unwrap()
    }

    fn resume(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if *state == BackendState::Closed {
            return Err(Error::BackendClosed);
        }
        *state = BackendState::Running;
        self.resumes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        match &self.clock {
            Clock::Manual(clock) => *clock.lock().unwrap(),
            Clock::Wall(start) => start.elapsed().as_secs_f64(),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<TickBuffer, Error> {
        if bytes.is_empty() {
            return Err(Error::Decode("empty sample".to_string()));
        }
        self.decodes.fetch_add(1, Ordering::Relaxed);
        Ok(TickBuffer::new(vec![0.25; 64], 48_000))
    }

    fn play_at(&self, _buffer: &TickBuffer, when: f64) -> Result<(), Error> {
        let call = self.play_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_plays.lock().unwrap().contains(&call) {
            return Err(Error::Playback("backend closed concurrently".to_string()));
        }
        self.plays.lock().unwrap().push(when);
        Ok(())
    }
}

/// A [`TickObserver`] counting tick and stop callbacks behind shared
/// atomics, so tests can keep a clone and inspect it after handing the
/// observer to a scheduler or runtime.
#[derive(Clone, Default)]
pub(crate) struct CountingObserver {
    ticks: Arc<AtomicU32>,
    stops: Arc<AtomicU32>,
}

impl CountingObserver {
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::Relaxed)
    }
}

impl TickObserver for CountingObserver {
    fn on_tick(&mut self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn on_stop(&mut self) {
        self.stops.fetch_add(1, Ordering::Relaxed);
    }
}
