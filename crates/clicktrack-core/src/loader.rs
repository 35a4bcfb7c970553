//! Click sample loading and backend lifecycle.
//!
//! [`TickLoader`] owns the "ensure ready" discipline: it creates the output
//! backend lazily, resumes it when suspended, and fetches + decodes the
//! click sample exactly once per backend. Callers must run
//! [`ensure_ready`](TickLoader::ensure_ready) to completion *before*
//! activating the scheduler; nothing else in the crate creates a backend.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{BackendState, OutputBackend, TickBuffer};
use crate::error::Error;

/// Source of the raw click sample bytes.
pub trait SampleSource {
    /// Read the sample bytes in full.
    fn fetch(&mut self) -> Result<Vec<u8>, Error>;
}

/// Reads the click sample from a fixed file path.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SampleSource for FileSource {
    fn fetch(&mut self) -> Result<Vec<u8>, Error> {
        Ok(std::fs::read(&self.path)?)
    }
}

type BackendFactory<B> = Box<dyn Fn() -> Result<B, Error> + Send>;

/// Loads and memoizes the decoded click sample for one backend session.
///
/// The decoded buffer does not outlive the backend that produced it: when
/// the backend turns up closed, both are discarded and recreated on the
/// next call. Load-once is guarded by a flag rather than in-flight
/// deduplication; repeated *sequential* calls are idempotent, which is the
/// contract callers rely on.
pub struct TickLoader<B: OutputBackend, S: SampleSource> {
    factory: BackendFactory<B>,
    source: S,
    backend: Option<Arc<B>>,
    buffer: Option<TickBuffer>,
    load_started: bool,
}

impl<B: OutputBackend, S: SampleSource> TickLoader<B, S> {
    /// Create a loader. `factory` is invoked lazily, and again whenever the
    /// previous backend has been closed.
    pub fn new(factory: impl Fn() -> Result<B, Error> + Send + 'static, source: S) -> Self {
        Self {
            factory: Box::new(factory),
            source,
            backend: None,
            buffer: None,
            load_started: false,
        }
    }

    /// Ensure a usable backend exists and the click sample is decoded.
    ///
    /// On fetch or decode failure the cache stays empty and the error
    /// propagates; a later call retries. The caller should surface this as
    /// a non-fatal condition and leave the system inactive.
    pub fn ensure_ready(&mut self) -> Result<(), Error> {
        let backend = match &self.backend {
            Some(backend) if backend.state() != BackendState::Closed => Arc::clone(backend),
            _ => {
                let backend = Arc::new((self.factory)()?);
                log::info!("created audio output backend");
                // The old decoded buffer died with its backend.
                self.buffer = None;
                self.load_started = false;
                self.backend = Some(Arc::clone(&backend));
                backend
            }
        };

        if backend.state() == BackendState::Suspended {
            backend.resume()?;
        }

        if self.buffer.is_none() && !self.load_started {
            self.load_started = true;
            match self.source.fetch().and_then(|bytes| backend.decode(&bytes)) {
                Ok(buffer) => {
                    log::info!(
                        "loaded click sample: {:.1} ms at {} Hz",
                        buffer.duration_secs() * 1000.0,
                        buffer.sample_rate()
                    );
                    self.buffer = Some(buffer);
                }
                Err(e) => {
                    // Leave the cache empty so a later call can retry.
                    self.load_started = false;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// The current backend, if one has been created.
    pub fn backend(&self) -> Option<&Arc<B>> {
        self.backend.as_ref()
    }

    /// The decoded click buffer, if loaded.
    pub fn buffer(&self) -> Option<&TickBuffer> {
        self.buffer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts fetches; can be switched to fail.
    struct CountingSource {
        fetches: Arc<AtomicUsize>,
        fail: Arc<Mutex<bool>>,
    }

    impl SampleSource for CountingSource {
        fn fetch(&mut self) -> Result<Vec<u8>, Error> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            if *self.fail.lock().unwrap() {
                return Err(Error::Decode("synthetic fetch failure".to_string()));
            }
            Ok(vec![1, 2, 3, 4])
        }
    }

    fn counting_loader() -> (
        TickLoader<MockBackend, CountingSource>,
        Arc<AtomicUsize>,
        Arc<Mutex<bool>>,
        Arc<AtomicUsize>,
    ) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(Mutex::new(false));
        let backends_created = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            fetches: Arc::clone(&fetches),
            fail: Arc::clone(&fail),
        };
        let factory_count = Arc::clone(&backends_created);
        let loader = TickLoader::new(
            move || {
                factory_count.fetch_add(1, Ordering::Relaxed);
                Ok(MockBackend::bare())
            },
            source,
        );
        (loader, fetches, fail, backends_created)
    }

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            fetches: Arc::clone(&fetches),
            fail: Arc::new(Mutex::new(false)),
        };
        let mut loader = TickLoader::new(|| Ok(MockBackend::bare()), source);

        for _ in 0..5 {
            loader.ensure_ready().unwrap();
        }

        assert_eq!(fetches.load(Ordering::Relaxed), 1);
        let backend = loader.backend().unwrap();
        assert_eq!(backend.decode_count(), 1);
        assert!(loader.buffer().is_some());
    }

    #[test]
    fn test_resumes_suspended_backend() {
        let source = CountingSource {
            fetches: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(Mutex::new(false)),
        };
        let mut loader = TickLoader::new(|| Ok(MockBackend::bare()), source);

        loader.ensure_ready().unwrap();
        loader.backend().unwrap().set_state(BackendState::Suspended);
        loader.ensure_ready().unwrap();

        let backend = loader.backend().unwrap();
        assert_eq!(backend.state(), BackendState::Running);
        assert_eq!(backend.resume_count(), 1);
    }

    #[test]
    fn test_failure_leaves_cache_retryable() {
        let (mut loader, fetches, fail, _) = counting_loader();

        *fail.lock().unwrap() = true;
        assert!(loader.ensure_ready().is_err());
        assert!(loader.buffer().is_none());
        assert_eq!(fetches.load(Ordering::Relaxed), 1);

        *fail.lock().unwrap() = false;
        loader.ensure_ready().unwrap();
        assert!(loader.buffer().is_some());
        assert_eq!(fetches.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_closed_backend_is_recreated_and_buffer_reloaded() {
        let (mut loader, fetches, _, backends_created) = counting_loader();

        loader.ensure_ready().unwrap();
        assert_eq!(backends_created.load(Ordering::Relaxed), 1);
        assert_eq!(fetches.load(Ordering::Relaxed), 1);
        let first_buffer = loader.buffer().unwrap().clone();

        loader.backend().unwrap().set_state(BackendState::Closed);
        loader.ensure_ready().unwrap();

        assert_eq!(backends_created.load(Ordering::Relaxed), 2);
        assert_eq!(fetches.load(Ordering::Relaxed), 2);
        let second_buffer = loader.buffer().unwrap();
        assert!(!first_buffer.same_as(second_buffer));
    }

    #[test]
    fn test_file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/tick.wav");
        assert!(matches!(source.fetch(), Err(Error::Io(_))));
    }
}
