//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::Spawn;

/// Tokio-based spawner that executes background loops on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
    // Keeps an owned runtime alive when the spawner built it.
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioSpawner {
    /// Create a `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
            _runtime: None,
        }
    }

    /// Create a `TokioSpawner` bound to the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Create a `TokioSpawner` that owns a new multi-threaded runtime with the
    /// specified number of worker threads.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while building the runtime.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()?;
        Ok(Self {
            handle: Arc::new(runtime.handle().clone()),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Create a `TokioSpawner` owning a runtime sized to the number of CPUs.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while building the runtime.
    pub fn with_default_threads() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }

    /// The runtime handle this spawner submits work to.
    #[must_use]
    pub fn handle(&self) -> &tokio::runtime::Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
