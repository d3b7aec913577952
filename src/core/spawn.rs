//! Runtime-agnostic spawning abstraction for background loops.

use std::future::Future;

/// Abstraction for spawning background work on a runtime.
///
/// Dispatch loops, subscription monitors and delayed-task timers are all
/// started through this trait, so the components never reach for an implicit
/// global runtime.
pub trait Spawn {
    /// Spawn an async task that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
