//! Runtime adapters for spawning background loops.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
