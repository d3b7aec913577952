//! Configuration models for the event bus and subscription manager.

pub mod pubsub;

pub use pubsub::{BusConfig, ManagerConfig, PubSubConfig};
