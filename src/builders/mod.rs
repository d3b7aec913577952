//! Builders wiring pub/sub components from configuration.

pub mod hub_builder;

pub use hub_builder::{build_hub, PubSubHub};
