//! # Prometheus Pub/Sub
//!
//! An in-process publish/subscribe substrate for async services.
//!
//! Components talk to each other through topics without knowing who is on
//! the other end. The crate provides the concurrency plumbing that makes this
//! safe under many concurrent publishers and subscribers:
//!
//! - **`ConcurrentRegistry`**: a read/write-locked map with atomic
//!   read-modify-write updates and snapshot iteration
//! - **`EventBus`**: one bounded queue and one dispatch loop per topic,
//!   created on first subscribe and torn down on last unsubscribe
//! - **`SubscriptionManager`**: `(topic, channel)` subscriptions with
//!   middleware vetoes and lifetimes bound to a `CancellationToken`
//! - **`DelayedTask` / `TaskManager`**: cancellable one-shot timers with
//!   exactly-once outcome
//!
//! Delivery is best effort. Full queues, slow subscribers and closed outputs
//! never fail a publish; they are logged through `tracing` and counted in
//! [`core::DeliveryStats`].
//!
//! ## Event bus
//!
//! ```rust,ignore
//! use prometheus_pubsub::core::EventBus;
//! use prometheus_pubsub::runtime::TokioSpawner;
//! use tokio::sync::mpsc;
//!
//! let bus = EventBus::<String>::new(TokioSpawner::current());
//! let (tx, mut rx) = mpsc::channel(16);
//! let id = bus.subscribe("orders", tx);
//!
//! bus.publish("orders", "created".to_string()).await;
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.payload, "created");
//!
//! bus.unsubscribe("orders", id);
//! ```
//!
//! ## Subscription manager
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_pubsub::core::{AuthMiddleware, Event, SubscriptionManager};
//! use prometheus_pubsub::runtime::TokioSpawner;
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = SubscriptionManager::<u64>::new(TokioSpawner::current(), Duration::from_secs(1));
//! manager.add_middleware(AuthMiddleware::allow_topics(["orders"]));
//!
//! let cancel = CancellationToken::new();
//! let mut sub = manager.subscribe(cancel.clone(), "orders", "42").await?;
//! manager.publish(Event::new("orders", "42", 7));
//! assert_eq!(sub.recv().await, Some(7));
//!
//! cancel.cancel(); // removes the subscription and closes `sub`
//! ```
//!
//! ## Wiring from configuration
//!
//! ```rust,ignore
//! use prometheus_pubsub::builders::build_hub;
//! use prometheus_pubsub::config::PubSubConfig;
//! use prometheus_pubsub::runtime::TokioSpawner;
//!
//! let cfg = PubSubConfig::from_env()?;
//! let hub = build_hub::<String, _>(&cfg, TokioSpawner::current())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core messaging abstractions: registry, event bus, subscriptions, tasks.
pub mod core;
/// Configuration models for the bus and subscription manager.
pub mod config;
/// Builders to construct pub/sub components from configuration.
pub mod builders;
/// Runtime adapters for spawning background loops.
pub mod runtime;
/// Shared utilities.
pub mod util;
