//! Topic-keyed event bus with lazily created per-topic dispatch loops.
//!
//! # Lifecycle
//!
//! - The first [`EventBus::subscribe`] on a topic creates a bounded queue for
//!   it and starts exactly one dispatch loop bound to that queue.
//! - [`EventBus::publish`] enqueues onto the topic queue. A full queue makes
//!   the publisher wait (backpressure); a topic with no queue drops the event.
//! - [`EventBus::unsubscribe`] closes the subscriber's channel; removing the
//!   last subscriber discards the queue and stops its dispatch loop. Events
//!   still buffered in a discarded queue are dropped, so a later subscriber
//!   on the same topic only sees events published after it joined.
//! - Dropping the last bus handle behaves like [`EventBus::shutdown`].
//!
//! ```text
//!   publish(topic) ──► [topic queue] ──► dispatch loop ──┬──► subscriber 1
//!                                        (one per topic) ├──► subscriber 2
//!                                                        └──► subscriber N
//! ```
//!
//! # Delivery timeout halts the topic
//!
//! Each send to a subscriber is bounded by the topic's timeout (none means
//! wait forever). When a send times out, the **whole dispatch loop stops**:
//! every subscriber on that topic, including fast ones, stops receiving
//! events, and later publishes on the topic are dropped until all of its
//! subscribers leave and the topic is recreated. Subscribers get no signal
//! other than the silence. Callers that cannot accept this should leave the
//! timeout unset or use [`SubscriptionManager`](crate::core::SubscriptionManager),
//! which only skips the slow send.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_pubsub::core::EventBus;
//! use prometheus_pubsub::runtime::TokioSpawner;
//!
//! let bus = EventBus::<String>::new(TokioSpawner::current());
//! let (tx, mut rx) = tokio::sync::mpsc::channel(8);
//! let id = bus.subscribe("orders", tx);
//!
//! bus.publish("orders", "created".to_string()).await;
//! assert_eq!(rx.recv().await.unwrap().payload, "created");
//!
//! bus.unsubscribe("orders", id);
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::core::stats::{DeliveryCounters, DeliveryStats};
use crate::core::{ConcurrentRegistry, Spawn};
use crate::runtime::TokioSpawner;
use crate::util::panic_message;

/// Default capacity of a topic queue.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Identifier handed out by [`EventBus::subscribe`]. Unique for the process.
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Event flowing through a topic queue to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEvent<T> {
    /// Topic the event was published on.
    pub topic: String,
    /// Optional channel qualifier narrowing the topic.
    pub channel: Option<String>,
    /// Opaque payload.
    pub payload: T,
}

impl<T> DataEvent<T> {
    /// Create an event without a channel qualifier.
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            channel: None,
            payload,
        }
    }

    /// Attach a channel qualifier.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Per-subscription options. Only the options of a topic's first subscriber
/// shape its queue and dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    buffer_size: usize,
    timeout: Option<Duration>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout: None,
        }
    }
}

impl SubscribeOptions {
    /// Options with the default buffer size and no delivery timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the topic queue capacity. Zero is raised to one.
    #[must_use]
    pub const fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = if size == 0 { 1 } else { size };
        self
    }

    /// Bound each send to a subscriber by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Topic queue capacity.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Per-send delivery timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

type Members<T> = HashMap<SubscriberId, mpsc::Sender<DataEvent<T>>>;

/// Outcome of fanning one event out to a topic snapshot.
enum Fanout {
    Completed,
    TimedOut,
}

/// One generation of a live topic: its queue and the signal that stops the
/// dispatch loop draining it.
struct TopicQueue<T> {
    sender: mpsc::Sender<DataEvent<T>>,
    stop: CancellationToken,
}

impl<T> Clone for TopicQueue<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stop: self.stop.clone(),
        }
    }
}

/// State shared between the bus handle and its dispatch loops.
struct BusShared<T> {
    subscribers: ConcurrentRegistry<String, Members<T>>,
    queues: ConcurrentRegistry<String, TopicQueue<T>>,
    /// Makes subscribe/unsubscribe atomic across both registries.
    gate: RwLock<()>,
    /// Parent of every topic stop signal; fired when the last handle drops.
    closed: CancellationToken,
    dispatchers: AtomicUsize,
    counters: DeliveryCounters,
}

/// Topic-addressed publish/subscribe bus.
///
/// Cloning the bus yields another handle onto the same topics. Dropping the
/// last handle stops every dispatch loop and closes all subscriber channels.
pub struct EventBus<T, S = TokioSpawner> {
    shared: Arc<BusShared<T>>,
    defaults: SubscribeOptions,
    spawner: S,
    lifetime: Arc<DropGuard>,
}

impl<T, S: Clone> Clone for EventBus<T, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            defaults: self.defaults.clone(),
            spawner: self.spawner.clone(),
            lifetime: Arc::clone(&self.lifetime),
        }
    }
}

impl<T, S> EventBus<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Spawn,
{
    /// Create a bus using default subscribe options.
    pub fn new(spawner: S) -> Self {
        Self::with_defaults(spawner, SubscribeOptions::default())
    }

    /// Create a bus whose [`subscribe`](Self::subscribe) uses `defaults`.
    pub fn with_defaults(spawner: S, defaults: SubscribeOptions) -> Self {
        let closed = CancellationToken::new();
        Self {
            shared: Arc::new(BusShared {
                subscribers: ConcurrentRegistry::new(),
                queues: ConcurrentRegistry::new(),
                gate: RwLock::new(()),
                closed: closed.clone(),
                dispatchers: AtomicUsize::new(0),
                counters: DeliveryCounters::default(),
            }),
            defaults,
            spawner,
            lifetime: Arc::new(closed.drop_guard()),
        }
    }

    /// Subscribe `output` to `topic` with the bus default options.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        output: mpsc::Sender<DataEvent<T>>,
    ) -> SubscriberId {
        self.subscribe_with(topic, output, &self.defaults)
    }

    /// Subscribe `output` to `topic`.
    ///
    /// The bus takes ownership of `output` and drops it on
    /// [`unsubscribe`](Self::unsubscribe), which closes the receiving end.
    pub fn subscribe_with(
        &self,
        topic: impl Into<String>,
        output: mpsc::Sender<DataEvent<T>>,
        options: &SubscribeOptions,
    ) -> SubscriberId {
        let topic = topic.into();
        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);

        let created = {
            let _gate = self.shared.gate.write();
            let mut created = None;
            self.shared
                .subscribers
                .update(topic.clone(), |members| -> Result<(), Infallible> {
                    if members.is_empty() {
                        let (sender, rx) = mpsc::channel(options.buffer_size.max(1));
                        let stop = self.shared.closed.child_token();
                        self.shared.queues.set(
                            topic.clone(),
                            TopicQueue {
                                sender,
                                stop: stop.clone(),
                            },
                        );
                        created = Some((rx, stop));
                    }
                    members.insert(id, output);
                    Ok(())
                });
            created
        };

        if let Some((queue, stop)) = created {
            self.shared.dispatchers.fetch_add(1, Ordering::AcqRel);
            debug!(
                topic = %topic,
                buffer_size = options.buffer_size,
                timeout = ?options.timeout,
                "topic created; starting dispatch loop"
            );
            self.spawner.spawn(dispatch_loop(
                Arc::clone(&self.shared),
                topic.clone(),
                queue,
                stop,
                options.timeout,
            ));
        }

        debug!(topic = %topic, subscriber = id, "subscriber added");
        id
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns immediately if the topic has no subscribers. Otherwise waits
    /// while the topic queue is full.
    pub async fn publish(&self, topic: &str, payload: T) {
        self.publish_event(DataEvent::new(topic, payload)).await;
    }

    /// Publish a fully formed event on its topic.
    pub async fn publish_event(&self, event: DataEvent<T>) {
        let queue = {
            let _gate = self.shared.gate.read();
            self.shared.queues.get(&event.topic)
        };

        let Some(queue) = queue else {
            DeliveryCounters::bump(&self.shared.counters.dropped);
            warn!(topic = %event.topic, "no subscribers; dropping event");
            return;
        };

        let topic = event.topic.clone();
        if queue.sender.send(event).await.is_err() {
            DeliveryCounters::bump(&self.shared.counters.dropped);
            warn!(topic = %topic, "topic dispatch stopped; dropping event");
        } else {
            DeliveryCounters::bump(&self.shared.counters.published);
        }
    }
}

impl<T, S> EventBus<T, S> {
    /// Remove subscriber `id` from `topic` and close its channel.
    ///
    /// Removing the last subscriber tears the topic down; subsequent
    /// publishes on it are dropped until someone subscribes again. Returns
    /// `false` (and does nothing) if the subscriber is unknown.
    pub fn unsubscribe(&self, topic: &str, id: SubscriberId) -> bool {
        let _gate = self.shared.gate.write();

        let Some(mut members) = self.shared.subscribers.get(topic) else {
            return false;
        };
        if members.remove(&id).is_none() {
            return false;
        }

        if members.is_empty() {
            self.shared.subscribers.delete(topic);
            if let Some(queue) = self.shared.queues.delete(topic) {
                queue.stop.cancel();
            }
            debug!(topic = %topic, "last subscriber left; topic torn down");
        } else {
            self.shared.subscribers.set(topic.to_string(), members);
        }
        debug!(topic = %topic, subscriber = id, "subscriber removed");
        true
    }

    /// Tear down every topic, closing all subscriber channels and stopping
    /// all dispatch loops.
    pub fn shutdown(&self) {
        let _gate = self.shared.gate.write();
        let topics = self.shared.subscribers.drain();
        for (_, queue) in self.shared.queues.drain() {
            queue.stop.cancel();
        }
        debug!(topics = topics.len(), "event bus shut down");
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// True if `topic` currently has a queue.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.shared.queues.contains_key(topic)
    }

    /// Number of subscribers registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared
            .subscribers
            .get(topic)
            .map_or(0, |members| members.len())
    }

    /// Number of dispatch loops still running. A loop told to stop by
    /// teardown is counted until it has observed the signal and exited.
    pub fn dispatcher_count(&self) -> usize {
        self.shared.dispatchers.load(Ordering::Acquire)
    }

    /// Snapshot of delivery statistics.
    pub fn stats(&self) -> DeliveryStats {
        self.shared.counters.snapshot()
    }
}

/// Drain one topic queue until it is stopped, closes or a delivery times
/// out. Anything still buffered when `stop` fires is discarded.
async fn dispatch_loop<T>(
    shared: Arc<BusShared<T>>,
    topic: String,
    mut queue: mpsc::Receiver<DataEvent<T>>,
    stop: CancellationToken,
    timeout: Option<Duration>,
) where
    T: Clone + Send + Sync + 'static,
{
    loop {
        let event = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        // Copy the subscriber map so writers are never blocked during delivery.
        // The stop check shares the gate with teardown, so a stopped loop never
        // sees members of a later generation of this topic.
        let members = {
            let _gate = shared.gate.read();
            if stop.is_cancelled() {
                break;
            }
            shared.subscribers.get(&topic).unwrap_or_default()
        };

        let delivery = AssertUnwindSafe(fan_out(&shared, &topic, &members, event, timeout))
            .catch_unwind();
        let outcome = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            outcome = delivery => outcome,
        };

        match outcome {
            Ok(Fanout::Completed) => {}
            Ok(Fanout::TimedOut) => break,
            Err(panic) => {
                DeliveryCounters::bump(&shared.counters.panicked);
                warn!(
                    topic = %topic,
                    panic = %panic_message(panic.as_ref()),
                    "panic during event delivery; continuing"
                );
            }
        }
    }

    shared.dispatchers.fetch_sub(1, Ordering::AcqRel);
    debug!(topic = %topic, "dispatch loop exited");
}

async fn fan_out<T>(
    shared: &BusShared<T>,
    topic: &str,
    members: &Members<T>,
    event: DataEvent<T>,
    timeout: Option<Duration>,
) -> Fanout
where
    T: Clone + Send + Sync + 'static,
{
    for (id, output) in members {
        let send = output.send(event.clone());
        let sent = match timeout {
            Some(limit) => {
                if let Ok(sent) = tokio::time::timeout(limit, send).await {
                    sent
                } else {
                    DeliveryCounters::bump(&shared.counters.timed_out);
                    warn!(
                        topic = %topic,
                        subscriber = id,
                        timeout = ?limit,
                        "delivery timed out; halting topic dispatch"
                    );
                    return Fanout::TimedOut;
                }
            }
            None => send.await,
        };

        if sent.is_ok() {
            DeliveryCounters::bump(&shared.counters.delivered);
        } else {
            debug!(topic = %topic, subscriber = id, "subscriber channel closed; skipping");
        }
    }
    Fanout::Completed
}
