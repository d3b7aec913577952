//! Subscription manager: context-scoped subscriptions fed by one shared
//! dispatcher.
//!
//! Unlike [`EventBus`](crate::core::EventBus), the manager:
//!
//! - never blocks publishers: [`SubscriptionManager::publish`] drops the event
//!   when the shared queue is full
//! - matches events on `(topic, channel)` rather than topic alone
//! - bounds every send by the manager timeout and only skips the slow
//!   subscriber, so one stalled consumer never silences the others
//! - holds the registry read lock for a whole fan-out, so registrations and
//!   removals wait until the current event has been handed out
//! - ties each subscription's lifetime to a caller-owned
//!   [`CancellationToken`]: once it fires, a monitor task unsubscribes
//!
//! ```text
//!   publish(event) ──try_send──► [shared queue] ──► dispatcher ──► match (topic, channel)
//!                                                                    ├──► subscription A
//!                                                                    └──► subscription B
//!   cancel token fired ──► monitor ──► unsubscribe ──► output closed
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::middleware::{Middleware, SubscriptionId, SubscriptionInfo};
use crate::core::stats::{DeliveryCounters, DeliveryStats};
use crate::core::{ConcurrentRegistry, PubSubError, Spawn};
use crate::runtime::TokioSpawner;
use crate::util::{now_ms, panic_message};

/// Default capacity of the shared event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default bound on a single send to a subscription.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Topic carrying chat-style message events.
pub const TOPIC_MESSAGES: &str = "messages";
/// Topic carrying user events.
pub const TOPIC_USERS: &str = "users";

/// Event published through the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<T> {
    /// Target topic.
    pub topic: String,
    /// Target channel within the topic.
    pub channel: String,
    /// Opaque payload delivered to matching subscriptions.
    pub payload: T,
}

impl<T> Event<T> {
    /// Build an event for `(topic, channel)`.
    pub fn new(topic: impl Into<String>, channel: impl Into<String>, payload: T) -> Self {
        Self {
            topic: topic.into(),
            channel: channel.into(),
            payload,
        }
    }
}

/// Live subscription returned to the caller.
///
/// Payloads arrive on the output stream until the subscription is removed,
/// at which point [`recv`](Self::recv) returns `None`. Dropping this value
/// does not unsubscribe; cancel the token or call
/// [`SubscriptionManager::unsubscribe`].
#[derive(Debug)]
pub struct Subscription<T> {
    info: SubscriptionInfo,
    output: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.info.topic
    }

    /// Subscribed channel qualifier.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.info.channel
    }

    /// Cancellation signal bounding this subscription.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.info.cancel
    }

    /// Receive the next payload, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.output.recv().await
    }

    /// Receive a payload if one is ready.
    ///
    /// # Errors
    ///
    /// Returns [`TryRecvError::Empty`] when nothing is buffered and
    /// [`TryRecvError::Disconnected`] once the subscription is closed.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.output.try_recv()
    }

    /// Hand the raw output stream to another consumer (e.g. a GraphQL engine).
    #[must_use]
    pub fn into_receiver(self) -> mpsc::Receiver<T> {
        self.output
    }
}

/// Registry entry for a live subscription.
#[derive(Clone)]
struct Slot<T> {
    topic: String,
    channel: String,
    output: mpsc::Sender<T>,
    /// Child of the caller's token; fired on removal to release the monitor.
    stop: CancellationToken,
}

/// State shared between manager handles, the dispatcher and monitors.
struct ManagerShared<T> {
    subscriptions: ConcurrentRegistry<SubscriptionId, Slot<T>>,
    /// Held shared for a whole fan-out, exclusively to register or remove.
    gate: tokio::sync::RwLock<()>,
    middlewares: parking_lot::RwLock<Vec<Arc<dyn Middleware>>>,
    events: mpsc::Sender<Event<T>>,
    delivery_timeout: Duration,
    closed: CancellationToken,
    counters: DeliveryCounters,
}

/// Subscription facade with middleware, context-scoped lifetimes and a
/// single shared dispatcher.
///
/// Cloning yields another handle onto the same manager. The dispatcher stops
/// when [`shutdown`](Self::shutdown) is called or the last handle is dropped.
pub struct SubscriptionManager<T, S = TokioSpawner> {
    shared: Arc<ManagerShared<T>>,
    spawner: S,
    lifetime: Arc<DropGuard>,
}

impl<T, S: Clone> Clone for SubscriptionManager<T, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            spawner: self.spawner.clone(),
            lifetime: Arc::clone(&self.lifetime),
        }
    }
}

impl<T, S> SubscriptionManager<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Spawn,
{
    /// Create a manager with the default queue capacity and start its
    /// dispatcher.
    pub fn new(spawner: S, delivery_timeout: Duration) -> Self {
        Self::with_capacity(spawner, delivery_timeout, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a manager whose shared queue holds `queue_capacity` events.
    pub fn with_capacity(spawner: S, delivery_timeout: Duration, queue_capacity: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(queue_capacity.max(1));
        let closed = CancellationToken::new();
        let shared = Arc::new(ManagerShared {
            subscriptions: ConcurrentRegistry::new(),
            gate: tokio::sync::RwLock::new(()),
            middlewares: parking_lot::RwLock::new(Vec::new()),
            events: events_tx,
            delivery_timeout,
            closed: closed.clone(),
            counters: DeliveryCounters::default(),
        });

        spawner.spawn(dispatcher(Arc::clone(&shared), events_rx));

        Self {
            shared,
            spawner,
            lifetime: Arc::new(closed.drop_guard()),
        }
    }

    /// Append a middleware to the chain.
    pub fn add_middleware<M: Middleware>(&self, middleware: M) {
        self.shared.middlewares.write().push(Arc::new(middleware));
    }

    /// Subscribe to `(topic, channel)` for as long as `cancel` is not fired.
    ///
    /// # Errors
    ///
    /// Returns the first middleware veto, or [`PubSubError::ManagerClosed`]
    /// after [`shutdown`](Self::shutdown). Nothing is registered on error.
    pub async fn subscribe(
        &self,
        cancel: CancellationToken,
        topic: impl Into<String>,
        channel: impl Into<String>,
    ) -> Result<Subscription<T>, PubSubError> {
        if self.shared.closed.is_cancelled() {
            return Err(PubSubError::ManagerClosed);
        }

        let info = SubscriptionInfo {
            id: generate_id(),
            topic: topic.into(),
            channel: channel.into(),
            cancel,
        };

        let chain = self.shared.middlewares.read().clone();
        for middleware in &chain {
            if let Err(e) = middleware.before_subscribe(&info).await {
                debug!(
                    subscription = %info.id,
                    middleware = middleware.name(),
                    error = %e,
                    "subscription vetoed"
                );
                return Err(e);
            }
        }

        let (tx, rx) = mpsc::channel(1);
        let stop = info.cancel.child_token();
        {
            let _registry = self.shared.gate.write().await;
            if self.shared.closed.is_cancelled() {
                return Err(PubSubError::ManagerClosed);
            }
            self.shared.subscriptions.set(
                info.id.clone(),
                Slot {
                    topic: info.topic.clone(),
                    channel: info.channel.clone(),
                    output: tx,
                    stop: stop.clone(),
                },
            );
        }

        let shared = Arc::clone(&self.shared);
        let id = info.id.clone();
        self.spawner.spawn(async move {
            tokio::select! {
                () = stop.cancelled() => {}
                () = shared.closed.cancelled() => {}
            }
            remove_subscription(&shared, &id).await;
        });

        info!(
            subscription = %info.id,
            topic = %info.topic,
            channel = %info.channel,
            "new subscription"
        );
        Ok(Subscription { info, output: rx })
    }
}

impl<T, S> SubscriptionManager<T, S>
where
    T: Clone + Send + Sync + 'static,
{
    /// Remove subscription `id` and close its output. Unknown ids are a
    /// no-op; returns whether anything was removed.
    pub async fn unsubscribe(&self, id: &str) -> bool {
        remove_subscription(&self.shared, id).await
    }

    /// Queue `event` for dispatch without waiting. A full queue drops it.
    pub fn publish(&self, event: Event<T>) {
        match self.shared.events.try_send(event) {
            Ok(()) => DeliveryCounters::bump(&self.shared.counters.published),
            Err(TrySendError::Full(event)) => {
                DeliveryCounters::bump(&self.shared.counters.dropped);
                warn!(
                    topic = %event.topic,
                    channel = %event.channel,
                    "event queue full; dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                DeliveryCounters::bump(&self.shared.counters.dropped);
                warn!(
                    topic = %event.topic,
                    channel = %event.channel,
                    "dispatcher stopped; dropping event"
                );
            }
        }
    }

    /// Stop the dispatcher and remove every subscription, running the
    /// `after_unsubscribe` hooks for each. Returns how many were removed.
    pub async fn shutdown(&self) -> usize {
        let removed = {
            let _registry = self.shared.gate.write().await;
            // Cancel under the gate so monitors find nothing left to remove.
            self.shared.closed.cancel();
            self.shared.subscriptions.drain()
        };

        let chain = self.shared.middlewares.read().clone();
        for (id, _slot) in &removed {
            for middleware in &chain {
                middleware.after_unsubscribe(id).await;
            }
        }
        info!(removed = removed.len(), "subscription manager shut down");
        removed.len()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.shared.subscriptions.len()
    }

    /// True if there are no live subscriptions.
    pub fn is_empty(&self) -> bool {
        self.shared.subscriptions.is_empty()
    }

    /// Bound applied to each send.
    pub fn delivery_timeout(&self) -> Duration {
        self.shared.delivery_timeout
    }

    /// Snapshot of delivery statistics.
    pub fn stats(&self) -> DeliveryStats {
        self.shared.counters.snapshot()
    }
}

async fn remove_subscription<T>(shared: &ManagerShared<T>, id: &str) -> bool
where
    T: Clone + Send + Sync + 'static,
{
    let removed = {
        let _registry = shared.gate.write().await;
        shared.subscriptions.delete(id)
    };
    // Dropping the slot drops the only sender, closing the output.
    let Some(slot) = removed else {
        return false;
    };
    slot.stop.cancel();
    info!(subscription = %id, "subscription removed");

    let chain = shared.middlewares.read().clone();
    for middleware in &chain {
        middleware.after_unsubscribe(id).await;
    }
    true
}

async fn dispatcher<T>(shared: Arc<ManagerShared<T>>, mut events: mpsc::Receiver<Event<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    loop {
        let event = tokio::select! {
            () = shared.closed.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let Err(panic) = AssertUnwindSafe(fan_out(&shared, event))
            .catch_unwind()
            .await
        {
            DeliveryCounters::bump(&shared.counters.panicked);
            warn!(
                panic = %panic_message(panic.as_ref()),
                "panic during event dispatch; continuing"
            );
        }
    }
    debug!("subscription dispatcher exited");
}

async fn fan_out<T>(shared: &ManagerShared<T>, event: Event<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let _fanout = shared.gate.read().await;

    for (id, slot) in shared.subscriptions.iterate() {
        if slot.topic != event.topic || slot.channel != event.channel {
            continue;
        }
        let send = slot.output.send(event.payload.clone());
        match tokio::time::timeout(shared.delivery_timeout, send).await {
            Ok(Ok(())) => DeliveryCounters::bump(&shared.counters.delivered),
            Ok(Err(_)) => {
                debug!(subscription = %id, "subscriber output dropped; skipping");
            }
            Err(_) => {
                DeliveryCounters::bump(&shared.counters.timed_out);
                warn!(
                    subscription = %id,
                    timeout = ?shared.delivery_timeout,
                    "timeout sending to subscriber"
                );
            }
        }
    }
}

/// Time-derived id with a random suffix, e.g. `sub_1718000000000_3f9a0c1d2e4b`.
fn generate_id() -> SubscriptionId {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("sub_{}_{}", now_ms(), &suffix[..12])
}
