//! Core messaging abstractions: registry, event bus, subscription manager and
//! delayed tasks.

pub mod delayed_task;
pub mod error;
pub mod event_bus;
pub mod middleware;
pub mod registry;
pub mod spawn;
pub mod stats;
pub mod subscription;

pub use delayed_task::{DelayedTask, TaskManager, TaskState};
pub use error::{AppResult, PubSubError};
pub use event_bus::{DataEvent, EventBus, SubscribeOptions, SubscriberId, DEFAULT_BUFFER_SIZE};
pub use middleware::{AuthMiddleware, LoggingMiddleware, Middleware, SubscriptionId, SubscriptionInfo};
pub use registry::ConcurrentRegistry;
pub use spawn::Spawn;
pub use stats::DeliveryStats;
pub use subscription::{
    Event, Subscription, SubscriptionManager, DEFAULT_DELIVERY_TIMEOUT, DEFAULT_QUEUE_CAPACITY,
    TOPIC_MESSAGES, TOPIC_USERS,
};
