//! Builders to construct the event bus, subscription manager and task
//! manager from configuration.

use crate::config::PubSubConfig;
use crate::core::{EventBus, PubSubError, Spawn, SubscriptionManager, TaskManager};

/// The messaging components of an application, wired from one config.
///
/// Components are owned here and handed out by reference or clone; there is
/// no process-wide instance.
pub struct PubSubHub<T, S> {
    /// Topic-addressed event bus.
    pub bus: EventBus<T, S>,
    /// Middleware-aware subscription manager.
    pub manager: SubscriptionManager<T, S>,
    /// Named delayed tasks.
    pub tasks: TaskManager,
}

/// Build a [`PubSubHub`] from configuration using `spawner` for every
/// background task.
///
/// # Errors
///
/// Returns [`PubSubError::InvalidConfig`] if `cfg` does not validate.
pub fn build_hub<T, S>(cfg: &PubSubConfig, spawner: S) -> Result<PubSubHub<T, S>, PubSubError>
where
    T: Clone + Send + Sync + 'static,
    S: Spawn + Clone,
{
    cfg.validate().map_err(PubSubError::InvalidConfig)?;

    let bus = EventBus::with_defaults(spawner.clone(), cfg.bus.subscribe_options());
    let manager = SubscriptionManager::with_capacity(
        spawner,
        cfg.manager.delivery_timeout(),
        cfg.manager.queue_capacity,
    );

    tracing::debug!(
        bus_buffer_size = cfg.bus.default_buffer_size,
        manager_queue_capacity = cfg.manager.queue_capacity,
        manager_timeout_ms = cfg.manager.delivery_timeout_ms,
        "pub/sub hub built"
    );

    Ok(PubSubHub {
        bus,
        manager,
        tasks: TaskManager::new(),
    })
}
