//! Subscription middleware: veto and audit hooks around the subscription
//! lifecycle.
//!
//! Middlewares run in registration order. `before_subscribe` may veto by
//! returning an error; the first veto aborts the subscribe and nothing is
//! registered. `after_unsubscribe` is a notification and cannot fail.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::PubSubError;

/// Identifier of a managed subscription.
pub type SubscriptionId = String;

/// Subscription as seen by middleware before it is registered.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    /// Generated subscription identifier.
    pub id: SubscriptionId,
    /// Requested topic.
    pub topic: String,
    /// Requested channel qualifier.
    pub channel: String,
    /// Cancellation signal owned by the caller.
    pub cancel: CancellationToken,
}

/// Hooks run around the subscription lifecycle.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_pubsub::core::{Middleware, PubSubError, SubscriptionInfo};
///
/// struct QuotaMiddleware;
///
/// #[async_trait]
/// impl Middleware for QuotaMiddleware {
///     async fn before_subscribe(&self, sub: &SubscriptionInfo) -> Result<(), PubSubError> {
///         if sub.channel.is_empty() {
///             return Err(PubSubError::Rejected("channel required".into()));
///         }
///         Ok(())
///     }
///
///     async fn after_unsubscribe(&self, _id: &str) {}
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Inspect a subscription before it is registered. Returning an error
    /// vetoes the subscription.
    async fn before_subscribe(&self, sub: &SubscriptionInfo) -> Result<(), PubSubError>;

    /// Observe a subscription that has been removed.
    async fn after_unsubscribe(&self, id: &str);

    /// Name used in log records.
    fn name(&self) -> &'static str {
        "middleware"
    }
}

type Authorizer = dyn Fn(&SubscriptionInfo) -> bool + Send + Sync;

/// Authorization check that vetoes subscriptions its policy rejects.
#[derive(Clone)]
pub struct AuthMiddleware {
    policy: Arc<Authorizer>,
}

impl AuthMiddleware {
    /// Authorize with an arbitrary policy.
    pub fn new<F>(policy: F) -> Self
    where
        F: Fn(&SubscriptionInfo) -> bool + Send + Sync + 'static,
    {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Authorize every subscription.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// Authorize only subscriptions to the listed topics.
    pub fn allow_topics<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let allowed: HashSet<String> = topics.into_iter().map(Into::into).collect();
        Self::new(move |sub| allowed.contains(&sub.topic))
    }
}

impl fmt::Debug for AuthMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMiddleware").finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn before_subscribe(&self, sub: &SubscriptionInfo) -> Result<(), PubSubError> {
        if (self.policy)(sub) {
            Ok(())
        } else {
            tracing::warn!(
                subscription = %sub.id,
                topic = %sub.topic,
                channel = %sub.channel,
                "subscription denied"
            );
            Err(PubSubError::Unauthorized {
                topic: sub.topic.clone(),
                channel: sub.channel.clone(),
            })
        }
    }

    async fn after_unsubscribe(&self, _id: &str) {}

    fn name(&self) -> &'static str {
        "auth"
    }
}

/// Observer that logs subscription attempts and removals.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn before_subscribe(&self, sub: &SubscriptionInfo) -> Result<(), PubSubError> {
        tracing::info!(
            subscription = %sub.id,
            topic = %sub.topic,
            channel = %sub.channel,
            "subscription attempt"
        );
        Ok(())
    }

    async fn after_unsubscribe(&self, id: &str) {
        tracing::info!(subscription = %id, "unsubscribed");
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
