//! Error types for pub/sub operations.

use thiserror::Error;

/// Errors surfaced synchronously by pub/sub components.
///
/// Delivery failures (full queues, timeouts, closed subscribers) are never
/// returned through this type; they are logged and counted instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// An authorization middleware vetoed the subscription.
    #[error("unauthorized subscription to {topic}/{channel}")]
    Unauthorized {
        /// Topic the caller asked for.
        topic: String,
        /// Channel qualifier the caller asked for.
        channel: String,
    },
    /// A middleware rejected the subscription for another reason.
    #[error("subscription rejected: {0}")]
    Rejected(String),
    /// The subscription manager has been shut down.
    #[error("subscription manager is shut down")]
    ManagerClosed,
    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
