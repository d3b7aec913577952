//! Tests for the built-in subscription middlewares

use prometheus_pubsub::core::{
    AuthMiddleware, LoggingMiddleware, Middleware, PubSubError, SubscriptionInfo,
};
use tokio_util::sync::CancellationToken;

fn info(topic: &str, channel: &str) -> SubscriptionInfo {
    SubscriptionInfo {
        id: "sub_1_abcdef012345".to_string(),
        topic: topic.to_string(),
        channel: channel.to_string(),
        cancel: CancellationToken::new(),
    }
}

#[tokio::test]
async fn test_custom_policy_sees_channel() {
    let auth = AuthMiddleware::new(|sub| sub.channel.starts_with("team-"));
    assert!(auth.before_subscribe(&info("orders", "team-a")).await.is_ok());
    assert!(matches!(
        auth.before_subscribe(&info("orders", "public")).await,
        Err(PubSubError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_middleware_names() {
    assert_eq!(AuthMiddleware::allow_all().name(), "auth");
    assert_eq!(LoggingMiddleware.name(), "logging");
}

#[tokio::test]
async fn test_middleware_as_trait_object() {
    let chain: Vec<Box<dyn Middleware>> = vec![
        Box::new(LoggingMiddleware),
        Box::new(AuthMiddleware::allow_topics(["messages", "users"])),
    ];
    for middleware in &chain {
        assert!(middleware.before_subscribe(&info("users", "1")).await.is_ok());
        middleware.after_unsubscribe("sub_1_abcdef012345").await;
    }
}
