//! Tests for builder modules

use std::time::Duration;

use prometheus_pubsub::builders::build_hub;
use prometheus_pubsub::config::PubSubConfig;
use prometheus_pubsub::core::{Event, PubSubError};
use prometheus_pubsub::runtime::TokioSpawner;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_build_hub_applies_config() {
    let mut cfg = PubSubConfig::default();
    cfg.manager.delivery_timeout_ms = 250;

    let hub = build_hub::<u32, _>(&cfg, TokioSpawner::current()).expect("valid config");
    assert_eq!(hub.manager.delivery_timeout(), Duration::from_millis(250));
    assert_eq!(hub.bus.topic_count(), 0);
    assert!(hub.tasks.is_empty());
}

#[tokio::test]
async fn test_build_hub_rejects_invalid_config() {
    let mut cfg = PubSubConfig::default();
    cfg.bus.default_buffer_size = 0;

    let err = build_hub::<u32, _>(&cfg, TokioSpawner::current())
        .err()
        .expect("invalid config");
    assert!(matches!(err, PubSubError::InvalidConfig(msg) if msg.starts_with("bus invalid")));
}

#[tokio::test]
async fn test_hub_components_are_live() {
    let hub = build_hub::<u32, _>(&PubSubConfig::default(), TokioSpawner::current())
        .expect("valid config");

    let (tx, mut rx) = mpsc::channel(1);
    hub.bus.subscribe("orders", tx);
    hub.bus.publish("orders", 1).await;
    assert_eq!(rx.recv().await.map(|e| e.payload), Some(1));

    let mut sub = hub
        .manager
        .subscribe(CancellationToken::new(), "orders", "1")
        .await
        .expect("subscribe");
    hub.manager.publish(Event::new("orders", "1", 2));
    assert_eq!(sub.recv().await, Some(2));
}
