//! Tests for configuration validation and loading

use std::time::Duration;

use prometheus_pubsub::config::pubsub::{
    ENV_BUS_BUFFER_SIZE, ENV_BUS_TIMEOUT_MS, ENV_MANAGER_QUEUE_CAPACITY, ENV_MANAGER_TIMEOUT_MS,
};
use prometheus_pubsub::config::{BusConfig, ManagerConfig, PubSubConfig};

#[test]
fn test_defaults_are_valid() {
    let cfg = PubSubConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.bus.default_buffer_size, 1024);
    assert_eq!(cfg.bus.default_timeout_ms, None);
    assert_eq!(cfg.manager.queue_capacity, 100);
    assert_eq!(cfg.manager.delivery_timeout(), Duration::from_secs(1));
}

#[test]
fn test_bus_config_invalid_buffer() {
    let invalid = BusConfig {
        default_buffer_size: 0,
        default_timeout_ms: None,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bus_config_invalid_timeout() {
    let invalid = BusConfig {
        default_buffer_size: 8,
        default_timeout_ms: Some(0),
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_bus_config_subscribe_options() {
    let cfg = BusConfig {
        default_buffer_size: 16,
        default_timeout_ms: Some(250),
    };
    let opts = cfg.subscribe_options();
    assert_eq!(opts.buffer_size(), 16);
    assert_eq!(opts.timeout(), Some(Duration::from_millis(250)));
}

#[test]
fn test_manager_config_invalid() {
    let no_queue = ManagerConfig {
        queue_capacity: 0,
        delivery_timeout_ms: 100,
    };
    assert!(no_queue.validate().is_err());

    let no_timeout = ManagerConfig {
        queue_capacity: 10,
        delivery_timeout_ms: 0,
    };
    assert!(no_timeout.validate().is_err());
}

#[test]
fn test_pubsub_config_names_section() {
    let mut cfg = PubSubConfig::default();
    cfg.manager.queue_capacity = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("manager invalid"), "{err}");
}

#[test]
fn test_from_json_str_partial() {
    let cfg = PubSubConfig::from_json_str(r#"{ "bus": { "default_timeout_ms": 500 } }"#)
        .expect("valid json");
    assert_eq!(cfg.bus.default_buffer_size, 1024);
    assert_eq!(cfg.bus.default_timeout_ms, Some(500));
    assert_eq!(cfg.manager, ManagerConfig::default());
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(PubSubConfig::from_json_str("not json").is_err());
    let err = PubSubConfig::from_json_str(r#"{ "bus": { "default_buffer_size": 0 } }"#)
        .unwrap_err();
    assert!(err.starts_with("bus invalid"), "{err}");
}

#[test]
fn test_config_serde_roundtrip() {
    let cfg = PubSubConfig::default();
    let json = serde_json::to_string(&cfg).expect("serialize");
    assert_eq!(PubSubConfig::from_json_str(&json).expect("parse"), cfg);
}

// Environment variables are process-global, so every env case lives in one
// test to avoid interfering with parallel test threads.
#[test]
fn test_from_env_overrides() {
    let vars = [
        ENV_BUS_BUFFER_SIZE,
        ENV_BUS_TIMEOUT_MS,
        ENV_MANAGER_QUEUE_CAPACITY,
        ENV_MANAGER_TIMEOUT_MS,
    ];
    for var in vars {
        std::env::remove_var(var);
    }
    assert_eq!(PubSubConfig::from_env().expect("defaults"), PubSubConfig::default());

    std::env::set_var(ENV_BUS_BUFFER_SIZE, "64");
    std::env::set_var(ENV_BUS_TIMEOUT_MS, "200");
    std::env::set_var(ENV_MANAGER_QUEUE_CAPACITY, "10");
    std::env::set_var(ENV_MANAGER_TIMEOUT_MS, " 300 ");
    let cfg = PubSubConfig::from_env().expect("overrides");
    assert_eq!(cfg.bus.default_buffer_size, 64);
    assert_eq!(cfg.bus.default_timeout_ms, Some(200));
    assert_eq!(cfg.manager.queue_capacity, 10);
    assert_eq!(cfg.manager.delivery_timeout_ms, 300);

    std::env::set_var(ENV_MANAGER_QUEUE_CAPACITY, "lots");
    let err = PubSubConfig::from_env().unwrap_err();
    assert!(err.to_string().contains(ENV_MANAGER_QUEUE_CAPACITY));

    std::env::set_var(ENV_MANAGER_QUEUE_CAPACITY, "0");
    assert!(PubSubConfig::from_env().is_err());

    for var in vars {
        std::env::remove_var(var);
    }
}
