//! Tests for tokio spawner utilities

use std::time::Duration;

use prometheus_pubsub::core::Spawn;
use prometheus_pubsub::runtime::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_tokio_spawner_current() {
    let spawner = TokioSpawner::current();
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        tx.send("done").unwrap();
    });
    assert_eq!(rx.await.expect("oneshot result"), "done");
}

// Owned runtimes must be dropped outside of async context.
#[test]
fn test_tokio_spawner_owned_runtime() {
    let spawner = TokioSpawner::with_worker_threads(2).expect("runtime");
    let (tx, rx) = std::sync::mpsc::channel();
    spawner.spawn(async move {
        tx.send(7).unwrap();
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).expect("result"), 7);

    let clone = spawner.clone();
    drop(spawner);
    let (tx, rx) = std::sync::mpsc::channel();
    clone.spawn(async move {
        tx.send(8).unwrap();
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).expect("result"), 8);
}
