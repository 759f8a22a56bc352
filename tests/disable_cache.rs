mod common;

use duramq::config::QueueConfig;
use duramq::core::queue::PersistentQueue;
use duramq::store::Store;
use duramq::{Event, Message, Queue, QueueError};

/// With the cache frozen, delivery degrades to store reads and stays
/// correct; persisted state is unaffected.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_cache_falls_back_to_store_reads() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = common::sqlite_store(&dir);

    let cfg = QueueConfig {
        batch_size: 3,
        write_timeout_ms: 20,
        ..QueueConfig::named("session-disable")
    };

    let bucket = store.bucket("session-disable", common::codec()).unwrap();
    let queue = PersistentQueue::open(cfg, bucket).unwrap();
    queue.disable();

    for i in 0..9u32 {
        let (event, signal) = Event::tracked(Message::new("dev/data", format!("m{i}")));
        queue.push(event).await.unwrap();
        assert!(signal.wait().await);
    }

    let mut prev = 0u64;
    for _ in 0..9 {
        let event = queue.pop().await.unwrap();
        assert_eq!(event.offset(), prev + 1);
        prev = event.offset();
    }

    queue.close(false).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operations_fail_after_close() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = common::sqlite_store(&dir);

    let bucket = store.bucket("session-closed", common::codec()).unwrap();
    let queue = PersistentQueue::open(QueueConfig::named("session-closed"), bucket).unwrap();
    queue.close(false).await.unwrap();

    assert!(matches!(
        queue.push(Event::new(Message::new("t", "p"))).await,
        Err(QueueError::Closed)
    ));
    assert!(matches!(queue.pop().await, Err(QueueError::Closed)));
}
