mod common;

use std::time::Duration;

use duramq::config::QueueConfig;
use duramq::core::queue::PersistentQueue;
use duramq::store::Store;
use duramq::{Event, Message, Queue};
use tokio::time::timeout;

/// Acking a subset of offsets truncates the whole prefix below the highest
/// ack: QoS-1 delivery is in order, so everything below an acknowledged
/// offset is implicitly settled.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn acks_coalesce_into_a_prefix_delete() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = common::sqlite_store(&dir);

    let cfg = QueueConfig {
        batch_size: 5,
        delete_timeout_ms: 50,
        write_timeout_ms: 20,
        ..QueueConfig::named("session-ack")
    };

    let bucket = store.bucket("session-ack", common::codec()).unwrap();
    let queue = PersistentQueue::open(cfg.clone(), bucket).unwrap();

    for i in 0..5u32 {
        let (event, signal) = Event::tracked(Message::new("dev/data", format!("m{i}")));
        queue.push(event).await.unwrap();
        assert!(signal.wait().await);
    }

    for _ in 0..5 {
        let mut event = queue.pop().await.unwrap();
        if event.offset() == 2 || event.offset() == 4 {
            event.ack().await;
        }
    }

    // Let the delete timer flush the two buffered acks.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let probe = store.bucket("session-ack", common::codec()).unwrap();
    assert_eq!(probe.min_offset().unwrap(), 5, "offsets 1..=4 must be truncated");

    queue.close(false).await.unwrap();

    // A fresh reader replays only the unacknowledged tail: offset 5.
    let bucket = store.bucket("session-ack", common::codec()).unwrap();
    let queue = PersistentQueue::open(cfg, bucket).unwrap();

    let event = queue.pop().await.unwrap();
    assert_eq!(event.offset(), 5);
    assert!(
        timeout(Duration::from_millis(200), queue.pop()).await.is_err(),
        "nothing below the acknowledged prefix may replay"
    );

    queue.close(false).await.unwrap();
}
