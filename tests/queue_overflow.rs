mod common;

use std::time::Duration;

use duramq::config::QueueConfig;
use duramq::core::queue::PersistentQueue;
use duramq::store::Store;
use duramq::{Event, Message, Queue};
use tokio::time::timeout;

/// A stalled consumer throttles only the egress channel. Producers keep
/// pushing and reaching durability because ingress capacity and the store
/// are independent of delivery.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_consumer_does_not_block_producers() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = common::sqlite_store(&dir);

    let cfg = QueueConfig {
        batch_size: 2,
        write_timeout_ms: 20,
        ..QueueConfig::named("session-slow")
    };

    let bucket = store.bucket("session-slow", common::codec()).unwrap();
    let queue = PersistentQueue::open(cfg, bucket).unwrap();

    // Nobody pops. The egress channel (capacity 2) fills and the reader
    // parks on it while producers continue unhindered.
    let mut signals = Vec::with_capacity(100);
    for i in 0..100u32 {
        let (event, signal) = Event::tracked(Message::new("dev/data", format!("m{i}")));
        timeout(Duration::from_secs(1), queue.push(event))
            .await
            .expect("push must not block on a stalled consumer")
            .unwrap();
        signals.push(signal);
    }
    for signal in signals {
        assert!(
            timeout(Duration::from_secs(5), signal.wait())
                .await
                .expect("durability must not depend on the consumer")
        );
    }

    // Once the consumer starts draining, every event arrives in order.
    let mut prev = 0u64;
    for _ in 0..100 {
        let event = timeout(Duration::from_secs(1), queue.pop())
            .await
            .expect("drain stalled")
            .unwrap();
        assert_eq!(event.offset(), prev + 1);
        prev = event.offset();
    }

    queue.close(false).await.unwrap();
}
