mod common;

use std::sync::Arc;
use std::time::Duration;

use duramq::config::QueueConfig;
use duramq::core::queue::PersistentQueue;
use duramq::store::Store;
use duramq::{Event, Message, Queue};

/// Interleaved producers with a slow consumer deliver the same gap-free
/// offset sequence a serial run would: the batcher is the single point
/// where offsets are assigned.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_producers_yield_a_serial_offset_sequence() {
    common::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = common::sqlite_store(&dir);

    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 50;

    let cfg = QueueConfig {
        batch_size: 4,
        write_timeout_ms: 20,
        ..QueueConfig::named("session-interleave")
    };

    let bucket = store.bucket("session-interleave", common::codec()).unwrap();
    let queue = Arc::new(PersistentQueue::open(cfg, bucket).unwrap());

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                let (event, signal) =
                    Event::tracked(Message::new(format!("dev/{p}"), format!("m{i}")));
                queue.push(event).await.unwrap();
                assert!(signal.wait().await);
            }
        }));
    }

    // Slow consumer: drain with a small delay so the egress channel stays
    // saturated while producers interleave.
    let chan = queue.chan();
    let mut prev = 0u64;
    for _ in 0..PRODUCERS * PER_PRODUCER {
        let event = {
            let mut rx = chan.lock().await;
            rx.recv().await.expect("queue closed early")
        };
        assert_eq!(event.offset(), prev + 1, "delivery must be gap-free and ordered");
        prev = event.offset();
        if prev % 16 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    assert_eq!(prev, (PRODUCERS * PER_PRODUCER) as u64);

    for producer in producers {
        producer.await.unwrap();
    }
    queue.close(true).await.unwrap();
}
