//! Non-durable session queue for QoS-0 sessions.
//!
//! A bounded channel behind the same [`Queue`] surface as the persistent
//! queue. Acceptance is the only durability there is: the producer's done
//! capability fires as soon as the event is buffered, events carry no ack,
//! and closing discards whatever is still buffered.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::core::error::QueueError;
use crate::core::event::Event;
use crate::core::queue::{EventReceiver, Queue};

pub struct MemoryQueue {
    id: String,
    input: mpsc::Sender<Event>,
    output: EventReceiver,
    dying: CancellationToken,
}

impl MemoryQueue {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        let (input, output) = mpsc::channel(capacity.max(1));
        MemoryQueue {
            id: id.into(),
            input,
            output: Arc::new(AsyncMutex::new(output)),
            dying: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn id(&self) -> &str {
        &self.id
    }

    async fn push(&self, mut event: Event) -> Result<(), QueueError> {
        let done = event.take_done();
        tokio::select! {
            sent = self.input.send(event) => match sent {
                Ok(()) => {
                    if let Some(mut done) = done {
                        done.fire();
                    }
                    Ok(())
                }
                Err(_) => Err(QueueError::Closed),
            },
            _ = self.dying.cancelled() => Err(QueueError::Closed),
        }
    }

    async fn pop(&self) -> Result<Event, QueueError> {
        let mut output = self.output.lock().await;
        tokio::select! {
            received = output.recv() => received.ok_or(QueueError::Closed),
            _ = self.dying.cancelled() => Err(QueueError::Closed),
        }
    }

    fn chan(&self) -> EventReceiver {
        Arc::clone(&self.output)
    }

    fn disable(&self) {}

    async fn close(&self, _clean: bool) -> Result<(), QueueError> {
        self.dying.cancel();
        Ok(())
    }
}
