//! Events and their one-shot capabilities.
//!
//! An [`Event`] carries a [`Message`] through the queue plus up to two
//! single-fire handles: `done`, supplied by the producer and fired by the
//! queue once the message is durable, and `ack`, supplied by the queue at
//! delivery and fired by the consumer once downstream delivery succeeded.
//! Both are idempotent on repeat fire and safe to drop unfired.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::message::Message;

/// One-shot durability signal handed back to the producer.
#[derive(Debug)]
pub struct DoneHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl DoneHandle {
    pub(crate) fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Producer-side receiver for the durability signal.
#[derive(Debug)]
pub struct DoneSignal {
    rx: oneshot::Receiver<()>,
}

impl DoneSignal {
    /// Resolves once the event is durable. Returns `false` if the queue
    /// dropped the event without persisting it (write failure or close).
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

/// One-shot post-delivery signal bound to a delivered event.
///
/// Firing posts the event's offset onto the queue's deletion channel; if
/// that channel is full the caller is held until the collector drains it or
/// the queue closes.
#[derive(Debug)]
pub struct AckHandle {
    offset: u64,
    edel: mpsc::Sender<u64>,
    dying: CancellationToken,
}

impl AckHandle {
    pub(crate) fn new(offset: u64, edel: mpsc::Sender<u64>, dying: CancellationToken) -> Self {
        AckHandle { offset, edel, dying }
    }

    async fn fire(self) {
        tokio::select! {
            _ = self.edel.send(self.offset) => {}
            _ = self.dying.cancelled() => {}
        }
    }
}

/// A message travelling through a queue.
#[derive(Debug)]
pub struct Event {
    message: Message,
    done: Option<DoneHandle>,
    ack: Option<AckHandle>,
}

impl Event {
    /// An event without a durability signal (QoS-0 producers, replays).
    pub fn new(message: Message) -> Self {
        Event {
            message,
            done: None,
            ack: None,
        }
    }

    /// An event plus the signal its producer awaits for durability.
    pub fn tracked(message: Message) -> (Self, DoneSignal) {
        let (tx, rx) = oneshot::channel();
        let event = Event {
            message,
            done: Some(DoneHandle { tx: Some(tx) }),
            ack: None,
        };
        (event, DoneSignal { rx })
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Offset stamped at persistence; 0 before that.
    pub fn offset(&self) -> u64 {
        self.message.offset
    }

    /// Acknowledge downstream delivery. No-op when the event carries no
    /// ack capability or was already acknowledged.
    pub async fn ack(&mut self) {
        if let Some(ack) = self.ack.take() {
            ack.fire().await;
        }
    }

    pub(crate) fn mark_durable(&mut self) {
        if let Some(done) = self.done.as_mut() {
            done.fire();
        }
    }

    pub(crate) fn take_done(&mut self) -> Option<DoneHandle> {
        self.done.take()
    }

    pub(crate) fn bind_ack(&mut self, ack: AckHandle) {
        self.ack = Some(ack);
    }
}
