//! Session queue abstraction and its implementations.
//!
//! Each subscriber session owns one queue. QoS-1 sessions get a
//! [`PersistentQueue`] backed by an ordered byte store; QoS-0 sessions get
//! a [`MemoryQueue`] with the same surface and no durability.

pub mod manager;
pub mod memory;
pub mod persistent;

pub use manager::QueueManager;
pub use memory::MemoryQueue;
pub use persistent::PersistentQueue;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::core::error::QueueError;
use crate::core::event::Event;

/// Egress side of a queue. Exactly one consumer drains it, in offset order
/// for persistent queues.
pub type EventReceiver = Arc<Mutex<mpsc::Receiver<Event>>>;

/// Common interface of all session queue implementations.
#[async_trait]
pub trait Queue: Send + Sync {
    /// The session/bucket identifier this queue serves.
    fn id(&self) -> &str;

    /// Enqueue an event. Does not wait for durability; the event's done
    /// capability is the durability signal. Fails only when the queue is
    /// closing.
    async fn push(&self, event: Event) -> Result<(), QueueError>;

    /// Receive the next event, blocking until one arrives or the queue
    /// closes.
    async fn pop(&self) -> Result<Event, QueueError>;

    /// The egress channel backing [`Queue::pop`].
    fn chan(&self) -> EventReceiver;

    /// Freeze the batch cache. Test and isolation hook; persisted state is
    /// unaffected.
    fn disable(&self);

    /// Stop the workers, flush their buffers and release the backend. With
    /// `clean` the backing namespace is destroyed. Idempotent.
    async fn close(&self, clean: bool) -> Result<(), QueueError>;
}
