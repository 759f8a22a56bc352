//! duramq: the durable per-session queue engine of an MQTT broker.
//!
//! Each subscriber session owns one queue. Messages routed to the session
//! are batched into an ordered byte store, read back in offset order by the
//! session's delivery loop, and removed again once acknowledged or expired.
//! The store itself is pluggable; sqlite and rocksdb backends are provided.

pub mod config;
pub mod core;
pub mod logging;
pub mod store;

pub use crate::config::{load_config, Config};
pub use crate::core::error::QueueError;
pub use crate::core::event::Event;
pub use crate::core::message::{current_timestamp, Message, QosLevel};
pub use crate::core::queue::{MemoryQueue, PersistentQueue, Queue, QueueManager};
