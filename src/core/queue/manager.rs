//! Per-session queue registry.
//!
//! Uses DashMap for concurrent access so publish routing can look queues
//! up without a global lock while sessions come and go.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::core::error::QueueError;
use crate::core::queue::Queue;

/// A thread-safe registry of session queues.
///
/// The manager owns nothing about sessions themselves; it only maps a
/// session id to its queue and closes what is left at shutdown.
#[derive(Default)]
pub struct QueueManager {
    queues: DashMap<String, Arc<dyn Queue>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<dyn Queue>> {
        self.queues.get(session_id).map(|q| Arc::clone(&*q))
    }

    /// Returns the queue for a session, creating it with `make` if absent.
    pub fn get_or_create<F>(&self, session_id: &str, make: F) -> Result<Arc<dyn Queue>, QueueError>
    where
        F: FnOnce() -> Result<Arc<dyn Queue>, QueueError>,
    {
        if let Some(existing) = self.queues.get(session_id) {
            return Ok(Arc::clone(&*existing));
        }

        let queue = make()?;

        // Insert only if not already present (handles the create race).
        let entry = self
            .queues
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::clone(&queue));

        Ok(Arc::clone(&*entry))
    }

    /// Detach a session's queue, returning it so the caller can close it
    /// with the right `clean` flag.
    pub fn remove(&self, session_id: &str) -> Option<Arc<dyn Queue>> {
        self.queues.remove(session_id).map(|(_, q)| q)
    }

    pub fn count(&self) -> usize {
        self.queues.len()
    }

    /// Close every registered queue and empty the registry.
    pub async fn close_all(&self, clean: bool) {
        let drained: Vec<(String, Arc<dyn Queue>)> = {
            let mut out = Vec::with_capacity(self.queues.len());
            for entry in self.queues.iter() {
                out.push((entry.key().clone(), Arc::clone(entry.value())));
            }
            self.queues.clear();
            out
        };
        for (session_id, queue) in drained {
            if let Err(err) = queue.close(clean).await {
                warn!(session = %session_id, error = %err, "failed to close session queue");
            }
        }
    }
}
