//! Durable session queue.
//!
//! Three workers cooperate around one ordered byte bucket:
//!
//! - the writer batches incoming events, assigns offsets and persists them;
//! - the reader pumps committed batches (from the in-memory cache when it
//!   can, from the bucket otherwise) to the single consumer in offset
//!   order;
//! - the collector coalesces acknowledgements into prefix deletions and
//!   periodically sweeps expired records.
//!
//! Workers talk through bounded channels and share only the offset
//! high-water mark, the batch cache and the disable flag, behind one mutex
//! that is never held across I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::config::QueueConfig;
use crate::core::error::QueueError;
use crate::core::event::{AckHandle, Event};
use crate::core::message::{current_timestamp, Message};
use crate::core::queue::{EventReceiver, Queue};
use crate::store::{BatchBucket, BincodeCodec, Codec};

/// A committed batch mirrored in memory.
struct Batch {
    begin: u64,
    messages: Vec<Message>,
}

/// State shared between the workers, guarded by [`Core::shared`].
struct Shared {
    /// Highest committed offset.
    offset: u64,
    /// Most recently committed batches, oldest first.
    cache: VecDeque<Batch>,
    /// Once set, no further batches enter the cache.
    disable: bool,
}

impl Shared {
    /// Drop leading cache batches whose newest message is older than
    /// `horizon`.
    fn trim_expired(&mut self, horizon: u64) {
        while self
            .cache
            .front()
            .is_some_and(|batch| batch.messages.last().is_some_and(|m| m.timestamp < horizon))
        {
            self.cache.pop_front();
        }
    }
}

struct Core {
    id: String,
    cfg: QueueConfig,
    shared: Mutex<Shared>,
    bucket: Arc<dyn BatchBucket>,
    codec: Arc<dyn Codec>,
    output_tx: mpsc::Sender<Event>,
    edel_tx: mpsc::Sender<u64>,
    eget_tx: mpsc::Sender<()>,
    dying: CancellationToken,
}

/// Persistent queue over one [`BatchBucket`].
pub struct PersistentQueue {
    core: Arc<Core>,
    input: mpsc::Sender<Event>,
    output: EventReceiver,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PersistentQueue {
    /// Open a queue over `bucket`, resuming offset assignment from the
    /// bucket's high-water mark. Spawns the three workers, so it must run
    /// inside a tokio runtime.
    pub fn open(cfg: QueueConfig, bucket: Arc<dyn BatchBucket>) -> Result<Self, QueueError> {
        Self::open_with_codec(cfg, bucket, Arc::new(BincodeCodec))
    }

    pub fn open_with_codec(
        cfg: QueueConfig,
        bucket: Arc<dyn BatchBucket>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, QueueError> {
        let offset = bucket.max_offset()?;
        let begin = bucket.min_offset()?.max(1);

        let cap = cfg.batch_size.max(1);
        let (input_tx, input_rx) = mpsc::channel(cap);
        let (output_tx, output_rx) = mpsc::channel(cap);
        let (edel_tx, edel_rx) = mpsc::channel(cap);
        let (eget_tx, eget_rx) = mpsc::channel(1);

        let core = Arc::new(Core {
            id: cfg.name.clone(),
            cfg,
            shared: Mutex::new(Shared {
                offset,
                cache: VecDeque::new(),
                disable: false,
            }),
            bucket,
            codec,
            output_tx,
            edel_tx,
            eget_tx,
            dying: CancellationToken::new(),
        });

        // Initial catch-up pump for data left over from a previous run.
        core.trigger_read();

        let workers = vec![
            tokio::spawn(Arc::clone(&core).writing(input_rx)),
            tokio::spawn(Arc::clone(&core).reading(eget_rx, begin)),
            tokio::spawn(Arc::clone(&core).deleting(edel_rx)),
        ];

        Ok(PersistentQueue {
            core,
            input: input_tx,
            output: Arc::new(AsyncMutex::new(output_rx)),
            workers: AsyncMutex::new(workers),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Queue for PersistentQueue {
    fn id(&self) -> &str {
        &self.core.id
    }

    async fn push(&self, event: Event) -> Result<(), QueueError> {
        tokio::select! {
            sent = self.input.send(event) => sent.map_err(|_| QueueError::Closed),
            _ = self.core.dying.cancelled() => Err(QueueError::Closed),
        }
    }

    async fn pop(&self) -> Result<Event, QueueError> {
        let mut output = self.output.lock().await;
        tokio::select! {
            received = output.recv() => received.ok_or(QueueError::Closed),
            _ = self.core.dying.cancelled() => Err(QueueError::Closed),
        }
    }

    fn chan(&self) -> EventReceiver {
        Arc::clone(&self.output)
    }

    fn disable(&self) {
        self.core.shared.lock().disable = true;
    }

    async fn close(&self, clean: bool) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(queue = %self.core.id, clean, "queue closing");
        self.core.dying.cancel();
        let handles = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            let _ = handle.await;
        }
        self.core.bucket.close(clean)?;
        debug!(queue = %self.core.id, "queue closed");
        Ok(())
    }
}

impl Core {
    /// Ingress worker: coalesce pushes into batches, flush on size, on the
    /// write timer, and once more while shutting down.
    async fn writing(self: Arc<Self>, mut input: mpsc::Receiver<Event>) {
        debug!(queue = %self.id, "write worker running");
        let cap = self.cfg.batch_size.max(1);
        let write_timeout = self.cfg.write_timeout();
        let mut buf: Vec<Event> = Vec::with_capacity(cap);

        let timer = time::sleep(write_timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = input.recv() => match received {
                    Some(event) => {
                        trace!(queue = %self.id, topic = %event.message().topic, "buffered incoming event");
                        buf.push(event);
                        if buf.len() == cap {
                            self.flush_write(&mut buf);
                        }
                        timer.as_mut().reset(Instant::now() + write_timeout);
                    }
                    None => break,
                },
                _ = &mut timer => {
                    self.flush_write(&mut buf);
                    timer.as_mut().reset(Instant::now() + write_timeout);
                }
                _ = self.dying.cancelled() => break,
            }
        }

        // Final drain: whatever already made it onto the ingress channel
        // still gets persisted before the queue goes down.
        while let Ok(event) = input.try_recv() {
            buf.push(event);
            if buf.len() == cap {
                self.flush_write(&mut buf);
            }
        }
        self.flush_write(&mut buf);
        debug!(queue = %self.id, "write worker stopped");
    }

    /// Assign offsets to the buffered events, persist them as one batch and
    /// fire the producers' durability signals. The buffer is consumed
    /// either way; a failed write fires nothing and advances nothing.
    fn flush_write(&self, buf: &mut Vec<Event>) {
        if buf.is_empty() {
            return;
        }

        let begin = self.shared.lock().offset + 1;
        let mut records = Vec::with_capacity(buf.len());
        let mut messages = Vec::with_capacity(buf.len());
        let mut next = begin;
        for event in buf.iter() {
            let mut message = event.message().clone();
            message.offset = next;
            next += 1;
            match self.codec.encode(&message) {
                Ok(data) => {
                    records.push(data);
                    messages.push(message);
                }
                Err(err) => {
                    error!(queue = %self.id, error = %err, "failed to encode batch, dropping it");
                    buf.clear();
                    return;
                }
            }
        }

        if let Err(err) = self.bucket.put(begin, &records) {
            error!(queue = %self.id, error = %err, count = buf.len(),
                   "failed to write batch to the backend");
            buf.clear();
            return;
        }

        for mut event in buf.drain(..) {
            event.mark_durable();
        }

        let count = messages.len() as u64;
        {
            let mut shared = self.shared.lock();
            if !shared.disable && shared.cache.len() < self.cfg.max_batch_cache_size {
                shared.cache.push_back(Batch { begin, messages });
            }
            shared.offset += count;
        }
        trace!(queue = %self.id, begin, count, "committed batch");

        self.trigger_read();
    }

    /// Egress worker: run one pump per trigger, starting the cursor at the
    /// oldest surviving offset.
    async fn reading(self: Arc<Self>, mut eget: mpsc::Receiver<()>, mut begin: u64) {
        debug!(queue = %self.id, begin, "read worker running");
        let cap = self.cfg.batch_size.max(1) as u64;
        loop {
            tokio::select! {
                received = eget.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match self.pump(begin, cap).await {
                        Some(cursor) => begin = cursor,
                        None => break,
                    }
                }
                _ = self.dying.cancelled() => break,
            }
        }
        debug!(queue = %self.id, "read worker stopped");
    }

    /// One egress round: pick the next contiguous slice (cache head when it
    /// lines up, store scan otherwise), wrap each message with an ack bound
    /// to this queue and hand it to the consumer channel.
    ///
    /// Returns the advanced cursor, or `None` when the queue died while a
    /// send was in flight.
    async fn pump(&self, begin: u64, cap: u64) -> Option<u64> {
        let mut end = 0u64;
        let mut messages = Vec::new();
        {
            let mut shared = self.shared.lock();
            let take_head = match shared.cache.front() {
                Some(front) if front.begin == begin => true,
                Some(front) if front.begin > begin => {
                    end = front.begin;
                    false
                }
                // A head behind the cursor is stale (expiry trimmed the
                // store past it); read from the store instead.
                _ => false,
            };
            if take_head {
                if let Some(batch) = shared.cache.pop_front() {
                    messages = batch.messages;
                }
            }
            if end == 0 {
                end = shared.offset + 1;
            }
        }

        if messages.is_empty() {
            end = end.min(begin + cap);
            if begin >= end {
                return Some(begin);
            }
            messages = match self.fetch(begin, end) {
                Ok(messages) => messages,
                Err(err) => {
                    error!(queue = %self.id, error = %err, begin, end,
                           "failed to read messages from the backend");
                    return Some(begin);
                }
            };
            if messages.is_empty() {
                return Some(begin);
            }
        }

        let mut cursor = begin;
        for message in messages {
            let offset = message.offset;
            let mut event = Event::new(message);
            event.bind_ack(AckHandle::new(
                offset,
                self.edel_tx.clone(),
                self.dying.clone(),
            ));
            tokio::select! {
                sent = self.output_tx.send(event) => {
                    if sent.is_err() {
                        return None;
                    }
                }
                _ = self.dying.cancelled() => return None,
            }
            cursor = offset + 1;
        }

        // Keep draining until the store has nothing more for us.
        self.trigger_read();
        Some(cursor)
    }

    /// Scan `[begin, end)` from the bucket and decode each record.
    fn fetch(&self, begin: u64, end: u64) -> Result<Vec<Message>, QueueError> {
        let mut messages = Vec::new();
        let codec = &self.codec;
        self.bucket.get(begin, end, &mut |offset, data| {
            if data.is_empty() {
                return Err(crate::store::StoreError::EmptyValue(offset));
            }
            let message = codec.decode(data)?;
            if message.offset != offset {
                return Err(crate::store::StoreError::OffsetMismatch {
                    stored: message.offset,
                    key: offset,
                });
            }
            messages.push(message);
            Ok(())
        })?;
        Ok(messages)
    }

    /// Deletion worker: coalesce acknowledged offsets into prefix deletes,
    /// and run the expiry sweep on its own ticker.
    async fn deleting(self: Arc<Self>, mut edel: mpsc::Receiver<u64>) {
        debug!(queue = %self.id, "delete worker running");
        let cap = self.cfg.batch_size.max(1);
        let delete_timeout = self.cfg.delete_timeout();
        let mut buf: Vec<u64> = Vec::with_capacity(cap);

        let timer = time::sleep(delete_timeout);
        tokio::pin!(timer);
        let mut sweep = time::interval_at(
            Instant::now() + self.cfg.clean_interval(),
            self.cfg.clean_interval(),
        );

        loop {
            tokio::select! {
                received = edel.recv() => match received {
                    Some(offset) => {
                        buf.push(offset);
                        if buf.len() == cap {
                            self.flush_delete(&mut buf);
                        }
                        timer.as_mut().reset(Instant::now() + delete_timeout);
                    }
                    None => break,
                },
                _ = &mut timer => {
                    self.flush_delete(&mut buf);
                    timer.as_mut().reset(Instant::now() + delete_timeout);
                }
                _ = sweep.tick() => self.sweep_expired(),
                _ = self.dying.cancelled() => break,
            }
        }

        while let Ok(offset) = edel.try_recv() {
            buf.push(offset);
        }
        self.flush_delete(&mut buf);
        debug!(queue = %self.id, "delete worker stopped");
    }

    /// Prefix-delete everything up to the highest acknowledged offset.
    /// QoS-1 delivery is in order, so smaller offsets are already
    /// acknowledged, expired, or in flight to the same consumer.
    fn flush_delete(&self, buf: &mut Vec<u64>) {
        let Some(highest) = buf.iter().max().copied() else {
            return;
        };
        if let Err(err) = self.bucket.delete_before(highest + 1) {
            error!(queue = %self.id, error = %err, highest,
                   "failed to delete acknowledged messages");
        }
        trace!(queue = %self.id, count = buf.len(), highest, "truncated acknowledged prefix");
        buf.clear();
    }

    /// Drop expired batches from the cache, then from the store.
    fn sweep_expired(&self) {
        let horizon = current_timestamp().saturating_sub(self.cfg.expire_time().as_secs());
        self.shared.lock().trim_expired(horizon);
        if let Err(err) = self.bucket.delete_before_timestamp(horizon) {
            error!(queue = %self.id, error = %err, horizon, "failed to sweep expired messages");
        }
    }

    /// Post a pump signal; concurrent signals coalesce into one pending
    /// pump because the trigger channel holds a single slot.
    fn trigger_read(&self) {
        let _ = self.eget_tx.try_send(());
    }
}
