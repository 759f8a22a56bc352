//! Ordered byte-store abstraction backing the persistent queues.
//!
//! A [`BatchBucket`] is one durable namespace keyed by monotonic u64
//! offsets. Queues only ever append batches at the tail, scan ranges in
//! ascending order, and truncate prefixes (by offset or by age), so the
//! contract is deliberately small. Two backends are provided: sqlite
//! (transactional, with a timestamp index for age-based truncation) and
//! rocksdb (pure KV; age-based truncation is a no-op there).

pub mod rocks;
pub mod sqlite;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::config::{Driver, StoreConfig};
use crate::core::message::Message;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("rocksdb error: {0}")]
    Rocks(#[from] rocksdb::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("offset {0} already exists")]
    OffsetExists(u64),

    #[error("record at offset {0} is empty")]
    EmptyValue(u64),

    #[error("record offset {stored} does not match store key {key}")]
    OffsetMismatch { stored: u64, key: u64 },

    #[error("bucket {0} does not exist")]
    MissingBucket(String),

    #[error("invalid key encoding: {0}")]
    KeyDecode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode/decode seam between the queue and its bucket.
///
/// The queue serializes records before handing them to `put` and decodes
/// them after `get`. Backends with a secondary time index additionally call
/// `timestamp_of` to extract the indexed column from an opaque record.
pub trait Codec: Send + Sync {
    fn encode(&self, msg: &Message) -> Result<Bytes, StoreError>;
    fn decode(&self, data: &[u8]) -> Result<Message, StoreError>;
    fn timestamp_of(&self, data: &[u8]) -> Result<u64, StoreError>;
}

/// Default record encoding: bincode over the serde `Message` derive.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode(&self, msg: &Message) -> Result<Bytes, StoreError> {
        Ok(Bytes::from(bincode::serialize(msg)?))
    }

    fn decode(&self, data: &[u8]) -> Result<Message, StoreError> {
        Ok(bincode::deserialize(data)?)
    }

    fn timestamp_of(&self, data: &[u8]) -> Result<u64, StoreError> {
        Ok(self.decode(data)?.timestamp)
    }
}

/// Visitor invoked by [`BatchBucket::get`] for each record in range.
pub type RecordVisitor<'a> = dyn FnMut(u64, &[u8]) -> Result<(), StoreError> + 'a;

/// One ordered namespace of offset-keyed records.
///
/// Offsets are 1-based and strictly monotonic; deleted offsets are never
/// reused. All operations are idempotent where the semantics allow it, and
/// a failed `put` leaves the bucket unchanged.
pub trait BatchBucket: Send + Sync {
    /// Atomic append of records under offsets `begin, begin+1, ...`.
    /// Fails without side effects if any of those offsets already exists.
    fn put(&self, begin: u64, records: &[Bytes]) -> Result<(), StoreError>;

    /// Visit records with offsets in `[begin, end)` in ascending order.
    /// Offsets removed by earlier truncations are skipped silently.
    fn get(&self, begin: u64, end: u64, visit: &mut RecordVisitor<'_>) -> Result<(), StoreError>;

    /// Smallest live offset, 0 when empty.
    fn min_offset(&self) -> Result<u64, StoreError>;

    /// Largest live offset, 0 when empty.
    fn max_offset(&self) -> Result<u64, StoreError>;

    /// Remove every offset strictly below `id`. Idempotent.
    fn delete_before(&self, id: u64) -> Result<(), StoreError>;

    /// Remove every record whose stored timestamp is strictly below `ts`.
    /// Backends without a time index treat this as a no-op.
    fn delete_before_timestamp(&self, ts: u64) -> Result<(), StoreError>;

    /// Release the bucket; with `clean` the namespace is destroyed.
    fn close(&self, clean: bool) -> Result<(), StoreError>;
}

/// A database that can hand out buckets.
pub trait Store: Send + Sync {
    fn bucket(&self, name: &str, codec: Arc<dyn Codec>) -> Result<Arc<dyn BatchBucket>, StoreError>;
}

/// Open the store selected by the configuration.
pub fn open(cfg: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match cfg.driver {
        Driver::Sqlite => Ok(Arc::new(sqlite::SqliteStore::open(&cfg.source)?)),
        Driver::Rocksdb => Ok(Arc::new(rocks::RocksStore::open(&cfg.source)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::QosLevel;

    #[test]
    fn bincode_codec_round_trips() {
        let codec = BincodeCodec;
        let mut msg = Message::new("dev/sensor", "21.5").with_qos(QosLevel::AtLeastOnce);
        msg.offset = 12;
        msg.flags = 0b01;

        let data = codec.encode(&msg).unwrap();
        let back = codec.decode(&data).unwrap();
        assert_eq!(back, msg);
        assert_eq!(codec.timestamp_of(&data).unwrap(), msg.timestamp);
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = BincodeCodec;
        assert!(codec.decode(&[0xff, 0x01]).is_err());
    }
}
