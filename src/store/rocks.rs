//! KV bucket backend on rocksdb.
//!
//! One column family per bucket; keys are 8-byte big-endian offsets so the
//! default comparator yields offset order. Appends go through an atomic
//! `WriteBatch`, prefix truncation is a range delete, and a clean close
//! drops the column family. There is no secondary time index, so
//! `delete_before_timestamp` is a no-op and expiry falls back to prefix
//! deletion driven by the queue.

use std::sync::Arc;

use bytes::Bytes;
use rocksdb::{
    BoundColumnFamily, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
    WriteBatch,
};

use super::{BatchBucket, Codec, RecordVisitor, Store, StoreError};

type Db = DBWithThreadMode<MultiThreaded>;

pub struct RocksStore {
    db: Arc<Db>,
}

impl RocksStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let existing = Db::list_cf(&opts, path).unwrap_or_default();
        let db = if existing.is_empty() {
            Db::open(&opts, path)?
        } else {
            Db::open_cf(&opts, path, existing)?
        };
        Ok(RocksStore { db: Arc::new(db) })
    }
}

impl Store for RocksStore {
    fn bucket(&self, name: &str, _codec: Arc<dyn Codec>) -> Result<Arc<dyn BatchBucket>, StoreError> {
        if self.db.cf_handle(name).is_none() {
            self.db.create_cf(name, &Options::default())?;
        }
        Ok(Arc::new(RocksBucket {
            db: Arc::clone(&self.db),
            name: name.to_string(),
        }))
    }
}

pub struct RocksBucket {
    db: Arc<Db>,
    name: String,
}

impl RocksBucket {
    fn cf(&self) -> Result<Arc<BoundColumnFamily<'_>>, StoreError> {
        self.db
            .cf_handle(&self.name)
            .ok_or_else(|| StoreError::MissingBucket(self.name.clone()))
    }

    fn be_u64(bytes: &[u8]) -> Result<u64, StoreError> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StoreError::KeyDecode(format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(u64::from_be_bytes(arr))
    }

    fn last_offset(&self) -> Result<Option<u64>, StoreError> {
        let cf = self.cf()?;
        let mut iter = self.db.iterator_cf(&cf, IteratorMode::End);
        match iter.next() {
            Some(pair) => {
                let (key, _) = pair?;
                Ok(Some(Self::be_u64(&key)?))
            }
            None => Ok(None),
        }
    }
}

impl BatchBucket for RocksBucket {
    fn put(&self, begin: u64, records: &[Bytes]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        // Appends are monotonic, so a tail at or past `begin` means the
        // batch would overwrite live offsets.
        if let Some(last) = self.last_offset()? {
            if last >= begin {
                return Err(StoreError::OffsetExists(begin));
            }
        }
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for (i, record) in records.iter().enumerate() {
            batch.put_cf(&cf, (begin + i as u64).to_be_bytes(), record);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn get(&self, begin: u64, end: u64, visit: &mut RecordVisitor<'_>) -> Result<(), StoreError> {
        let cf = self.cf()?;
        let start = begin.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));
        for pair in iter {
            let (key, value) = pair?;
            let offset = Self::be_u64(&key)?;
            if offset >= end {
                break;
            }
            visit(offset, &value)?;
        }
        Ok(())
    }

    fn min_offset(&self) -> Result<u64, StoreError> {
        let cf = self.cf()?;
        let mut iter = self.db.iterator_cf(&cf, IteratorMode::Start);
        match iter.next() {
            Some(pair) => {
                let (key, _) = pair?;
                Self::be_u64(&key)
            }
            None => Ok(0),
        }
    }

    fn max_offset(&self) -> Result<u64, StoreError> {
        Ok(self.last_offset()?.unwrap_or(0))
    }

    fn delete_before(&self, id: u64) -> Result<(), StoreError> {
        let cf = self.cf()?;
        self.db
            .delete_range_cf(&cf, 0u64.to_be_bytes(), id.to_be_bytes())?;
        Ok(())
    }

    fn delete_before_timestamp(&self, _ts: u64) -> Result<(), StoreError> {
        // No time index; the ack collector's prefix deletes and the
        // sweeper's cache trim still bound retention.
        Ok(())
    }

    fn close(&self, clean: bool) -> Result<(), StoreError> {
        if clean && self.db.cf_handle(&self.name).is_some() {
            self.db.drop_cf(&self.name)?;
        }
        Ok(())
    }
}
