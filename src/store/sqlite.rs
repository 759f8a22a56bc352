//! Relational bucket backend on sqlite.
//!
//! One table per bucket: `offset` is the primary key, `ts` carries the
//! record timestamp and is indexed so age-based truncation is a ranged
//! delete rather than a scan. Batch appends run inside one transaction;
//! any conflict rolls the whole batch back.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::{BatchBucket, Codec, RecordVisitor, Store, StoreError};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(source: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(source).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(source)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl Store for SqliteStore {
    fn bucket(&self, name: &str, codec: Arc<dyn Codec>) -> Result<Arc<dyn BatchBucket>, StoreError> {
        let table = quote_ident(name);
        let index = quote_ident(&format!("{name}_ts_idx"));
        {
            let conn = self.conn.lock();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     offset INTEGER PRIMARY KEY,
                     ts     INTEGER NOT NULL,
                     value  BLOB    NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS {index} ON {table} (ts);"
            ))?;
        }
        Ok(Arc::new(SqliteBucket {
            conn: Arc::clone(&self.conn),
            table,
            codec,
        }))
    }
}

pub struct SqliteBucket {
    conn: Arc<Mutex<Connection>>,
    /// Quoted table identifier, safe to splice into statements.
    table: String,
    codec: Arc<dyn Codec>,
}

impl BatchBucket for SqliteBucket {
    fn put(&self, begin: u64, records: &[Bytes]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (offset, ts, value) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            let mut offset = begin;
            for record in records {
                let ts = self.codec.timestamp_of(record)?;
                stmt.execute(params![offset as i64, ts as i64, record.as_ref()])?;
                offset += 1;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, begin: u64, end: u64, visit: &mut RecordVisitor<'_>) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT offset, value FROM {} WHERE offset >= ?1 AND offset < ?2 ORDER BY offset",
            self.table
        ))?;
        let mut rows = stmt.query(params![begin as i64, end as i64])?;
        while let Some(row) = rows.next()? {
            let offset: i64 = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(offset as u64, &value)?;
        }
        Ok(())
    }

    fn min_offset(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let min: Option<i64> = conn.query_row(
            &format!("SELECT MIN(offset) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(min.unwrap_or(0) as u64)
    }

    fn max_offset(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let max: Option<i64> = conn.query_row(
            &format!("SELECT MAX(offset) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0) as u64)
    }

    fn delete_before(&self, id: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("DELETE FROM {} WHERE offset < ?1", self.table),
            params![id as i64],
        )?;
        Ok(())
    }

    fn delete_before_timestamp(&self, ts: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!("DELETE FROM {} WHERE ts < ?1", self.table),
            params![ts as i64],
        )?;
        Ok(())
    }

    fn close(&self, clean: bool) -> Result<(), StoreError> {
        if clean {
            let conn = self.conn.lock();
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", self.table))?;
        }
        Ok(())
    }
}

/// Double-quote an identifier so arbitrary session names are valid table
/// names.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
