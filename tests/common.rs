use std::sync::Arc;
use std::sync::Once;

use duramq::config::{Driver, StoreConfig};
use duramq::store::{self, BincodeCodec, Codec, Store};
use tempfile::TempDir;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Keep the writer guard alive for the whole test process.
        std::mem::forget(duramq::logging::init_logging());
    });
}

#[allow(dead_code)]
pub fn sqlite_store(dir: &TempDir) -> Arc<dyn Store> {
    store::open(&StoreConfig {
        driver: Driver::Sqlite,
        source: dir.path().join("queue.db").to_string_lossy().into_owned(),
    })
    .expect("failed to open sqlite store")
}

#[allow(dead_code)]
pub fn rocks_store(dir: &TempDir) -> Arc<dyn Store> {
    store::open(&StoreConfig {
        driver: Driver::Rocksdb,
        source: dir.path().join("rocks").to_string_lossy().into_owned(),
    })
    .expect("failed to open rocksdb store")
}

#[allow(dead_code)]
pub fn codec() -> Arc<dyn Codec> {
    Arc::new(BincodeCodec)
}
