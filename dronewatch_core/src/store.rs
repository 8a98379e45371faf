//! Record stores implementing [`RecordSink`].
//!
//! - `SledRecordStore`: embedded key-value database, one tree per table
//! - `MemoryStore`: in-process maps for tests and simulation

use dronewatch_env::{CartesianRecord, EnvError, ProximityRecord, RawRecord, RecordSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::config::StoreConfig;

// ============================================================================
// SLED STORE
// ============================================================================

/// Sled-backed persistent store.
///
/// Values are JSON-encoded records under their row keys.
pub struct SledRecordStore {
    db: sled::Db,
    raw: sled::Tree,
    cart: sled::Tree,
    prox: sled::Tree,
}

impl SledRecordStore {
    /// Opens (or creates) the store at `path` with the table names from `config`.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self, EnvError> {
        let db = sled::open(path)
            .map_err(|e| EnvError::storage(format!("Failed to open sled DB: {}", e)))?;
        Self::with_db(db, config)
    }

    /// Create a temporary store, removed on drop (for testing)
    pub fn open_temporary(config: &StoreConfig) -> Result<Self, EnvError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| EnvError::storage(format!("Failed to open temp DB: {}", e)))?;
        Self::with_db(db, config)
    }

    fn with_db(db: sled::Db, config: &StoreConfig) -> Result<Self, EnvError> {
        let tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| EnvError::storage(format!("Failed to open table {}: {}", name, e)))
        };

        Ok(Self {
            raw: tree(&config.raw_table)?,
            cart: tree(&config.cart_table)?,
            prox: tree(&config.prox_table)?,
            db,
        })
    }

    /// Flushes dirty pages to disk, returning the number of bytes written.
    pub fn flush(&self) -> Result<usize, EnvError> {
        self.db
            .flush()
            .map_err(|e| EnvError::storage(format!("Flush failed: {}", e)))
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    pub fn cart_len(&self) -> usize {
        self.cart.len()
    }

    pub fn prox_len(&self) -> usize {
        self.prox.len()
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<RawRecord>, EnvError> {
        get_json(&self.raw, key)
    }

    pub fn get_cartesian(&self, key: &str) -> Result<Option<CartesianRecord>, EnvError> {
        get_json(&self.cart, key)
    }

    pub fn get_proximity(&self, key: &str) -> Result<Option<ProximityRecord>, EnvError> {
        get_json(&self.prox, key)
    }
}

fn put_json<T: Serialize>(tree: &sled::Tree, key: &str, record: &T) -> Result<(), EnvError> {
    let bytes = serde_json::to_vec(record)
        .map_err(|e| EnvError::storage(format!("Encode failed: {}", e)))?;
    tree.insert(key.as_bytes(), bytes)
        .map_err(|e| EnvError::storage(format!("Insert failed: {}", e)))?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>, EnvError> {
    let Some(bytes) = tree
        .get(key.as_bytes())
        .map_err(|e| EnvError::storage(format!("Lookup failed: {}", e)))?
    else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| EnvError::storage(format!("Decode failed: {}", e)))
}

impl RecordSink for SledRecordStore {
    fn put_raw(&self, record: &RawRecord) -> Result<(), EnvError> {
        put_json(&self.raw, &record.key(), record)
    }

    fn put_cartesian(&self, record: &CartesianRecord) -> Result<(), EnvError> {
        put_json(&self.cart, &record.key(), record)
    }

    fn put_proximity(&self, record: &ProximityRecord) -> Result<(), EnvError> {
        put_json(&self.prox, &record.key(), record)
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-memory store with optional failure injection.
#[derive(Default)]
pub struct MemoryStore {
    raw: Mutex<BTreeMap<String, RawRecord>>,
    cart: Mutex<BTreeMap<String, CartesianRecord>>,
    prox: Mutex<BTreeMap<String, ProximityRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every write fails with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), EnvError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnvError::storage("injected write failure"));
        }
        Ok(())
    }

    pub fn raw_len(&self) -> usize {
        lock(&self.raw).len()
    }

    pub fn cart_len(&self) -> usize {
        lock(&self.cart).len()
    }

    pub fn prox_len(&self) -> usize {
        lock(&self.prox).len()
    }

    pub fn raw(&self, key: &str) -> Option<RawRecord> {
        lock(&self.raw).get(key).cloned()
    }

    pub fn cartesian(&self, key: &str) -> Option<CartesianRecord> {
        lock(&self.cart).get(key).cloned()
    }

    /// All proximity rows in key order.
    pub fn proximity_records(&self) -> Vec<ProximityRecord> {
        lock(&self.prox).values().cloned().collect()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordSink for MemoryStore {
    fn put_raw(&self, record: &RawRecord) -> Result<(), EnvError> {
        self.check()?;
        lock(&self.raw).insert(record.key(), record.clone());
        Ok(())
    }

    fn put_cartesian(&self, record: &CartesianRecord) -> Result<(), EnvError> {
        self.check()?;
        lock(&self.cart).insert(record.key(), record.clone());
        Ok(())
    }

    fn put_proximity(&self, record: &ProximityRecord) -> Result<(), EnvError> {
        self.check()?;
        lock(&self.prox).insert(record.key(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawRecord {
        RawRecord {
            uid: "a1".into(),
            dronetime: "20240101".into(),
            altitude: 100.0,
            latitude: 37.0,
            longitude: -122.0,
        }
    }

    fn prox(uid1: &str) -> ProximityRecord {
        ProximityRecord {
            uid0: "a1".into(),
            uid1: uid1.into(),
            datetime: "20240101000000000000".into(),
            dx: 1.0,
            dy: 2.0,
            dz: 2.0,
            dr: 3.0,
        }
    }

    #[test]
    fn test_sled_store_round_trip() {
        let store = SledRecordStore::open_temporary(&StoreConfig::default()).unwrap();

        store.put_raw(&raw()).unwrap();
        store.put_proximity(&prox("b2")).unwrap();
        store.put_proximity(&prox("c3")).unwrap();

        assert_eq!(store.raw_len(), 1);
        assert_eq!(store.cart_len(), 0);
        assert_eq!(store.prox_len(), 2);
        assert_eq!(store.get_raw("a120240101").unwrap(), Some(raw()));
        assert_eq!(
            store.get_proximity("a1b220240101000000000000").unwrap(),
            Some(prox("b2"))
        );
        assert_eq!(store.get_cartesian("missing").unwrap(), None);
    }

    #[test]
    fn test_sled_store_same_key_overwrites() {
        let store = SledRecordStore::open_temporary(&StoreConfig::default()).unwrap();
        let mut record = raw();
        store.put_raw(&record).unwrap();
        record.altitude = 250.0;
        store.put_raw(&record).unwrap();

        assert_eq!(store.raw_len(), 1);
        assert_eq!(store.get_raw(&record.key()).unwrap().unwrap().altitude, 250.0);
    }

    #[test]
    fn test_sled_store_flush() {
        let store = SledRecordStore::open_temporary(&StoreConfig::default()).unwrap();
        store.put_raw(&raw()).unwrap();
        assert!(store.flush().is_ok());
    }

    #[test]
    fn test_memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.put_raw(&raw()).unwrap();

        store.set_failing(true);
        assert!(matches!(store.put_proximity(&prox("b2")), Err(EnvError::StorageError(_))));
        assert_eq!(store.prox_len(), 0);

        store.set_failing(false);
        store.put_proximity(&prox("b2")).unwrap();
        assert_eq!(store.proximity_records(), vec![prox("b2")]);
        assert_eq!(store.raw("a120240101"), Some(raw()));
    }
}
