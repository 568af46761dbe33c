//! In-process store, used for ephemeral nodes and tests.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{StorageError, Store};

/// Holds the serialized snapshot in memory.
///
/// Values go through serde_json like the durable stores do, so a reload
/// observes exactly what a file reload would. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `value`
    pub fn with_value<T: Serialize>(value: &T) -> Result<Self, StorageError> {
        let store = Self::new();
        *store.bytes.lock() = Some(serde_json::to_vec(value)?);
        Ok(store)
    }

    /// Make subsequent saves fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl<T> Store<T> for MemoryStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self) -> Result<Option<T>, StorageError> {
        match self.bytes.lock().as_deref() {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    location: "memory".to_string(),
                    source,
                }),
        }
    }

    fn save(&self, value: &T) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "writes disabled").into());
        }
        let encoded = serde_json::to_vec(value)?;
        *self.bytes.lock() = Some(encoded);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
