//! Durable whole-snapshot persistence for the directory, liveness and
//! broadcast stores.
//!
//! A [`Store`] knows how to load and save one serialized value. A
//! [`Snapshot`] sits on top of a store, keeps the last committed value in
//! memory and serializes every load-mutate-save cycle behind one writer
//! lock, so concurrent callers never lose each other's updates.

mod file;
mod memory;
mod tree;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use tree::SledStore;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Snapshot at {location} is unreadable: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to replace {location}: {source}")]
    Persist {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load-whole / save-whole persistence for a single value.
///
/// `load` returns `Ok(None)` only when nothing has been stored yet; a stored
/// value that cannot be decoded is an error.
pub trait Store<T>: Send + Sync {
    fn load(&self) -> Result<Option<T>, StorageError>;

    fn save(&self, value: &T) -> Result<(), StorageError>;

    /// Human-readable location for logs and errors
    fn location(&self) -> String;
}

/// Result of a mutation closure: whether the new value should be written.
pub enum Commit<R> {
    /// Persist the mutated value and return `R`
    Save(R),
    /// Drop the mutated value; nothing is written
    Discard(R),
}

/// Cached, write-serialized view over a [`Store`].
pub struct Snapshot<T> {
    store: Box<dyn Store<T>>,
    current: RwLock<T>,
    writer: Mutex<()>,
}

impl<T> Snapshot<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + Send + Sync,
{
    /// Load the stored value, or start from `T::default()` if none exists
    pub fn open(store: Box<dyn Store<T>>) -> Result<Self, StorageError> {
        let current = match store.load()? {
            Some(value) => {
                debug!("Loaded snapshot from {}", store.location());
                value
            }
            None => {
                info!("No snapshot at {}, starting empty", store.location());
                T::default()
            }
        };

        Ok(Self {
            store,
            current: RwLock::new(current),
            writer: Mutex::new(()),
        })
    }

    /// Read from the last committed value
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let current = self.current.read();
        f(&*current)
    }

    /// Run one serialized load-mutate-save cycle.
    ///
    /// The closure works on a copy; the in-memory value is replaced only
    /// after the store accepted the write.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> Commit<R>) -> Result<R, StorageError> {
        let _guard = self.writer.lock();

        let mut next = self.current.read().clone();
        match f(&mut next) {
            Commit::Discard(result) => Ok(result),
            Commit::Save(result) => {
                self.store.save(&next)?;
                *self.current.write() = next;
                Ok(result)
            }
        }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }
}

/// Which durable backend the stores are opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// One pretty-printed JSON file per store
    #[default]
    Json,
    /// One sled tree per store inside a shared database
    Sled,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sled" => Ok(Self::Sled),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Opens named stores on one backend
pub enum Backend {
    Json { dir: PathBuf },
    Sled { db: sled::Db },
    Memory,
}

impl Backend {
    /// Open or create the backend rooted at `data_dir`
    pub fn open(kind: BackendKind, data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let backend = match kind {
            BackendKind::Json => Self::Json { dir },
            BackendKind::Sled => Self::Sled {
                db: sled::open(dir.join("spark-echo.sled"))?,
            },
        };

        info!("💾 Storage opened ({:?}) at {}", kind, data_dir.as_ref().display());
        Ok(backend)
    }

    /// A store for `name` (e.g. `members`), typed by its value
    pub fn store<T>(&self, name: &str) -> Result<Box<dyn Store<T>>, StorageError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let store: Box<dyn Store<T>> = match self {
            Self::Json { dir } => Box::new(JsonFileStore::new(dir.join(format!("{}.json", name)))),
            Self::Sled { db } => Box::new(SledStore::open(db, name)?),
            Self::Memory => Box::new(MemoryStore::new()),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_open_absent_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        let snapshot: Snapshot<Vec<String>> = Snapshot::open(Box::new(store)).unwrap();

        assert!(snapshot.read(|v| v.is_empty()));
    }

    #[test]
    fn test_open_corrupt_store_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result: Result<Snapshot<Vec<String>>, _> =
            Snapshot::open(Box::new(JsonFileStore::new(&path)));
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn test_discard_does_not_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("values.json");
        let snapshot: Snapshot<Vec<u32>> =
            Snapshot::open(Box::new(JsonFileStore::new(&path))).unwrap();

        let n = snapshot
            .mutate(|v| {
                v.push(1);
                Commit::Discard(v.len())
            })
            .unwrap();

        assert_eq!(n, 1);
        assert!(snapshot.read(|v| v.is_empty()));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_save_keeps_previous_value() {
        let store = MemoryStore::new();
        let handle = store.clone();
        let snapshot: Snapshot<Vec<u32>> = Snapshot::open(Box::new(store)).unwrap();

        snapshot
            .mutate(|v| {
                v.push(1);
                Commit::Save(())
            })
            .unwrap();
        handle.fail_writes(true);

        let result = snapshot.mutate(|v| {
            v.push(2);
            Commit::Save(())
        });
        assert!(result.is_err());
        assert_eq!(snapshot.read(|v| v.clone()), vec![1]);
    }

    #[test]
    fn test_concurrent_mutations_are_serialized() {
        let dir = tempdir().unwrap();
        let snapshot: Arc<Snapshot<Vec<u32>>> = Arc::new(
            Snapshot::open(Box::new(JsonFileStore::new(dir.path().join("c.json")))).unwrap(),
        );

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let snapshot = snapshot.clone();
                thread::spawn(move || {
                    snapshot
                        .mutate(|v| {
                            v.push(i);
                            Commit::Save(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(snapshot.read(|v| v.len()), 16);

        let reopened: Snapshot<Vec<u32>> =
            Snapshot::open(Box::new(JsonFileStore::new(dir.path().join("c.json")))).unwrap();
        assert_eq!(reopened.read(|v| v.len()), 16);
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("json".parse::<BackendKind>().unwrap(), BackendKind::Json);
        assert_eq!(" SLED ".parse::<BackendKind>().unwrap(), BackendKind::Sled);
        assert!("redis".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_sled_backend_roundtrip() {
        let dir = tempdir().unwrap();
        {
            let backend = Backend::open(BackendKind::Sled, dir.path()).unwrap();
            let snapshot: Snapshot<Vec<String>> =
                Snapshot::open(backend.store("members").unwrap()).unwrap();
            snapshot
                .mutate(|v| {
                    v.push("alpha".to_string());
                    Commit::Save(())
                })
                .unwrap();
        }

        let backend = Backend::open(BackendKind::Sled, dir.path()).unwrap();
        let snapshot: Snapshot<Vec<String>> =
            Snapshot::open(backend.store("members").unwrap()).unwrap();
        assert_eq!(snapshot.read(|v| v.clone()), vec!["alpha".to_string()]);
    }
}
