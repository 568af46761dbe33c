//! Snapshot stored in a sled tree.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use super::{StorageError, Store};

const SNAPSHOT_KEY: &[u8] = b"snapshot";

/// One tree per store, holding the JSON snapshot under a single key.
/// sled replaces the value atomically, so no temp file is needed.
pub struct SledStore {
    name: String,
    tree: Tree,
}

impl SledStore {
    pub fn open(db: &Db, name: &str) -> Result<Self, StorageError> {
        let tree = db.open_tree(name)?;
        Ok(Self { name: name.to_string(), tree })
    }
}

impl<T> Store<T> for SledStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self) -> Result<Option<T>, StorageError> {
        match self.tree.get(SNAPSHOT_KEY)? {
            None => Ok(None),
            Some(value) => serde_json::from_slice(&value)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    location: Store::<T>::location(self),
                    source,
                }),
        }
    }

    fn save(&self, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec(value)?;
        self.tree.insert(SNAPSHOT_KEY, encoded)?;
        self.tree.flush()?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("sled tree '{}'", self.name)
    }
}
