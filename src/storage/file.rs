//! Pretty-printed JSON snapshot on the local filesystem.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, Permissions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{StorageError, Store};

/// One JSON document per store, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the replacement file should carry: the current target's, or
    /// 0644 for a first write. The temp file itself is created 0600.
    fn target_permissions(&self) -> Result<Option<Permissions>, StorageError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.permissions())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(default_permissions()),
            Err(e) => Err(e.into()),
        }
    }

    fn parent(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}

impl<T> Store<T> for JsonFileStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn load(&self) -> Result<Option<T>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                location: self.path.display().to_string(),
                source,
            })
    }

    fn save(&self, value: &T) -> Result<(), StorageError> {
        let dir = self.parent();
        fs::create_dir_all(&dir)?;

        // Write beside the target so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
        tmp.as_file_mut().write_all(b"\n")?;
        if let Some(perms) = self.target_permissions()? {
            tmp.as_file().set_permissions(perms)?;
        }
        tmp.as_file().sync_all()?;

        tmp.persist(&self.path).map_err(|e| StorageError::Persist {
            location: self.path.display().to_string(),
            source: e.error,
        })?;

        if let Ok(dir_file) = File::open(&dir) {
            let _ = dir_file.sync_all();
        }

        debug!("💾 Wrote {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
