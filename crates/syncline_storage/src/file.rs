//! File-based key-value store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{KeyValueStore, WriteOptions};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const VALUE_EXTENSION: &str = "val";
const TEMP_EXTENSION: &str = "tmp";

/// A directory-backed key-value store.
///
/// Each key maps to one file inside the store directory. Values survive
/// process restarts.
///
/// # Durability
///
/// - `set` writes to a temporary file, calls `File::sync_all()`, then
///   renames it over the previous value, so a crash leaves either the old
///   or the new value, never a torn one
/// - File names are the hex encoding of the key, so any key is valid
///
/// # Example
///
/// ```no_run
/// use syncline_storage::{FileStore, KeyValueStore, WriteOptions};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("sync-data")).unwrap();
/// store.set("queue", b"{}", WriteOptions::default()).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let name: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        Ok(self.dir.join(format!("{name}.{VALUE_EXTENSION}")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.value_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8], options: WriteOptions) -> StorageResult<()> {
        if options.encrypt {
            return Err(StorageError::EncryptionUnavailable);
        }

        let path = self.value_path(key)?;
        let temp_path = path.with_extension(TEMP_EXTENSION);

        let _guard = self.write_lock.lock();
        {
            let mut file: File = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.value_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
