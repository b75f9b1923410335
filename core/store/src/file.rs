//! JSON file cursor store.

use fd_lock::RwLock;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use dripsync_common::{Error, Result, SlotKey};

use crate::store::{CursorStore, SlotValue};

/// On-disk slot map, keyed by stable slot name.
///
/// Entries this build does not know about are kept as-is so that newer
/// writers sharing the file do not lose data.
type SlotMap = BTreeMap<String, SlotValue>;

/// Cursor store backed by a single JSON file.
///
/// Every read goes to disk, so writes made by another process sharing
/// the file are observed on the next access. Writers serialize on an
/// advisory lock held on a `<file>.lock` sidecar; readers take no lock
/// since the data file is only ever replaced by rename.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open a file store at the given path.
    ///
    /// # Postconditions
    /// - Parent directory is created if it doesn't exist
    /// - The file itself is created lazily on first write
    ///
    /// # Errors
    /// - Permission denied creating the parent directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { path })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SlotMap> {
        if !self.path.exists() {
            return Ok(SlotMap::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(SlotMap::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            warn!("Cursor file {} is corrupt: {}", self.path.display(), e);
            Error::Store(format!("corrupt cursor file: {}", e))
        })
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Write the map to a fresh temp file next to the target and rename it
    /// into place so a concurrent reader never sees a half-written file.
    fn save(&self, slots: &SlotMap) -> Result<()> {
        let json = serde_json::to_string_pretty(slots)?;
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Load, change and save under the writer lock.
    fn modify(&self, f: impl FnOnce(&mut SlotMap)) -> Result<()> {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write()?;

        let mut slots = self.load()?;
        f(&mut slots);
        self.save(&slots)
    }
}

impl CursorStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: SlotKey) -> Result<Option<SlotValue>> {
        Ok(self.load()?.remove(key.as_str()))
    }

    fn set(&self, key: SlotKey, value: SlotValue) -> Result<()> {
        debug!("Writing slot {} to {}", key, self.path.display());
        self.modify(|slots| {
            slots.insert(key.as_str().to_string(), value);
        })
    }

    fn remove(&self, key: SlotKey) -> Result<()> {
        self.modify(|slots| {
            slots.remove(key.as_str());
        })
    }
}
