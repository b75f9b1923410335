//! Typed view over the durable sync cursor.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use dripsync_common::{Result, SlotKey, UtcMillis};
use dripsync_store::CursorStore;

/// Everything the cursor slots currently hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CursorSnapshot {
    pub info_blob: Option<String>,
    pub info_last_update: Option<UtcMillis>,
    pub config_blob: Option<String>,
    pub config_last_update: Option<UtcMillis>,
}

/// Read/write access to the data half of the cursor.
///
/// Nothing is cached here; every read hits the store so that writes by
/// the companion process are seen immediately.
#[derive(Clone)]
pub struct Cursor {
    store: Arc<dyn CursorStore>,
}

impl Cursor {
    /// Wrap a store.
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Time the payload was last durably written.
    ///
    /// A stored zero means the same as an absent slot: nothing was ever
    /// fetched.
    pub fn info_last_update(&self) -> Result<Option<UtcMillis>> {
        Ok(self
            .store
            .get_int(SlotKey::InfoLastUpdate)?
            .filter(|&ts| ts != 0))
    }

    /// Last raw payload.
    pub fn info_blob(&self) -> Result<Option<String>> {
        self.store.get_string(SlotKey::InfoBlob)
    }

    /// Persist a payload fetched at `now`.
    ///
    /// The blob is written before its timestamp so a reader that sees the
    /// new timestamp also sees the new blob. The timestamp never moves
    /// backwards: if another writer already stored a later one, that value
    /// is kept and returned.
    pub fn save_info(&self, blob: &str, now: UtcMillis) -> Result<UtcMillis> {
        self.store.set_string(SlotKey::InfoBlob, blob)?;

        let current = self.info_last_update()?.unwrap_or(0);
        let written_at = now.max(current);
        self.store.set_int(SlotKey::InfoLastUpdate, written_at)?;

        debug!("Saved info payload ({} bytes) at {}", blob.len(), written_at);
        Ok(written_at)
    }

    /// Read every slot.
    pub fn snapshot(&self) -> Result<CursorSnapshot> {
        Ok(CursorSnapshot {
            info_blob: self.store.get_string(SlotKey::InfoBlob)?,
            info_last_update: self.store.get_int(SlotKey::InfoLastUpdate)?,
            config_blob: self.store.get_string(SlotKey::ConfigBlob)?,
            config_last_update: self.store.get_int(SlotKey::ConfigLastUpdate)?,
        })
    }

    /// Remove every slot, data and config alike.
    pub fn clear(&self) -> Result<()> {
        for key in SlotKey::ALL {
            self.store.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dripsync_store::MemoryStore;

    fn cursor() -> (Cursor, MemoryStore) {
        let store = MemoryStore::new();
        (Cursor::new(Arc::new(store.clone())), store)
    }

    #[test]
    fn test_zero_timestamp_reads_as_absent() {
        let (cursor, store) = cursor();
        assert_eq!(cursor.info_last_update().unwrap(), None);

        store.set_int(SlotKey::InfoLastUpdate, 0).unwrap();
        assert_eq!(cursor.info_last_update().unwrap(), None);

        store.set_int(SlotKey::InfoLastUpdate, 42).unwrap();
        assert_eq!(cursor.info_last_update().unwrap(), Some(42));
    }

    #[test]
    fn test_save_info_writes_blob_and_time() {
        let (cursor, _store) = cursor();

        let written = cursor.save_info("{\"bg\":1}", 10_000).unwrap();
        assert_eq!(written, 10_000);
        assert_eq!(cursor.info_blob().unwrap().as_deref(), Some("{\"bg\":1}"));
        assert_eq!(cursor.info_last_update().unwrap(), Some(10_000));
    }

    #[test]
    fn test_save_info_never_rolls_back() {
        let (cursor, store) = cursor();
        store.set_int(SlotKey::InfoLastUpdate, 50_000).unwrap();

        let written = cursor.save_info("{}", 40_000).unwrap();
        assert_eq!(written, 50_000);
        assert_eq!(cursor.info_last_update().unwrap(), Some(50_000));
    }

    #[test]
    fn test_snapshot_and_clear() {
        let (cursor, store) = cursor();
        cursor.save_info("{}", 1).unwrap();
        store.set_string(SlotKey::ConfigBlob, "{}").unwrap();
        store.set_int(SlotKey::ConfigLastUpdate, 2).unwrap();

        let snapshot = cursor.snapshot().unwrap();
        assert_eq!(snapshot.info_last_update, Some(1));
        assert_eq!(snapshot.config_last_update, Some(2));

        cursor.clear().unwrap();
        assert_eq!(cursor.snapshot().unwrap(), CursorSnapshot::default());
        assert!(store.is_empty());
    }
}
