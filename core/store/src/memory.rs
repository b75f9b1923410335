//! In-memory cursor store for testing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dripsync_common::{Error, Result, SlotKey};

use crate::store::{CursorStore, SlotValue};

/// In-memory cursor store.
///
/// Clones share the same slots, so a test can hold one clone as the
/// "companion process" and hand another to the sync client.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<RwLock<HashMap<SlotKey, SlotValue>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Check if no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> Error {
        Error::Store("memory store lock poisoned".to_string())
    }
}

impl CursorStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: SlotKey) -> Result<Option<SlotValue>> {
        let slots = self.slots.read().map_err(|_| Self::poisoned())?;
        Ok(slots.get(&key).cloned())
    }

    fn set(&self, key: SlotKey, value: SlotValue) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Self::poisoned())?;
        slots.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: SlotKey) -> Result<()> {
        let mut slots = self.slots.write().map_err(|_| Self::poisoned())?;
        slots.remove(&key);
        Ok(())
    }
}
