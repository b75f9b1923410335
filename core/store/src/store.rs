//! Cursor store trait definition.

use serde::{Deserialize, Serialize};

use dripsync_common::{Error, Result, SlotKey};

/// Value held by a single slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    /// 64-bit integer slot.
    Int(i64),
    /// String slot.
    Str(String),
}

impl SlotValue {
    /// Interpret the value as an integer slot.
    pub fn into_int(self, key: SlotKey) -> Result<i64> {
        match self {
            SlotValue::Int(value) => Ok(value),
            SlotValue::Str(_) => Err(Error::Store(format!("Slot {} holds a string", key))),
        }
    }

    /// Interpret the value as a string slot.
    pub fn into_string(self, key: SlotKey) -> Result<String> {
        match self {
            SlotValue::Str(value) => Ok(value),
            SlotValue::Int(_) => Err(Error::Store(format!("Slot {} holds an integer", key))),
        }
    }
}

/// Durable named-slot store shared with the companion and host processes.
///
/// Implementations must never cache reads: another process may write any
/// slot at any time, and the sync client relies on re-reading to notice.
pub trait CursorStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Read a raw slot value.
    fn get(&self, key: SlotKey) -> Result<Option<SlotValue>>;

    /// Write a raw slot value, replacing whatever was there.
    fn set(&self, key: SlotKey, value: SlotValue) -> Result<()>;

    /// Remove a slot. Removing an absent slot is not an error.
    fn remove(&self, key: SlotKey) -> Result<()>;

    /// Read an integer slot.
    ///
    /// # Errors
    /// - The slot holds a string
    /// - Backend read failure
    fn get_int(&self, key: SlotKey) -> Result<Option<i64>> {
        self.get(key)?.map(|value| value.into_int(key)).transpose()
    }

    /// Write an integer slot.
    fn set_int(&self, key: SlotKey, value: i64) -> Result<()> {
        self.set(key, SlotValue::Int(value))
    }

    /// Read a string slot.
    ///
    /// # Errors
    /// - The slot holds an integer
    /// - Backend read failure
    fn get_string(&self, key: SlotKey) -> Result<Option<String>> {
        self.get(key)?.map(|value| value.into_string(key)).transpose()
    }

    /// Write a string slot.
    fn set_string(&self, key: SlotKey, value: &str) -> Result<()> {
        self.set(key, SlotValue::Str(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_value_json_shape() {
        let int: SlotValue = serde_json::from_str("42").unwrap();
        assert_eq!(int, SlotValue::Int(42));

        let text: SlotValue = serde_json::from_str("\"{\\\"bg\\\":1}\"").unwrap();
        assert_eq!(text, SlotValue::Str("{\"bg\":1}".to_string()));
    }

    #[test]
    fn test_slot_value_type_mismatch() {
        let err = SlotValue::Str("x".to_string())
            .into_int(SlotKey::InfoLastUpdate)
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));

        let err = SlotValue::Int(1).into_string(SlotKey::InfoBlob).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }
}
