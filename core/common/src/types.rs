//! Common types used throughout dripsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wall-clock time in UTC milliseconds since the Unix epoch.
///
/// The host clock and every timing threshold use this unit, so comparisons
/// never need conversion.
pub type UtcMillis = i64;

/// Milliseconds elapsed between `earlier` and `now`.
///
/// Saturates instead of overflowing when a slot holds a garbage value
/// written by another process.
pub fn elapsed_ms(now: UtcMillis, earlier: UtcMillis) -> i64 {
    now.saturating_sub(earlier)
}

/// Durable slot names shared with the companion and host processes.
///
/// Any writer may update these slots; the names are part of the
/// cross-process contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKey {
    /// Last raw payload received from the companion.
    InfoBlob,
    /// Time the payload was last durably written.
    InfoLastUpdate,
    /// Serialized widget config.
    ConfigBlob,
    /// Generation marker for the config blob.
    ConfigLastUpdate,
}

impl SlotKey {
    /// Every slot, in display order.
    pub const ALL: [SlotKey; 4] = [
        SlotKey::InfoBlob,
        SlotKey::InfoLastUpdate,
        SlotKey::ConfigBlob,
        SlotKey::ConfigLastUpdate,
    ];

    /// Stable storage name of the slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKey::InfoBlob => "dripsync.info",
            SlotKey::InfoLastUpdate => "dripsync.info_last_update",
            SlotKey::ConfigBlob => "dripsync.config",
            SlotKey::ConfigLastUpdate => "dripsync.config_last_update",
        }
    }

    /// Whether the slot holds an integer rather than a string.
    pub fn is_int(&self) -> bool {
        matches!(self, SlotKey::InfoLastUpdate | SlotKey::ConfigLastUpdate)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SlotKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        SlotKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown slot: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_names_are_unique() {
        let mut names: Vec<&str> = SlotKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SlotKey::ALL.len());
    }

    #[test]
    fn test_slot_parse() {
        let key: SlotKey = "dripsync.info_last_update".parse().unwrap();
        assert_eq!(key, SlotKey::InfoLastUpdate);
        assert!(key.is_int());
        assert!("dripsync.unknown".parse::<SlotKey>().is_err());
    }

    #[test]
    fn test_elapsed_saturates() {
        assert_eq!(elapsed_ms(1_000, 400), 600);
        assert_eq!(elapsed_ms(i64::MIN + 1, i64::MAX), i64::MIN);
        assert_eq!(elapsed_ms(i64::MAX, -5), i64::MAX);
    }
}
