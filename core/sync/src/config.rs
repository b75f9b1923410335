//! Widget configuration and the generation-driven config loader.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use dripsync_common::{Error, Result, SlotKey, UtcMillis};
use dripsync_store::CursorStore;

use crate::clock::Clock;

/// User-facing widget options, shared with the companion app.
///
/// Every option defaults to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    /// Suspend scheduling entirely.
    pub disable_updates: bool,
    /// Emit per-tick decision logs.
    pub show_log: bool,
}

impl WidgetConfig {
    /// Serialize to the JSON stored in the config slot.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from the config slot. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTimings {
    /// Period of the scheduler tick.
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    /// Time since the last attempt after which a retry is forced.
    #[serde(with = "millis")]
    pub stale_time: Duration,
    /// Maximum age of the data itself before a refresh is due.
    #[serde(with = "millis")]
    pub update_interval: Duration,
    /// Bound on a single request/response exchange.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            stale_time: Duration::from_secs(60),
            update_interval: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncTimings {
    /// Set the tick period.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the staleness threshold.
    pub fn with_stale_time(mut self, stale: Duration) -> Self {
        self.stale_time = stale;
        self
    }

    /// Set the freshness window.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Staleness threshold in milliseconds.
    pub fn stale_ms(&self) -> i64 {
        duration_ms(self.stale_time)
    }

    /// Freshness window in milliseconds.
    pub fn update_interval_ms(&self) -> i64 {
        duration_ms(self.update_interval)
    }

    /// Check the timings are usable.
    ///
    /// # Errors
    /// - Zero tick interval (tokio intervals panic on it)
    /// - Zero request timeout
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::InvalidInput(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "request timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// What a config check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// Generation marker unchanged, cached config kept.
    Unchanged,
    /// Config re-read from the store.
    Reloaded,
    /// Config was absent or corrupt; defaults written back.
    Defaulted,
}

/// Write a config blob and advance its generation marker.
///
/// This is what any writer (the widget or the companion) must do so that
/// other readers notice the change. The marker never moves backwards, even
/// if two writes land in the same millisecond.
pub fn publish_config(
    store: &dyn CursorStore,
    config: &WidgetConfig,
    now: UtcMillis,
) -> Result<UtcMillis> {
    let previous = store.get_int(SlotKey::ConfigLastUpdate)?;
    let generation = match previous {
        Some(previous) if previous >= now => previous.saturating_add(1),
        _ => now,
    };

    store.set_string(SlotKey::ConfigBlob, &config.to_json()?)?;
    store.set_int(SlotKey::ConfigLastUpdate, generation)?;
    Ok(generation)
}

/// Lazily reloads the widget config when its generation marker moves.
///
/// No TTL: the store is only re-read when the marker read from the store
/// differs from the last one seen.
pub struct ConfigLoader {
    store: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    /// Last generation marker seen. `None` until the first check; the inner
    /// `None` records an absent marker.
    seen_generation: Option<Option<UtcMillis>>,
    config: WidgetConfig,
}

impl ConfigLoader {
    /// Create a loader. Nothing is read until the first check.
    pub fn new(store: Arc<dyn CursorStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            seen_generation: None,
            config: WidgetConfig::default(),
        }
    }

    /// Currently applied config.
    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    /// Re-read the config if its generation marker changed.
    pub fn check_for_update(&mut self) -> ConfigChange {
        let generation = match self.store.get_int(SlotKey::ConfigLastUpdate) {
            Ok(generation) => generation,
            Err(e) => {
                warn!("Config generation unreadable, keeping current config: {}", e);
                return ConfigChange::Unchanged;
            }
        };

        if self.seen_generation == Some(generation) {
            return ConfigChange::Unchanged;
        }

        debug!(
            "Config generation changed: {:?} -> {:?}",
            self.seen_generation.flatten(),
            generation
        );
        self.seen_generation = Some(generation);
        self.reload()
    }

    /// Read the config blob unconditionally.
    pub fn reload(&mut self) -> ConfigChange {
        let blob = match self.store.get_string(SlotKey::ConfigBlob) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Config blob unreadable, keeping current config: {}", e);
                // Force a re-read on the next check.
                self.seen_generation = None;
                return ConfigChange::Unchanged;
            }
        };

        let Some(blob) = blob else {
            info!("No config stored, writing defaults");
            self.reset_to_defaults();
            return ConfigChange::Defaulted;
        };

        match WidgetConfig::from_json(&blob) {
            Ok(config) => {
                debug!("Loaded config: {:?}", config);
                self.config = config;
                ConfigChange::Reloaded
            }
            Err(e) => {
                warn!("{}; falling back to defaults", e);
                self.reset_to_defaults();
                ConfigChange::Defaulted
            }
        }
    }

    fn reset_to_defaults(&mut self) {
        self.config = WidgetConfig::default();
        match publish_config(self.store.as_ref(), &self.config, self.clock.now()) {
            Ok(generation) => self.seen_generation = Some(Some(generation)),
            Err(e) => warn!("Failed to persist default config: {}", e),
        }
    }
}
