//! dripsync Sync Client
//!
//! This module provides the widget-side synchronization client, including:
//! - Per-tick fetch decision driven by a durable cursor
//! - Single-flight request/response exchange with timeout
//! - Lazy, generation-driven config reload
//! - Host lifecycle wiring (resume, pause, destroy, companion launch)

pub mod clock;
pub mod config;
pub mod cursor;
pub mod launcher;
pub mod lifecycle;
pub mod loopback;
pub mod policy;
pub mod scheduler;
pub mod sink;
pub mod state;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{publish_config, ConfigChange, ConfigLoader, SyncTimings, WidgetConfig};
pub use cursor::{Cursor, CursorSnapshot};
pub use launcher::{AlarmId, CompanionLauncher, LaunchRequest, TimerLauncher};
pub use lifecycle::LifecycleAdapter;
pub use loopback::{loopback, Companion, CompanionHandler, LinkControl, LoopbackTransport};
pub use policy::{Decision, FetchReason, SkipReason};
pub use scheduler::{Fetch, FetchOutcome, SyncScheduler, Tick};
pub use sink::{DataSink, InfoPayload, LatestPayload};
pub use state::SchedulerState;
pub use transport::{Command, Request, Response, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _timings = SyncTimings::default();
        let _config = WidgetConfig::default();
        let _state = SchedulerState::new();
        let _sink = LatestPayload::new();
        let _request = Request::get_info();
    }
}
