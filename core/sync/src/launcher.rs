//! Asking the host to launch the companion app.
//!
//! When the companion has been silent for a long time the widget can wake
//! it up, either right away or through a delayed host alarm.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use dripsync_common::{Error, Result};

/// Delay used for alarm-based launches.
pub const DEFAULT_ALARM_DELAY: Duration = Duration::from_secs(5);

/// Identifier of a pending host alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmId(pub u64);

/// Which app and page the host should open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub app_id: String,
    pub url: String,
    /// Optional parameter passed to the page.
    pub param: Option<String>,
}

impl LaunchRequest {
    /// Open the companion's main page and ask it to refresh.
    pub fn update(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            url: "pages/index".to_string(),
            param: Some("update".to_string()),
        }
    }
}

/// Host facility for launching apps and arming alarms.
pub trait CompanionLauncher: Send + Sync {
    /// Launch the app now.
    fn start_app(&self, request: &LaunchRequest) -> Result<()>;

    /// Launch the app after `delay`.
    fn schedule_alarm(&self, request: &LaunchRequest, delay: Duration) -> Result<AlarmId>;

    /// Cancel a pending alarm. Unknown or already fired ids are ignored.
    fn cancel_alarm(&self, id: AlarmId) -> Result<()>;
}

/// Callback invoked when an app is launched.
pub type LaunchHook = Arc<dyn Fn(&LaunchRequest) + Send + Sync>;

/// Launcher that runs alarms as tokio timers and launches by calling a hook.
pub struct TimerLauncher {
    on_launch: LaunchHook,
    next_id: AtomicU64,
    alarms: Arc<Mutex<HashMap<AlarmId, JoinHandle<()>>>>,
}

impl TimerLauncher {
    /// Create a launcher calling `on_launch` for every launch.
    pub fn new(on_launch: LaunchHook) -> Self {
        Self {
            on_launch,
            next_id: AtomicU64::new(1),
            alarms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of alarms that have not fired yet.
    pub fn pending_alarms(&self) -> usize {
        self.alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CompanionLauncher for TimerLauncher {
    fn start_app(&self, request: &LaunchRequest) -> Result<()> {
        if request.app_id.is_empty() {
            return Err(Error::InvalidInput("app id cannot be empty".to_string()));
        }
        info!("Launching {} ({})", request.app_id, request.url);
        (self.on_launch)(request);
        Ok(())
    }

    fn schedule_alarm(&self, request: &LaunchRequest, delay: Duration) -> Result<AlarmId> {
        if request.app_id.is_empty() {
            return Err(Error::InvalidInput("app id cannot be empty".to_string()));
        }

        let id = AlarmId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let on_launch = self.on_launch.clone();
        let alarms = Arc::clone(&self.alarms);
        let request = request.clone();

        // Hold the map lock across spawn so the task cannot remove its
        // entry before it is inserted.
        let mut pending = self.alarms.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            alarms
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            info!("Alarm {:?} fired, launching {}", id, request.app_id);
            on_launch(&request);
        });
        pending.insert(id, handle);

        debug!("Alarm {:?} armed for {:?}", id, delay);
        Ok(id)
    }

    fn cancel_alarm(&self, id: AlarmId) -> Result<()> {
        let handle = self
            .alarms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            debug!("Alarm {:?} cancelled", id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_launcher() -> (TimerLauncher, Arc<AtomicUsize>) {
        let launches = Arc::new(AtomicUsize::new(0));
        let counter = launches.clone();
        let launcher = TimerLauncher::new(Arc::new(move |_request: &LaunchRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        (launcher, launches)
    }

    #[test]
    fn test_update_request_shape() {
        let request = LaunchRequest::update("1044712");
        assert_eq!(request.url, "pages/index");
        assert_eq!(request.param.as_deref(), Some("update"));
    }

    #[tokio::test]
    async fn test_start_app_launches_immediately() {
        let (launcher, launches) = counting_launcher();
        launcher.start_app(&LaunchRequest::update("app")).unwrap();
        assert_eq!(launches.load(Ordering::SeqCst), 1);

        assert!(launcher.start_app(&LaunchRequest::update("")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_fires_after_delay() {
        let (launcher, launches) = counting_launcher();
        launcher
            .schedule_alarm(&LaunchRequest::update("app"), DEFAULT_ALARM_DELAY)
            .unwrap();
        assert_eq!(launcher.pending_alarms(), 1);

        tokio::time::sleep(DEFAULT_ALARM_DELAY / 2).await;
        assert_eq!(launches.load(Ordering::SeqCst), 0);

        tokio::time::sleep(DEFAULT_ALARM_DELAY).await;
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.pending_alarms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_alarm_never_fires() {
        let (launcher, launches) = counting_launcher();
        let id = launcher
            .schedule_alarm(&LaunchRequest::update("app"), DEFAULT_ALARM_DELAY)
            .unwrap();

        launcher.cancel_alarm(id).unwrap();
        launcher.cancel_alarm(id).unwrap();
        assert_eq!(launcher.pending_alarms(), 0);

        tokio::time::sleep(DEFAULT_ALARM_DELAY * 2).await;
        assert_eq!(launches.load(Ordering::SeqCst), 0);
    }
}
