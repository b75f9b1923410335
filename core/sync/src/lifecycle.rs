//! Host lifecycle wiring.
//!
//! Translates resume/pause/destroy callbacks from the host into scheduler
//! start/stop and transport connect/disconnect. The host may suspend the
//! process anywhere, including mid-request, so both edges reset the
//! single-flight guard.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use dripsync_common::{Error, Result};

use crate::config::{ConfigChange, ConfigLoader, WidgetConfig};
use crate::launcher::{AlarmId, CompanionLauncher, LaunchRequest, DEFAULT_ALARM_DELAY};
use crate::scheduler::SyncScheduler;
use crate::transport::Transport;

/// Owns the scheduler for one widget instance and reacts to host events.
pub struct LifecycleAdapter {
    scheduler: SyncScheduler,
    config: ConfigLoader,
    transport: Arc<dyn Transport>,
    launcher: Option<Launcher>,
}

struct Launcher {
    host: Arc<dyn CompanionLauncher>,
    request: LaunchRequest,
    alarm_delay: Duration,
    pending_alarm: Option<AlarmId>,
}

impl LifecycleAdapter {
    /// Wire a scheduler, its config loader and the transport it fetches
    /// through.
    pub fn new(
        scheduler: SyncScheduler,
        config: ConfigLoader,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            scheduler,
            config,
            transport,
            launcher: None,
        }
    }

    /// Allow waking the companion app through the host.
    pub fn with_launcher(
        mut self,
        host: Arc<dyn CompanionLauncher>,
        request: LaunchRequest,
    ) -> Self {
        self.launcher = Some(Launcher {
            host,
            request,
            alarm_delay: DEFAULT_ALARM_DELAY,
            pending_alarm: None,
        });
        self
    }

    /// Override the delay used for alarm-based launches.
    pub fn with_alarm_delay(mut self, delay: Duration) -> Self {
        if let Some(launcher) = self.launcher.as_mut() {
            launcher.alarm_delay = delay;
        }
        self
    }

    /// The scheduler driven by this adapter.
    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Currently applied config.
    pub fn config(&self) -> &WidgetConfig {
        self.config.config()
    }

    /// Host brought the widget to the foreground.
    pub async fn on_resume(&mut self) {
        debug!("resume");

        if let Err(e) = self.transport.connect().await {
            // Ticks will see the link down and retry on their own.
            warn!("Connect to companion failed: {}", e);
        }

        self.scheduler.reset_guard();
        self.apply_config();
    }

    /// Host is about to suspend the widget.
    pub async fn on_pause(&mut self) {
        debug!("pause");

        self.scheduler.stop();
        self.scheduler.reset_guard();

        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect from companion failed: {}", e);
        }
    }

    /// Widget is being torn down.
    pub fn on_destroy(&mut self) {
        debug!("destroy");

        if let Some(launcher) = self.launcher.as_mut() {
            if let Some(id) = launcher.pending_alarm.take() {
                if let Err(e) = launcher.host.cancel_alarm(id) {
                    warn!("Failed to cancel alarm {:?}: {}", id, e);
                }
            }
        }
        self.scheduler.stop();
    }

    /// Pick up config changes and start or stop the scheduler to match.
    ///
    /// Returns whether the scheduler is running afterwards.
    pub fn apply_config(&mut self) -> bool {
        if self.config.check_for_update() != ConfigChange::Unchanged {
            info!("Config applied: {:?}", self.config.config());
        }

        let config = self.config.config();
        self.scheduler.set_verbose(config.show_log);

        if config.disable_updates {
            self.scheduler.stop();
        } else {
            self.scheduler.start();
        }
        self.scheduler.is_running()
    }

    /// Ask the host to launch the companion so it refreshes its data.
    ///
    /// With `now` the app is started immediately, otherwise through an
    /// alarm. Either way this counts as an update attempt.
    ///
    /// # Errors
    /// - No launcher configured
    /// - Host refused the launch
    pub fn request_companion_update(&mut self, now: bool) -> Result<()> {
        let launcher = self
            .launcher
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("no companion launcher configured".to_string()))?;

        if now {
            launcher.host.start_app(&launcher.request)?;
        } else {
            if let Some(previous) = launcher.pending_alarm.take() {
                launcher.host.cancel_alarm(previous)?;
            }
            let id = launcher
                .host
                .schedule_alarm(&launcher.request, launcher.alarm_delay)?;
            launcher.pending_alarm = Some(id);
        }

        self.scheduler.note_attempt();
        Ok(())
    }
}
