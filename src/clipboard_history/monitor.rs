//! Clipboard monitoring
//!
//! `Poller` owns the polling schedule, the latched change counter and the
//! authorization state. It lives on the history worker thread; the timer
//! only sends tick messages back to that thread.
//!
//! The effective polling interval is the configured one while the host app
//! is active and at least `BACKGROUND_POLLING_FLOOR_SECONDS` otherwise.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::change_detection::ChangeLatch;
use super::ports::{PermissionAuthority, SystemClipboard};
use super::types::Notice;
use crate::config::{Settings, BACKGROUND_POLLING_FLOOR_SECONDS};
use crate::error::{ClipboardHistoryError, ErrorSeverity, Result};
use crate::scheduler::RepeatingTask;

/// Called on every timer tick; returning `false` ends the schedule
pub type TickSender = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct Poller {
    latch: ChangeLatch,
    /// `None` when ticks are driven manually
    tick_sender: Option<TickSender>,
    task: Option<RepeatingTask>,
    running: bool,
    monitoring_requested: bool,
    authorized: bool,
    app_active: bool,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("running", &self.running)
            .field("monitoring_requested", &self.monitoring_requested)
            .field("authorized", &self.authorized)
            .field("app_active", &self.app_active)
            .finish_non_exhaustive()
    }
}

impl Poller {
    pub fn new(tick_sender: Option<TickSender>, authorized: bool) -> Self {
        Self {
            latch: ChangeLatch::new(),
            tick_sender,
            task: None,
            running: false,
            monitoring_requested: false,
            authorized,
            app_active: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(test)]
    pub fn monitoring_requested(&self) -> bool {
        self.monitoring_requested
    }

    /// Begin polling. Already running is a no-op; missing authorization is
    /// an error, but the request is remembered so a later grant starts it.
    pub fn start(
        &mut self,
        clipboard: &dyn SystemClipboard,
        permissions: &dyn PermissionAuthority,
        settings: &Settings,
    ) -> Result<()> {
        self.monitoring_requested = true;
        if self.running {
            debug!("Clipboard monitoring already running");
            return Ok(());
        }

        if !self.authorized {
            self.authorized = permissions.is_authorized(true);
        }
        if !self.authorized {
            warn!("Clipboard monitoring requested without authorization");
            return Err(ClipboardHistoryError::AuthorizationDenied);
        }

        self.start_running(clipboard, settings)
    }

    /// Cancel future ticks. Idempotent.
    pub fn stop(&mut self) {
        self.monitoring_requested = false;
        self.stop_running();
    }

    /// Apply an authorization change, returning a notice when it flips
    pub fn set_authorization(
        &mut self,
        granted: bool,
        clipboard: &dyn SystemClipboard,
        settings: &Settings,
    ) -> Option<Notice> {
        if granted == self.authorized {
            return None;
        }
        self.authorized = granted;

        if granted {
            info!("Clipboard access granted");
            if self.monitoring_requested && !self.running {
                if let Err(e) = self.start_running(clipboard, settings) {
                    error!(error = %e, "Failed to resume clipboard monitoring");
                }
            }
            Some(Notice {
                severity: ErrorSeverity::Info,
                message: "Clipboard access restored".to_string(),
            })
        } else {
            warn!("Clipboard access revoked, stopping monitoring");
            self.stop_running();
            let err = ClipboardHistoryError::AuthorizationDenied;
            Some(Notice {
                severity: err.severity(),
                message: err.user_message(),
            })
        }
    }

    pub fn set_app_active(&mut self, active: bool, settings: &Settings) {
        if self.app_active != active {
            self.app_active = active;
            self.reschedule(settings);
        }
    }

    /// Re-read the configured interval
    pub fn settings_changed(&mut self, settings: &Settings) {
        self.reschedule(settings);
    }

    pub fn effective_interval(&self, settings: &Settings) -> Duration {
        let configured = settings.polling_interval();
        if self.app_active {
            configured
        } else {
            configured.max(Duration::from_secs_f64(BACKGROUND_POLLING_FLOOR_SECONDS))
        }
    }

    /// Handle a tick: true when the clipboard changed and a pass should run
    pub fn on_tick(&mut self, clipboard: &dyn SystemClipboard) -> bool {
        self.running && self.latch.check(clipboard).is_some()
    }

    /// Mark the current clipboard content as seen (after our own writes)
    pub fn relatch(&mut self, clipboard: &dyn SystemClipboard) {
        let count = self.latch.latch(clipboard);
        debug!(change_count = count, "Re-latched clipboard change count");
    }

    fn start_running(&mut self, clipboard: &dyn SystemClipboard, settings: &Settings) -> Result<()> {
        self.relatch(clipboard);
        let interval = self.effective_interval(settings);

        if let Some(sender) = &self.tick_sender {
            let sender = sender.clone();
            let task = RepeatingTask::spawn("clipboard-poller", interval, move || sender())
                .map_err(|e| {
                    error!(error = %format!("{:#}", e), "Failed to start clipboard poller");
                    ClipboardHistoryError::WorkerUnavailable
                })?;
            self.task = Some(task);
        }

        self.running = true;
        info!(interval_ms = interval.as_millis() as u64, "Clipboard monitoring started");
        Ok(())
    }

    fn stop_running(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        self.latch.reset();
        if self.running {
            self.running = false;
            info!("Clipboard monitoring stopped");
        }
    }

    fn reschedule(&mut self, settings: &Settings) {
        let interval = self.effective_interval(settings);
        if let Some(task) = self.task.as_ref().filter(|t| t.interval() != interval) {
            task.set_interval(interval);
        }
        debug!(
            interval_ms = interval.as_millis() as u64,
            app_active = self.app_active,
            "Clipboard polling interval evaluated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::test_support::{FakeClipboard, FakePermissions};
    use crate::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(interval: f64) -> Settings {
        Settings::new(Config {
            polling_interval_seconds: Some(interval),
            ..Default::default()
        })
    }

    #[test]
    fn test_background_interval_floor() {
        let settings = settings(0.2);
        let mut poller = Poller::new(None, true);
        assert_eq!(poller.effective_interval(&settings), Duration::from_millis(200));

        poller.set_app_active(false, &settings);
        assert_eq!(poller.effective_interval(&settings), Duration::from_secs(1));

        settings.update(|c| c.polling_interval_seconds = Some(1.5));
        poller.settings_changed(&settings);
        assert_eq!(poller.effective_interval(&settings), Duration::from_millis(1500));
    }

    #[test]
    fn test_start_requires_authorization() {
        let clipboard = FakeClipboard::default();
        let permissions = FakePermissions::new(false);
        let settings = settings(0.5);
        let mut poller = Poller::new(None, false);

        let result = poller.start(&clipboard, &permissions, &settings);
        assert!(matches!(result, Err(ClipboardHistoryError::AuthorizationDenied)));
        assert!(!poller.is_running());
        assert!(poller.monitoring_requested());

        // A later grant starts the requested monitoring from a fresh latch
        clipboard.copy_text("copied while denied");
        let notice = poller.set_authorization(true, &clipboard, &settings).unwrap();
        assert_eq!(notice.severity, ErrorSeverity::Info);
        assert!(poller.is_running());
        assert!(!poller.on_tick(&clipboard));
    }

    #[test]
    fn test_authorization_loss_stops_polling() {
        let clipboard = FakeClipboard::default();
        let permissions = FakePermissions::new(true);
        let settings = settings(0.5);
        let mut poller = Poller::new(None, true);
        poller.start(&clipboard, &permissions, &settings).unwrap();

        let notice = poller.set_authorization(false, &clipboard, &settings).unwrap();
        assert_eq!(notice.severity, ErrorSeverity::Critical);
        assert!(!poller.is_running());
        assert!(poller.set_authorization(false, &clipboard, &settings).is_none());

        clipboard.copy_text("ignored");
        assert!(!poller.on_tick(&clipboard));
    }

    #[test]
    fn test_tick_detects_each_change_once() {
        let clipboard = FakeClipboard::default();
        let permissions = FakePermissions::new(true);
        let settings = settings(0.5);
        let mut poller = Poller::new(None, true);
        poller.start(&clipboard, &permissions, &settings).unwrap();

        assert!(!poller.on_tick(&clipboard));
        clipboard.copy_text("a");
        assert!(poller.on_tick(&clipboard));
        assert!(!poller.on_tick(&clipboard));

        poller.stop();
        poller.stop();
        assert!(!poller.is_running());
        assert!(!poller.monitoring_requested());
    }

    #[test]
    fn test_timer_sends_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let sender: TickSender = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let clipboard = FakeClipboard::default();
        let permissions = FakePermissions::new(true);
        let settings = settings(0.1);
        let mut poller = Poller::new(Some(sender), true);
        poller.start(&clipboard, &permissions, &settings).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        poller.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }
}
