//! Repeating task scheduling.
//!
//! A `RepeatingTask` runs a closure on its own thread at a fixed (but
//! adjustable) interval until it is cancelled or the closure asks to stop.
//! It knows nothing about what the closure does; the clipboard poller uses
//! it to send tick messages to the history worker.
//!
//! # Example Usage
//! ```rust,ignore
//! let task = RepeatingTask::spawn("poller", Duration::from_millis(500), move || {
//!     tx.send(Tick).is_ok()
//! })?;
//! task.set_interval(Duration::from_secs(1));
//! task.cancel();
//! ```

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

enum Control {
    /// Interval changed; restart the current wait with the new value
    Reschedule,
    Cancel,
}

/// Handle to a repeating background task. Dropping the handle cancels it.
pub struct RepeatingTask {
    name: String,
    interval_ms: Arc<AtomicU64>,
    control: Sender<Control>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Start calling `tick` every `interval`. The first call happens one
    /// interval after spawning. Returning `false` from `tick` ends the task.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let interval_ms = Arc::new(AtomicU64::new(duration_to_ms(interval)));
        let (control_tx, control_rx) = channel::<Control>();

        let thread_interval = interval_ms.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                let wait = Duration::from_millis(thread_interval.load(Ordering::Relaxed));
                match control_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !tick() {
                            debug!(task = %thread_name, "Repeating task finished");
                            break;
                        }
                    }
                    Ok(Control::Reschedule) => continue,
                    Ok(Control::Cancel) | Err(RecvTimeoutError::Disconnected) => {
                        debug!(task = %thread_name, "Repeating task cancelled");
                        break;
                    }
                }
            })
            .with_context(|| format!("Failed to spawn repeating task '{}'", name))?;

        debug!(task = %name, interval_ms = duration_to_ms(interval), "Repeating task started");

        Ok(Self {
            name: name.to_string(),
            interval_ms,
            control: control_tx,
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Change the interval. Takes effect immediately: the pending wait is
    /// restarted with the new value.
    pub fn set_interval(&self, interval: Duration) {
        let new_ms = duration_to_ms(interval);
        let old_ms = self.interval_ms.swap(new_ms, Ordering::Relaxed);
        if old_ms != new_ms {
            debug!(task = %self.name, old_ms, new_ms, "Repeating task rescheduled");
            let _ = self.control.send(Control::Reschedule);
        }
    }

    /// Stop the task and wait for its thread to exit. A tick that is
    /// already running completes first.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.control.send(Control::Cancel);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(task = %self.name, "Repeating task thread panicked");
            }
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn duration_to_ms(interval: Duration) -> u64 {
    (interval.as_millis() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_ticks_repeat_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let task = RepeatingTask::spawn("test-ticks", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.cancel();

        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 3, "expected at least 3 ticks, got {}", after_cancel);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel, "no ticks after cancel");
    }

    #[test]
    fn test_returning_false_stops_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let _task = RepeatingTask::spawn("test-stop", Duration::from_millis(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_interval_updates_value() {
        let task = RepeatingTask::spawn("test-interval", Duration::from_secs(10), || true).unwrap();
        assert_eq!(task.interval(), Duration::from_secs(10));
        task.set_interval(Duration::from_millis(1000));
        assert_eq!(task.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_sub_millisecond_interval_is_floored() {
        assert_eq!(duration_to_ms(Duration::from_micros(10)), 1);
    }
}
