//! History worker thread
//!
//! A single owner thread holds the store, the poller and the authorization
//! state. Every public call on `ClipboardHistory` is a message send with a
//! reply channel, so mutations are serialized without a shared lock.
//!
//! Timer ticks and finished image normalizations arrive as messages too.

mod owner;

use anyhow::Context;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::database::SqliteBackend;
use super::paste::PasteOutcome;
use super::ports::{AppContext, HistoryBackend};
use super::store::InsertOutcome;
use super::types::{Candidate, EntryId, HistoryEntry, HistoryEvent, ImagePayload};
use crate::error::{ClipboardHistoryError, Result};

/// Request types for the history worker
pub(crate) enum Request {
    /// Timer tick from the poller schedule
    Tick,
    /// Run one tick immediately and report what happened
    PollNow { reply: SyncSender<TickOutcome> },
    /// Result of an off-thread image normalization
    ImageNormalized {
        result: anyhow::Result<ImagePayload>,
        source_application: Option<String>,
        fallback: Option<Candidate>,
    },
    StartMonitoring { reply: SyncSender<Result<()>> },
    StopMonitoring { reply: SyncSender<()> },
    Subscribe { reply: SyncSender<Receiver<HistoryEvent>> },
    Recent {
        limit: usize,
        reply: SyncSender<Vec<HistoryEntry>>,
    },
    Get {
        id: EntryId,
        reply: SyncSender<Option<HistoryEntry>>,
    },
    Paste {
        id: EntryId,
        reply: SyncSender<Result<PasteOutcome>>,
    },
    TogglePin {
        id: EntryId,
        reply: SyncSender<Result<HistoryEntry>>,
    },
    Delete {
        id: EntryId,
        reply: SyncSender<Result<()>>,
    },
    ClearAll { reply: SyncSender<Result<()>> },
    SetAuthorization {
        granted: bool,
        reply: SyncSender<()>,
    },
    SetAppActive {
        active: bool,
        reply: SyncSender<()>,
    },
    SettingsChanged { reply: SyncSender<()> },
    Shutdown,
}

/// What a single poll tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Monitoring is stopped or unauthorized
    NotRunning,
    /// A previous pass is still waiting for image normalization
    Busy,
    /// Change counter unchanged; nothing was read
    Unchanged,
    /// The clipboard changed but produced nothing to record
    Skipped,
    Recorded(InsertOutcome),
    /// The store rejected the capture
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Run the repeating poll timer. Disable to drive ticks with `poll_now`.
    pub drive_timer: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self { drive_timer: true }
    }
}

struct Inner {
    sender: Sender<Request>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn shutdown(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        let _ = self.sender.send(Request::Shutdown);
        if handle.join().is_err() {
            warn!("History worker thread panicked");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to the clipboard history worker. Cheap to clone; the worker stops
/// when `shutdown` is called or the last handle is dropped.
#[derive(Clone)]
pub struct ClipboardHistory {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClipboardHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardHistory").finish_non_exhaustive()
    }
}

impl ClipboardHistory {
    /// Open the SQLite store in the configured data directory and start the worker
    pub fn open(ctx: AppContext) -> anyhow::Result<Self> {
        let data_dir = ctx.settings.data_dir();
        let backend = SqliteBackend::open(&data_dir).with_context(|| {
            format!(
                "Failed to open clipboard history in {}",
                data_dir.display()
            )
        })?;
        info!(path = %backend.db_path().display(), "Opened clipboard history store");
        Self::spawn(ctx, Box::new(backend), WorkerOptions::default())
    }

    /// Start the worker thread over an explicit backend
    pub fn spawn(
        ctx: AppContext,
        backend: Box<dyn HistoryBackend>,
        options: WorkerOptions,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<Request>();
        let self_tx = tx.clone();

        let handle = thread::Builder::new()
            .name("clipboard-history".to_string())
            .spawn(move || owner::run(ctx, backend, options, self_tx, rx))
            .context("Failed to spawn clipboard history worker")?;

        info!(drive_timer = options.drive_timer, "History worker thread started");
        Ok(Self {
            inner: Arc::new(Inner {
                sender: tx,
                handle: Mutex::new(Some(handle)),
            }),
        })
    }

    fn call<T>(&self, make: impl FnOnce(SyncSender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.inner
            .sender
            .send(make(reply_tx))
            .map_err(|_| ClipboardHistoryError::WorkerUnavailable)?;
        reply_rx
            .recv()
            .map_err(|_| ClipboardHistoryError::WorkerUnavailable)
    }

    pub fn start_monitoring(&self) -> Result<()> {
        self.call(|reply| Request::StartMonitoring { reply })?
    }

    pub fn stop_monitoring(&self) -> Result<()> {
        self.call(|reply| Request::StopMonitoring { reply })
    }

    /// Receive every future `HistoryEvent`. Any number of subscribers may exist.
    pub fn subscribe(&self) -> Result<Receiver<HistoryEvent>> {
        self.call(|reply| Request::Subscribe { reply })
    }

    /// Up to `limit` entries, newest first. Empty if the worker is gone.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.call(|reply| Request::Recent { limit, reply })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &EntryId) -> Option<HistoryEntry> {
        let id = id.clone();
        self.call(|reply| Request::Get { id, reply }).ok().flatten()
    }

    pub fn paste_item(&self, id: &EntryId) -> Result<PasteOutcome> {
        let id = id.clone();
        self.call(|reply| Request::Paste { id, reply })?
    }

    pub fn toggle_pin(&self, id: &EntryId) -> Result<HistoryEntry> {
        let id = id.clone();
        self.call(|reply| Request::TogglePin { id, reply })?
    }

    pub fn delete(&self, id: &EntryId) -> Result<()> {
        let id = id.clone();
        self.call(|reply| Request::Delete { id, reply })?
    }

    pub fn clear_all(&self) -> Result<()> {
        self.call(|reply| Request::ClearAll { reply })?
    }

    pub fn set_authorization(&self, granted: bool) -> Result<()> {
        self.call(|reply| Request::SetAuthorization { granted, reply })
    }

    pub fn set_app_active(&self, active: bool) -> Result<()> {
        self.call(|reply| Request::SetAppActive { active, reply })
    }

    /// Re-evaluate anything derived from `Settings` (e.g. the poll interval)
    pub fn settings_changed(&self) -> Result<()> {
        self.call(|reply| Request::SettingsChanged { reply })
    }

    /// Run one poll tick now. When the tick dispatches an image, the reply
    /// waits until the normalized image has been committed.
    pub fn poll_now(&self) -> Result<TickOutcome> {
        self.call(|reply| Request::PollNow { reply })
    }

    /// Stop monitoring and wait for the worker to exit. Later calls fail
    /// with `WorkerUnavailable`.
    pub fn shutdown(&self) {
        debug!("Shutting down history worker");
        self.inner.shutdown();
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
