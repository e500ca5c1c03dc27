//! Owner loop of the history worker

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Request, TickOutcome, WorkerOptions};
use crate::clipboard_history::classifier::{classify, Classification, ClassifyOptions};
use crate::clipboard_history::image::spawn_normalize;
use crate::clipboard_history::monitor::{Poller, TickSender};
use crate::clipboard_history::paste::{paste_entry, PasteOutcome};
use crate::clipboard_history::ports::{AppContext, HistoryBackend};
use crate::clipboard_history::store::{HistoryStore, InsertOutcome, StoreLimits};
use crate::clipboard_history::types::{
    Candidate, EntryId, EntryPayload, HistoryEntry, HistoryEvent, ImagePayload, Notice,
    RemovalReason, IMAGE_PREVIEW_LABEL,
};
use crate::error::{ClipboardHistoryError, ErrorSeverity, Result};

pub(super) fn run(
    ctx: AppContext,
    backend: Box<dyn HistoryBackend>,
    options: WorkerOptions,
    self_tx: Sender<Request>,
    rx: Receiver<Request>,
) {
    let mut owner = Owner::new(ctx, backend, options, self_tx);
    info!("History worker loop started");
    while let Ok(request) = rx.recv() {
        if !owner.handle(request) {
            break;
        }
    }
    owner.poller.stop();
    owner.drain_in_flight(&rx);
    info!("History worker loop ended");
}

/// Upper bound on waiting for an in-flight image once shutdown was requested
const SHUTDOWN_IMAGE_WAIT: Duration = Duration::from_secs(30);

struct Owner {
    ctx: AppContext,
    store: HistoryStore,
    poller: Poller,
    subscribers: Vec<Sender<HistoryEvent>>,
    self_tx: Sender<Request>,
    /// Set while an image is being normalized off-thread
    in_flight: bool,
    /// `poll_now` caller waiting for the in-flight pass to finish
    pending_reply: Option<SyncSender<TickOutcome>>,
}

impl Owner {
    fn new(
        ctx: AppContext,
        backend: Box<dyn HistoryBackend>,
        options: WorkerOptions,
        self_tx: Sender<Request>,
    ) -> Self {
        let tick_sender: Option<TickSender> = options.drive_timer.then(|| {
            let tx = self_tx.clone();
            Arc::new(move || tx.send(Request::Tick).is_ok()) as TickSender
        });
        let authorized = ctx.permissions.is_authorized(false);
        let mut owner = Self {
            store: HistoryStore::open(backend),
            poller: Poller::new(tick_sender, authorized),
            subscribers: Vec::new(),
            self_tx,
            in_flight: false,
            pending_reply: None,
            ctx,
        };
        // Nobody can be subscribed yet; just consume the flag
        owner.store.take_recovery();
        owner
    }

    /// Returns false when the loop should exit
    fn handle(&mut self, request: Request) -> bool {
        match request {
            Request::Tick => {
                self.tick(None);
            }
            Request::PollNow { reply } => self.tick(Some(reply)),
            Request::ImageNormalized {
                result,
                source_application,
                fallback,
            } => self.finish_image(result, source_application, fallback),
            Request::StartMonitoring { reply } => {
                let result =
                    self.poller
                        .start(self.ctx.clipboard.as_ref(), self.ctx.permissions.as_ref(), &self.ctx.settings);
                let _ = reply.send(result);
            }
            Request::StopMonitoring { reply } => {
                self.poller.stop();
                let _ = reply.send(());
            }
            Request::Subscribe { reply } => {
                let (tx, rx) = mpsc::channel();
                self.subscribers.push(tx);
                debug!(subscribers = self.subscribers.len(), "History subscriber added");
                let _ = reply.send(rx);
            }
            Request::Recent { limit, reply } => {
                let _ = reply.send(self.store.recent(limit));
            }
            Request::Get { id, reply } => {
                let _ = reply.send(self.store.get(&id).cloned());
            }
            Request::Paste { id, reply } => {
                let _ = reply.send(self.paste(&id));
            }
            Request::TogglePin { id, reply } => {
                let result = self.store.toggle_pin(&id);
                if let Ok(entry) = &result {
                    self.broadcast(HistoryEvent::PinChanged {
                        id: entry.id.clone(),
                        pinned: entry.pinned,
                    });
                }
                self.after_store_write();
                let _ = reply.send(result);
            }
            Request::Delete { id, reply } => {
                let result = self.store.delete(&id);
                if result.is_ok() {
                    self.broadcast(HistoryEvent::Removed {
                        ids: vec![id],
                        reason: RemovalReason::Deleted,
                    });
                }
                self.after_store_write();
                let _ = reply.send(result);
            }
            Request::ClearAll { reply } => {
                let result = self.store.clear_all();
                if result.is_ok() {
                    self.broadcast(HistoryEvent::Cleared);
                }
                self.after_store_write();
                let _ = reply.send(result);
            }
            Request::SetAuthorization { granted, reply } => {
                let notice = self.poller.set_authorization(
                    granted,
                    self.ctx.clipboard.as_ref(),
                    &self.ctx.settings,
                );
                if let Some(notice) = notice {
                    self.broadcast(HistoryEvent::Notice(notice));
                }
                let _ = reply.send(());
            }
            Request::SetAppActive { active, reply } => {
                self.poller.set_app_active(active, &self.ctx.settings);
                let _ = reply.send(());
            }
            Request::SettingsChanged { reply } => {
                self.poller.settings_changed(&self.ctx.settings);
                let _ = reply.send(());
            }
            Request::Shutdown => {
                info!("History worker shutdown");
                return false;
            }
        }
        true
    }

    /// Wait for a normalization dispatched before shutdown and commit it.
    ///
    /// Other requests are dropped unanswered, so their callers see the
    /// worker as unavailable.
    fn drain_in_flight(&mut self, rx: &Receiver<Request>) {
        if self.in_flight {
            info!("Waiting for in-flight clipboard image before exit");
        }
        while self.in_flight {
            match rx.recv_timeout(SHUTDOWN_IMAGE_WAIT) {
                Ok(Request::ImageNormalized {
                    result,
                    source_application,
                    fallback,
                }) => self.finish_image(result, source_application, fallback),
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Gave up waiting for in-flight clipboard image");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn tick(&mut self, reply: Option<SyncSender<TickOutcome>>) {
        if !self.poller.is_running() {
            return respond(&reply, TickOutcome::NotRunning);
        }
        if self.in_flight {
            return respond(&reply, TickOutcome::Busy);
        }
        if !self.poller.on_tick(self.ctx.clipboard.as_ref()) {
            return respond(&reply, TickOutcome::Unchanged);
        }

        let options = ClassifyOptions {
            preview_char_limit: self.ctx.settings.preview_char_limit(),
            max_text_bytes: self.ctx.settings.max_text_bytes(),
        };
        match classify(
            self.ctx.clipboard.as_ref(),
            self.ctx.frontmost.as_ref(),
            options,
        ) {
            Classification::Nothing => respond(&reply, TickOutcome::Skipped),
            Classification::Ready(candidate) => {
                let outcome = self.commit(candidate);
                respond(&reply, outcome);
            }
            Classification::PendingImage {
                bytes,
                source_application,
                fallback,
            } => {
                let tx = self.self_tx.clone();
                let spawned = spawn_normalize(bytes, move |result| {
                    let _ = tx.send(Request::ImageNormalized {
                        result,
                        source_application,
                        fallback,
                    });
                });
                match spawned {
                    Ok(()) => {
                        self.in_flight = true;
                        self.pending_reply = reply;
                    }
                    Err(e) => {
                        error!(error = %format!("{:#}", e), "Could not normalize clipboard image");
                        respond(&reply, TickOutcome::Skipped);
                    }
                }
            }
        }
    }

    /// Commit a normalized image; runs even if monitoring stopped meanwhile
    fn finish_image(
        &mut self,
        result: anyhow::Result<ImagePayload>,
        source_application: Option<String>,
        fallback: Option<Candidate>,
    ) {
        self.in_flight = false;

        let outcome = match result {
            Ok(image) => self.commit(Candidate {
                payload: EntryPayload::Image(image),
                preview: IMAGE_PREVIEW_LABEL.to_string(),
                source_application,
            }),
            Err(e) => {
                let err = ClipboardHistoryError::ImageProcessingFailed(format!("{:#}", e));
                match fallback {
                    Some(candidate) => {
                        info!(error = %err, "Recording copied files instead of image");
                        self.commit(candidate)
                    }
                    None => {
                        info!(error = %err, "Clipboard image skipped");
                        TickOutcome::Skipped
                    }
                }
            }
        };

        if let Some(reply) = self.pending_reply.take() {
            let _ = reply.send(outcome);
        }
    }

    fn commit(&mut self, candidate: Candidate) -> TickOutcome {
        let limits = StoreLimits::from_settings(&self.ctx.settings);
        let outcome = match self.store.insert(candidate, limits) {
            Ok((outcome, evicted)) => {
                self.broadcast(match &outcome {
                    InsertOutcome::Inserted(entry) => HistoryEvent::Inserted(entry.clone()),
                    InsertOutcome::Collapsed(entry) => HistoryEvent::Collapsed(entry.clone()),
                });
                if !evicted.is_empty() {
                    self.broadcast(HistoryEvent::Removed {
                        ids: evicted,
                        reason: RemovalReason::Evicted,
                    });
                }
                TickOutcome::Recorded(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Failed to record clipboard capture");
                TickOutcome::Failed(e.to_string())
            }
        };
        self.after_store_write();
        outcome
    }

    fn paste(&mut self, id: &EntryId) -> Result<PasteOutcome> {
        let entry: HistoryEntry = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| ClipboardHistoryError::ItemNotFound(id.to_string()))?;

        let clipboard = self.ctx.clipboard.clone();
        let poller = &mut self.poller;
        let result = paste_entry(
            clipboard.as_ref(),
            self.ctx.injector.as_ref(),
            &entry,
            || poller.relatch(clipboard.as_ref()),
        );

        match &result {
            Ok(outcome) => {
                if let Some(notice) = outcome.notice() {
                    self.broadcast(HistoryEvent::Notice(notice));
                }
            }
            Err(e) => self.broadcast(HistoryEvent::Notice(Notice {
                severity: e.severity(),
                message: e.user_message(),
            })),
        }
        result
    }

    /// Tell subscribers when a corrupt store was replaced with an empty one
    fn after_store_write(&mut self) {
        if self.store.take_recovery() {
            self.broadcast(HistoryEvent::Cleared);
            self.broadcast(HistoryEvent::Notice(Notice {
                severity: ErrorSeverity::Error,
                message: "Clipboard history storage was damaged and has been reset".to_string(),
            }));
        }
    }

    fn broadcast(&mut self, event: HistoryEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn respond(reply: &Option<SyncSender<TickOutcome>>, outcome: TickOutcome) {
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
}
