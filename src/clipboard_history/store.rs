//! In-memory history view backed by a `HistoryBackend`
//!
//! The store keeps every entry in memory, newest first, and writes each
//! mutation to the backend before applying it. A failed write leaves the
//! in-memory view untouched.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::ports::HistoryBackend;
use super::types::{Candidate, EntryId, HistoryEntry};
use crate::config::Settings;
use crate::debug_panic;
use crate::error::{ClipboardHistoryError, Result};

/// Capacity and dedup parameters for a single insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of unpinned entries kept
    pub max_unpinned: usize,
    /// Number of most-recent entries searched for a duplicate
    pub dedup_window: usize,
}

impl StoreLimits {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_unpinned: settings.max_unpinned_history_count(),
            dedup_window: settings.dedup_check_window(),
        }
    }
}

/// Result of a successful `insert`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(HistoryEntry),
    /// A duplicate was found; it was refreshed and moved to the front
    Collapsed(HistoryEntry),
}

impl InsertOutcome {
    pub fn entry(&self) -> &HistoryEntry {
        match self {
            InsertOutcome::Inserted(entry) | InsertOutcome::Collapsed(entry) => entry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Ok,
    /// Recovery has been used; the next corruption is fatal
    Recovered,
    Poisoned,
}

pub struct HistoryStore {
    backend: Box<dyn HistoryBackend>,
    /// Sorted by `created_at`, newest first
    entries: Vec<HistoryEntry>,
    last_timestamp: Option<DateTime<Utc>>,
    health: Health,
    /// Set when a recovery wiped the view; cleared by `take_recovery`
    recovery_pending: bool,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("entries", &self.entries.len())
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Load all entries from the backend.
    ///
    /// A corrupt backend is recovered once; any other read failure yields an
    /// empty view.
    pub fn open(backend: Box<dyn HistoryBackend>) -> Self {
        let mut store = Self {
            backend,
            entries: Vec::new(),
            last_timestamp: None,
            health: Health::Ok,
            recovery_pending: false,
        };

        match store.backend.load_all() {
            Ok(mut entries) => {
                entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                store.last_timestamp = entries.first().map(|e| e.created_at);
                store.entries = entries;
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load clipboard history");
                if store.backend.is_corruption(&e) {
                    store.recover();
                }
            }
        }

        info!(count = store.entries.len(), "Clipboard history store opened");
        store
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// True once if a recovery replaced the store with an empty one
    pub fn take_recovery(&mut self) -> bool {
        std::mem::take(&mut self.recovery_pending)
    }

    /// Insert a candidate, collapsing it onto a recent duplicate if one
    /// exists, then enforce capacity. Returns the outcome and any evicted ids.
    pub fn insert(
        &mut self,
        candidate: Candidate,
        limits: StoreLimits,
    ) -> Result<(InsertOutcome, Vec<EntryId>)> {
        let duplicate = self
            .entries
            .iter()
            .take(limits.dedup_window)
            .position(|e| e.payload.is_duplicate_of(&candidate.payload));

        let outcome = match duplicate {
            Some(index) => {
                let mut refreshed = self.entries[index].clone();
                refreshed.created_at = self.next_timestamp();
                if candidate.source_application.is_some() {
                    refreshed.source_application = candidate.source_application;
                }
                self.persist(|b| b.update(&refreshed))?;

                self.entries.remove(index);
                self.push_front(refreshed.clone());
                debug!(id = %refreshed.id, "Collapsed duplicate clipboard entry");
                InsertOutcome::Collapsed(refreshed)
            }
            None => {
                let entry = HistoryEntry {
                    id: EntryId::new(),
                    created_at: self.next_timestamp(),
                    preview: candidate.preview,
                    payload: candidate.payload,
                    source_application: candidate.source_application,
                    pinned: false,
                };
                self.persist(|b| b.insert(&entry))?;

                self.push_front(entry.clone());
                debug!(id = %entry.id, kind = entry.kind().as_str(), "Inserted clipboard entry");
                InsertOutcome::Inserted(entry)
            }
        };

        // The capture itself succeeded; an eviction failure only delays trimming
        let evicted = match self.capacity_check(limits.max_unpinned) {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!(error = %e, "Capacity check failed");
                Vec::new()
            }
        };

        Ok((outcome, evicted))
    }

    /// Delete the oldest unpinned entries until at most `max_unpinned` remain.
    pub fn capacity_check(&mut self, max_unpinned: usize) -> Result<Vec<EntryId>> {
        let victims: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|e| !e.pinned)
            .skip(max_unpinned)
            .map(|e| e.id.clone())
            .collect();

        if victims.is_empty() {
            return Ok(victims);
        }

        self.persist(|b| b.delete_many(&victims))?;
        self.entries.retain(|e| !victims.contains(&e.id));
        info!(evicted = victims.len(), max_unpinned, "Evicted oldest clipboard entries");
        Ok(victims)
    }

    /// Flip the pin state of an entry, returning the updated entry
    pub fn toggle_pin(&mut self, id: &EntryId) -> Result<HistoryEntry> {
        let index = self.index_of(id)?;
        let mut updated = self.entries[index].clone();
        updated.pinned = !updated.pinned;
        self.persist(|b| b.update(&updated))?;

        self.entries[index] = updated.clone();
        debug!(id = %id, pinned = updated.pinned, "Toggled clipboard entry pin");
        Ok(updated)
    }

    pub fn delete(&mut self, id: &EntryId) -> Result<()> {
        let index = self.index_of(id)?;
        self.persist(|b| b.delete_many(std::slice::from_ref(id)))?;
        self.entries.remove(index);
        debug!(id = %id, "Deleted clipboard entry");
        Ok(())
    }

    /// Remove every entry, pinned ones included
    pub fn clear_all(&mut self) -> Result<()> {
        self.persist(|b| b.clear())?;
        self.entries.clear();
        info!("Cleared clipboard history");
        Ok(())
    }

    fn index_of(&self, id: &EntryId) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| ClipboardHistoryError::ItemNotFound(id.to_string()))
    }

    fn push_front(&mut self, entry: HistoryEntry) {
        if let Some(first) = self.entries.first() {
            if first.created_at >= entry.created_at {
                debug_panic!(
                    "clipboard entry {} is not newer than the head of the history",
                    entry.id
                );
            }
        }
        self.entries.insert(0, entry);
    }

    /// Millisecond timestamp strictly after every timestamp issued so far
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = DateTime::<Utc>::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    /// Run a backend write, handling corruption recovery. The in-memory view
    /// must only be changed after this returns `Ok`.
    fn persist<T>(
        &mut self,
        op: impl FnOnce(&mut dyn HistoryBackend) -> anyhow::Result<T>,
    ) -> Result<T> {
        if self.health == Health::Poisoned {
            return Err(ClipboardHistoryError::StorageError(
                "clipboard history storage is unavailable".to_string(),
            ));
        }

        match op(self.backend.as_mut()) {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(error = %format!("{:#}", e), "Clipboard history write failed");
                if self.backend.is_corruption(&e) {
                    self.recover();
                }
                Err(ClipboardHistoryError::storage(&e))
            }
        }
    }

    fn recover(&mut self) {
        if self.health != Health::Ok {
            error!("Clipboard history storage corrupted again; giving up on this store");
            self.health = Health::Poisoned;
            return;
        }

        match self.backend.recover() {
            Ok(()) => {
                warn!(lost = self.entries.len(), "Recovered corrupt clipboard history storage");
                self.entries.clear();
                self.health = Health::Recovered;
                self.recovery_pending = true;
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Clipboard history recovery failed");
                self.health = Health::Poisoned;
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
