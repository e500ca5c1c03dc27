//! Clipboard History Module
//!
//! Watches the system clipboard and keeps a bounded, deduplicated history
//! of what was copied.
//!
//! ## Features
//! - Text, image and file-reference entries
//! - Polling on the clipboard change counter (no payload reads when idle)
//! - Duplicate captures collapse onto the existing entry
//! - Pinned entries are exempt from eviction
//! - Images re-encoded to JPEG full-size + thumbnail renditions
//! - SQLite persistence with content-addressed image blobs
//!
//! ## Module Structure
//! - `types`: Entry, payload and event types
//! - `ports`: Collaborator traits and `AppContext`
//! - `classifier`: Decides what a clipboard read becomes
//! - `image`: Image normalization
//! - `change_detection`: Change counter latch
//! - `monitor`: Poll schedule and authorization state
//! - `store`: In-memory history with dedup, pin and eviction
//! - `database` / `blob_store`: SQLite backend and image files
//! - `paste`: Writing entries back to the clipboard
//! - `history_worker`: Single owner thread and the `ClipboardHistory` handle

mod blob_store;
mod change_detection;
mod classifier;
mod database;
mod history_worker;
mod image;
mod monitor;
mod paste;
mod ports;
mod store;
mod types;

#[cfg(test)]
mod test_support;

pub use classifier::IMAGE_EXTENSIONS;
pub use database::{is_corruption_error, SqliteBackend, DB_FILE_NAME, LEGACY_DB_FILE_NAME};
pub use history_worker::{ClipboardHistory, TickOutcome, WorkerOptions};
pub use paste::PasteOutcome;
pub use ports::{
    AppContext, FrontmostApp, HistoryBackend, InputInjector, PermissionAuthority, RawImage,
    SystemClipboard,
};
pub use store::{HistoryStore, InsertOutcome, StoreLimits};
pub use types::{
    Candidate, EncodedImage, EntryId, EntryKind, EntryPayload, HistoryEntry, HistoryEvent,
    ImagePayload, Notice, RemovalReason, IMAGE_PREVIEW_LABEL,
};
