//! Collaborator interfaces consumed by the capture pipeline
//!
//! Everything that touches the operating system or disk sits behind one of
//! these traits. Real adapters live in `crate::platform` and
//! `database::SqliteBackend`; tests inject doubles through `AppContext`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::types::{EncodedImage, EntryId, HistoryEntry};
use crate::config::Settings;

/// Raw image data read from the clipboard, already encoded (PNG, TIFF, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
}

/// The shared system clipboard
pub trait SystemClipboard: Send + Sync {
    /// Opaque counter that changes whenever clipboard content changes
    fn change_count(&self) -> i64;
    fn read_text(&self) -> Option<String>;
    fn read_image(&self) -> Option<RawImage>;
    fn read_file_list(&self) -> Option<Vec<PathBuf>>;
    fn write_text(&self, text: &str) -> Result<()>;
    fn write_image(&self, image: &EncodedImage) -> Result<()>;
    fn write_file_list(&self, paths: &[PathBuf]) -> Result<()>;
}

pub trait PermissionAuthority: Send + Sync {
    /// `prompt_user` asks the OS to show its permission dialog when not yet granted
    fn is_authorized(&self, prompt_user: bool) -> bool;
}

pub trait InputInjector: Send + Sync {
    fn send_paste_keystroke(&self) -> Result<()>;
}

pub trait FrontmostApp: Send + Sync {
    fn frontmost_app_name(&self) -> Option<String>;
}

/// Durable storage for history entries.
///
/// Only the history worker thread calls into the backend, so implementations
/// need not be `Sync`.
pub trait HistoryBackend: Send {
    /// All stored entries, in any order
    fn load_all(&mut self) -> Result<Vec<HistoryEntry>>;
    fn insert(&mut self, entry: &HistoryEntry) -> Result<()>;
    /// Persist changed timestamp, source application and pin state
    fn update(&mut self, entry: &HistoryEntry) -> Result<()>;
    fn delete_many(&mut self, ids: &[EntryId]) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
    /// Back up the unusable store and recreate an empty one
    fn recover(&mut self) -> Result<()>;
    /// Whether `err` means the underlying store is corrupt (not just busy)
    fn is_corruption(&self, err: &anyhow::Error) -> bool;
}

/// Injected collaborators shared by the pipeline components
#[derive(Clone)]
pub struct AppContext {
    pub clipboard: Arc<dyn SystemClipboard>,
    pub permissions: Arc<dyn PermissionAuthority>,
    pub injector: Arc<dyn InputInjector>,
    pub frontmost: Arc<dyn FrontmostApp>,
    pub settings: Settings,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
