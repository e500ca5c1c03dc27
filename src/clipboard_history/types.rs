//! Core clipboard history types

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ErrorSeverity;

/// Preview label shown for image entries
pub const IMAGE_PREVIEW_LABEL: &str = "Image";

/// Stable identity of a history entry (UUID v4, never reused)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(String);

impl EntryId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content kind, derived from the payload variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Text,
    Image,
    File,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Image => "image",
            EntryKind::File => "file",
        }
    }

    /// Parse a stored kind. Unknown values are rejected, never defaulted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(EntryKind::Text),
            "image" => Some(EntryKind::Image),
            "file" => Some(EntryKind::File),
            _ => None,
        }
    }
}

/// A re-encoded image rendition
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

// Keep logs readable: never dump image bytes
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Full-size and thumbnail renditions of a captured image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub full: EncodedImage,
    pub thumbnail: EncodedImage,
}

/// Captured clipboard content. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    Text(String),
    Image(ImagePayload),
    Files(Vec<PathBuf>),
}

impl EntryPayload {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPayload::Text(_) => EntryKind::Text,
            EntryPayload::Image(_) => EntryKind::Image,
            EntryPayload::Files(_) => EntryKind::File,
        }
    }

    /// Kind-specific duplicate check: exact text, exact full-size image
    /// bytes, or the exact ordered file list.
    pub fn is_duplicate_of(&self, other: &EntryPayload) -> bool {
        match (self, other) {
            (EntryPayload::Text(a), EntryPayload::Text(b)) => a == b,
            (EntryPayload::Image(a), EntryPayload::Image(b)) => a.full.bytes == b.full.bytes,
            (EntryPayload::Files(a), EntryPayload::Files(b)) => a == b,
            _ => false,
        }
    }
}

/// Truncate text to at most `char_limit` characters
pub fn text_preview(text: &str, char_limit: usize) -> String {
    text.chars().take(char_limit).collect()
}

/// Comma-joined base names of the referenced files
pub fn files_preview(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| base_name(p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// A captured clipboard item, before it has an identity in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub payload: EntryPayload,
    pub preview: String,
    pub source_application: Option<String>,
}

/// A stored clipboard history entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    /// Refreshed when a duplicate capture collapses onto this entry
    pub created_at: DateTime<Utc>,
    pub preview: String,
    pub payload: EntryPayload,
    pub source_application: Option<String>,
    pub pinned: bool,
}

impl HistoryEntry {
    pub fn kind(&self) -> EntryKind {
        self.payload.kind()
    }
}

/// Non-blocking, user-visible notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: ErrorSeverity,
    pub message: String,
}

/// Why entries left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Deleted,
    Evicted,
}

/// Change notifications broadcast to every subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A new entry was captured
    Inserted(HistoryEntry),
    /// A duplicate capture refreshed an existing entry
    Collapsed(HistoryEntry),
    PinChanged { id: EntryId, pinned: bool },
    Removed {
        ids: Vec<EntryId>,
        reason: RemovalReason,
    },
    Cleared,
    Notice(Notice),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: &[u8]) -> EntryPayload {
        let rendition = EncodedImage {
            bytes: bytes.to_vec(),
            width: 1,
            height: 1,
        };
        EntryPayload::Image(ImagePayload {
            full: rendition.clone(),
            thumbnail: EncodedImage {
                bytes: vec![9],
                ..rendition
            },
        })
    }

    #[test]
    fn test_entry_kind_conversion() {
        assert_eq!(EntryKind::Text.as_str(), "text");
        assert_eq!(EntryKind::parse("image"), Some(EntryKind::Image));
        assert_eq!(EntryKind::parse("file"), Some(EntryKind::File));
        assert_eq!(EntryKind::parse("unknown"), None);
    }

    #[test]
    fn test_text_preview_counts_chars_not_bytes() {
        let text = "é".repeat(150);
        let preview = text_preview(&text, 100);
        assert_eq!(preview.chars().count(), 100);
    }

    #[test]
    fn test_files_preview_joins_base_names() {
        let paths = vec![
            PathBuf::from("/Users/a/report.pdf"),
            PathBuf::from("/tmp/notes.txt"),
        ];
        assert_eq!(files_preview(&paths), "report.pdf, notes.txt");
    }

    #[test]
    fn test_duplicate_check_is_kind_specific() {
        let text = EntryPayload::Text("a".into());
        assert!(text.is_duplicate_of(&EntryPayload::Text("a".into())));
        assert!(!text.is_duplicate_of(&EntryPayload::Text("a ".into())));
        assert!(!text.is_duplicate_of(&EntryPayload::Files(vec![PathBuf::from("a")])));

        assert!(image(&[1, 2, 3]).is_duplicate_of(&image(&[1, 2, 3])));
        assert!(!image(&[1, 2, 3]).is_duplicate_of(&image(&[1, 2, 4])));

        let ab = EntryPayload::Files(vec![PathBuf::from("a"), PathBuf::from("b")]);
        let ba = EntryPayload::Files(vec![PathBuf::from("b"), PathBuf::from("a")]);
        assert!(!ab.is_duplicate_of(&ba), "file order matters");
    }

    #[test]
    fn test_entry_ids_are_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }
}
