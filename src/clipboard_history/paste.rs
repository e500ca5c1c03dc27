//! Paste executor
//!
//! Writes a stored entry back to the system clipboard and asks the input
//! injector for a paste keystroke.

use tracing::{debug, warn};

use super::ports::{InputInjector, SystemClipboard};
use super::types::{EntryId, EntryPayload, HistoryEntry, Notice};
use crate::error::{ClipboardHistoryError, ErrorSeverity, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteOutcome {
    pub id: EntryId,
    /// False when the clipboard was written but the keystroke could not be sent
    pub keystroke_sent: bool,
    pub keystroke_error: Option<String>,
}

impl PasteOutcome {
    /// User notification for a paste that only got halfway
    pub fn notice(&self) -> Option<Notice> {
        self.keystroke_error.as_ref().map(|msg| Notice {
            severity: ErrorSeverity::Warning,
            message: format!("Copied to clipboard, but the paste keystroke failed: {}", msg),
        })
    }
}

/// Write the entry's payload using the matching clipboard call
pub fn write_to_clipboard(clipboard: &dyn SystemClipboard, entry: &HistoryEntry) -> Result<()> {
    let written = match &entry.payload {
        EntryPayload::Text(text) => clipboard.write_text(text),
        EntryPayload::Image(image) => clipboard.write_image(&image.full),
        EntryPayload::Files(paths) => clipboard.write_file_list(paths),
    };
    written.map_err(|e| {
        warn!(id = %entry.id, error = %format!("{:#}", e), "Clipboard write failed");
        ClipboardHistoryError::PasteFailure(format!("{:#}", e))
    })
}

/// Write `entry` to the clipboard, run `after_write` (used to re-latch the
/// change counter), then request the paste keystroke.
///
/// A failed write returns `PasteFailure` and sends no keystroke. A failed
/// keystroke is reported in the outcome; the write stands.
pub fn paste_entry(
    clipboard: &dyn SystemClipboard,
    injector: &dyn InputInjector,
    entry: &HistoryEntry,
    after_write: impl FnOnce(),
) -> Result<PasteOutcome> {
    write_to_clipboard(clipboard, entry)?;
    after_write();

    let keystroke_error = match injector.send_paste_keystroke() {
        Ok(()) => None,
        Err(e) => {
            warn!(id = %entry.id, error = %format!("{:#}", e), "Paste keystroke failed");
            Some(format!("{:#}", e))
        }
    };

    debug!(id = %entry.id, kind = entry.kind().as_str(), "Pasted clipboard entry");
    Ok(PasteOutcome {
        id: entry.id.clone(),
        keystroke_sent: keystroke_error.is_none(),
        keystroke_error,
    })
}
