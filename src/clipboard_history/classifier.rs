//! Clipboard content classification
//!
//! Decides what a clipboard read turns into. Precedence is strict:
//! image, then file references, then text. At most one candidate is
//! produced per read.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::ports::{FrontmostApp, SystemClipboard};
use super::types::{files_preview, text_preview, Candidate, EntryPayload};

/// File extensions treated as images when copied from a file manager
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "ico",
];

/// Limits applied while classifying
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    pub preview_char_limit: usize,
    pub max_text_bytes: usize,
}

#[derive(Debug)]
pub enum Classification {
    /// Nothing worth recording
    Nothing,
    Ready(Candidate),
    /// Raw image bytes that still need normalizing. `fallback` is recorded
    /// instead if normalization fails.
    PendingImage {
        bytes: Vec<u8>,
        source_application: Option<String>,
        fallback: Option<Candidate>,
    },
}

/// Read the clipboard and classify its content
pub fn classify(
    clipboard: &dyn SystemClipboard,
    frontmost: &dyn FrontmostApp,
    options: ClassifyOptions,
) -> Classification {
    let files = clipboard.read_file_list().filter(|f| !f.is_empty());

    if let Some(raw) = clipboard.read_image() {
        let source_application = frontmost.frontmost_app_name();
        let fallback = files
            .as_deref()
            .and_then(|files| files_fallback(files, source_application.clone()));
        debug!(size = raw.bytes.len(), "Classified clipboard content as image data");
        return Classification::PendingImage {
            bytes: raw.bytes,
            source_application,
            fallback,
        };
    }

    if let Some(files) = files {
        let source_application = frontmost.frontmost_app_name();

        if let Some(image_path) = files.iter().find(|p| is_image_path(p)) {
            let fallback = files_fallback(&files, source_application.clone());
            return match fs::read(image_path) {
                Ok(bytes) => {
                    debug!(path = %image_path.display(), "Classified clipboard content as image file");
                    Classification::PendingImage {
                        bytes,
                        source_application,
                        fallback,
                    }
                }
                Err(e) => {
                    warn!(path = %image_path.display(), error = %e, "Failed to read copied image file");
                    fallback.map_or(Classification::Nothing, Classification::Ready)
                }
            };
        }

        debug!(count = files.len(), "Classified clipboard content as files");
        return Classification::Ready(Candidate {
            preview: files_preview(&files),
            payload: EntryPayload::Files(files),
            source_application,
        });
    }

    if let Some(text) = clipboard.read_text().filter(|t| !t.is_empty()) {
        if text.len() > options.max_text_bytes {
            warn!(
                bytes = text.len(),
                limit = options.max_text_bytes,
                "Skipping oversized clipboard text"
            );
            return Classification::Nothing;
        }
        return Classification::Ready(Candidate {
            preview: text_preview(&text, options.preview_char_limit),
            payload: EntryPayload::Text(text),
            source_application: frontmost.frontmost_app_name(),
        });
    }

    Classification::Nothing
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// A file-list candidate, only when some of the files are not images
fn files_fallback(files: &[PathBuf], source_application: Option<String>) -> Option<Candidate> {
    if files.iter().all(|p| is_image_path(p)) {
        return None;
    }
    Some(Candidate {
        preview: files_preview(files),
        payload: EntryPayload::Files(files.to_vec()),
        source_application,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::test_support::{png_bytes, FakeClipboard, FakeFrontmost};
    use tempfile::tempdir;

    const OPTIONS: ClassifyOptions = ClassifyOptions {
        preview_char_limit: 5,
        max_text_bytes: 64,
    };

    fn run(clipboard: &FakeClipboard) -> Classification {
        let frontmost = FakeFrontmost::default();
        frontmost.set(Some("Safari"));
        classify(clipboard, &frontmost, OPTIONS)
    }

    #[test]
    fn test_text_is_truncated_for_preview() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_text("hello world");
        let Classification::Ready(candidate) = run(&clipboard) else {
            panic!("expected a text candidate");
        };
        assert_eq!(candidate.payload, EntryPayload::Text("hello world".into()));
        assert_eq!(candidate.preview, "hello");
        assert_eq!(candidate.source_application.as_deref(), Some("Safari"));
    }

    #[test]
    fn test_empty_and_oversized_text_yield_nothing() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_text("");
        assert!(matches!(run(&clipboard), Classification::Nothing));

        clipboard.copy_text(&"x".repeat(65));
        assert!(matches!(run(&clipboard), Classification::Nothing));
    }

    #[test]
    fn test_image_data_takes_precedence() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_image(png_bytes(4, 4));
        clipboard.state.lock().text = Some("alt text".into());
        match run(&clipboard) {
            Classification::PendingImage {
                source_application,
                fallback,
                ..
            } => {
                assert_eq!(source_application.as_deref(), Some("Safari"));
                assert!(fallback.is_none());
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_non_image_files() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_files(vec![PathBuf::from("/a/report.pdf"), PathBuf::from("/b/notes.txt")]);
        let Classification::Ready(candidate) = run(&clipboard) else {
            panic!("expected a file candidate");
        };
        assert_eq!(candidate.preview, "report.pdf, notes.txt");
    }

    #[test]
    fn test_first_image_file_is_read() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("shot.PNG");
        std::fs::write(&image, png_bytes(2, 2)).unwrap();

        let clipboard = FakeClipboard::default();
        clipboard.copy_files(vec![dir.path().join("doc.txt"), image]);
        match run(&clipboard) {
            Classification::PendingImage { bytes, fallback, .. } => {
                assert_eq!(bytes, png_bytes(2, 2));
                assert!(fallback.is_some(), "non-image files give a fallback");
            }
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_image_file_falls_back_to_files() {
        let clipboard = FakeClipboard::default();
        clipboard.copy_files(vec![PathBuf::from("/missing/pic.jpg"), PathBuf::from("/x/a.txt")]);
        assert!(matches!(run(&clipboard), Classification::Ready(_)));

        clipboard.copy_files(vec![PathBuf::from("/missing/pic.jpg")]);
        assert!(matches!(run(&clipboard), Classification::Nothing));
    }

    #[test]
    fn test_image_extensions() {
        for ext in IMAGE_EXTENSIONS {
            assert!(is_image_path(Path::new(&format!("f.{}", ext))));
        }
        assert!(!is_image_path(Path::new("f.svg")));
        assert!(!is_image_path(Path::new("png")));
    }
}
