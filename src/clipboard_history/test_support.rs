//! Test doubles for the pipeline's collaborators

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::ports::{
    AppContext, FrontmostApp, HistoryBackend, InputInjector, PermissionAuthority, RawImage,
    SystemClipboard,
};
use super::types::{
    Candidate, EncodedImage, EntryId, EntryPayload, HistoryEntry, ImagePayload,
};
use crate::config::{Config, Settings};

pub fn text_entry(text: &str, created_at: DateTime<Utc>) -> HistoryEntry {
    HistoryEntry {
        id: EntryId::new(),
        created_at,
        preview: text.to_string(),
        payload: EntryPayload::Text(text.to_string()),
        source_application: None,
        pinned: false,
    }
}

pub fn text_candidate(text: &str, app: Option<&str>) -> Candidate {
    Candidate {
        payload: EntryPayload::Text(text.to_string()),
        preview: text.to_string(),
        source_application: app.map(str::to_string),
    }
}

/// Image payload whose renditions are arbitrary (not decodable) bytes
pub fn image_payload(bytes: &[u8]) -> ImagePayload {
    let mut thumbnail = bytes.to_vec();
    thumbnail.push(0xff);
    ImagePayload {
        full: EncodedImage {
            bytes: bytes.to_vec(),
            width: 640,
            height: 480,
        },
        thumbnail: EncodedImage {
            bytes: thumbnail,
            width: 256,
            height: 192,
        },
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

/// Error a `MemoryBackend` reports as corruption
#[derive(Debug, thiserror::Error)]
#[error("database disk image is malformed")]
pub struct Corrupt;

#[derive(Debug, Default)]
pub struct MemoryState {
    pub rows: Vec<HistoryEntry>,
    pub fail_writes: bool,
    /// Number of upcoming writes that fail with `Corrupt`
    pub corrupt_writes: usize,
    pub corrupt_load: bool,
    pub fail_recover: bool,
    pub recoveries: usize,
    pub writes: usize,
}

/// In-memory `HistoryBackend` whose state stays inspectable from the test
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn HistoryBackend> {
        Box::new(self.clone())
    }

    fn check_write(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.corrupt_writes > 0 {
            state.corrupt_writes -= 1;
            return Err(Corrupt.into());
        }
        if state.fail_writes {
            anyhow::bail!("disk I/O error");
        }
        state.writes += 1;
        Ok(())
    }
}

impl HistoryBackend for MemoryBackend {
    fn load_all(&mut self) -> Result<Vec<HistoryEntry>> {
        let state = self.state.lock();
        if state.corrupt_load {
            return Err(Corrupt.into());
        }
        Ok(state.rows.clone())
    }

    fn insert(&mut self, entry: &HistoryEntry) -> Result<()> {
        self.check_write()?;
        self.state.lock().rows.push(entry.clone());
        Ok(())
    }

    fn update(&mut self, entry: &HistoryEntry) -> Result<()> {
        self.check_write()?;
        let mut state = self.state.lock();
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.id == entry.id)
            .ok_or_else(|| anyhow::anyhow!("no such row"))?;
        *row = entry.clone();
        Ok(())
    }

    fn delete_many(&mut self, ids: &[EntryId]) -> Result<()> {
        self.check_write()?;
        self.state.lock().rows.retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.check_write()?;
        self.state.lock().rows.clear();
        Ok(())
    }

    fn recover(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_recover {
            anyhow::bail!("cannot recreate store");
        }
        state.recoveries += 1;
        state.rows.clear();
        state.corrupt_load = false;
        Ok(())
    }

    fn is_corruption(&self, err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.is::<Corrupt>())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardWrite {
    Text(String),
    Image(Vec<u8>),
    Files(Vec<PathBuf>),
}

#[derive(Debug, Default)]
pub struct ClipboardState {
    pub change_count: i64,
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    pub files: Option<Vec<PathBuf>>,
    pub writes: Vec<ClipboardWrite>,
    pub reads: usize,
    pub fail_writes: bool,
}

/// Scriptable clipboard. Writes bump the change count like a real pasteboard.
#[derive(Debug, Default)]
pub struct FakeClipboard {
    pub state: Mutex<ClipboardState>,
}

impl FakeClipboard {
    /// Replace the clipboard content with text, as another app would
    pub fn copy_text(&self, text: &str) {
        let mut state = self.state.lock();
        state.text = Some(text.to_string());
        state.image = None;
        state.files = None;
        state.change_count += 1;
    }

    pub fn copy_image(&self, bytes: Vec<u8>) {
        let mut state = self.state.lock();
        state.text = None;
        state.image = Some(bytes);
        state.files = None;
        state.change_count += 1;
    }

    pub fn copy_files(&self, files: Vec<PathBuf>) {
        let mut state = self.state.lock();
        state.text = None;
        state.image = None;
        state.files = Some(files);
        state.change_count += 1;
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }

    pub fn writes(&self) -> Vec<ClipboardWrite> {
        self.state.lock().writes.clone()
    }

    fn record_write(&self, write: ClipboardWrite) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_writes {
            anyhow::bail!("pasteboard is locked");
        }
        state.writes.push(write);
        state.change_count += 1;
        Ok(())
    }
}

impl SystemClipboard for FakeClipboard {
    fn change_count(&self) -> i64 {
        self.state.lock().change_count
    }

    fn read_text(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.text.clone()
    }

    fn read_image(&self) -> Option<RawImage> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.image.clone().map(|bytes| RawImage { bytes })
    }

    fn read_file_list(&self) -> Option<Vec<PathBuf>> {
        let mut state = self.state.lock();
        state.reads += 1;
        state.files.clone()
    }

    fn write_text(&self, text: &str) -> Result<()> {
        self.record_write(ClipboardWrite::Text(text.to_string()))
    }

    fn write_image(&self, image: &EncodedImage) -> Result<()> {
        self.record_write(ClipboardWrite::Image(image.bytes.clone()))
    }

    fn write_file_list(&self, paths: &[PathBuf]) -> Result<()> {
        self.record_write(ClipboardWrite::Files(paths.to_vec()))
    }
}

#[derive(Debug)]
pub struct FakePermissions {
    pub granted: AtomicBool,
}

impl FakePermissions {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
        }
    }
}

impl PermissionAuthority for FakePermissions {
    fn is_authorized(&self, _prompt_user: bool) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct FakeInjector {
    pub keystrokes: AtomicUsize,
    pub fail: AtomicBool,
}

impl InputInjector for FakeInjector {
    fn send_paste_keystroke(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("event tap disabled");
        }
        self.keystrokes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeFrontmost {
    pub name: Mutex<Option<String>>,
}

impl FakeFrontmost {
    pub fn set(&self, name: Option<&str>) {
        *self.name.lock() = name.map(str::to_string);
    }
}

impl FrontmostApp for FakeFrontmost {
    fn frontmost_app_name(&self) -> Option<String> {
        self.name.lock().clone()
    }
}

/// Handles to the doubles injected into a test `AppContext`
#[derive(Debug, Clone)]
pub struct Fakes {
    pub clipboard: Arc<FakeClipboard>,
    pub permissions: Arc<FakePermissions>,
    pub injector: Arc<FakeInjector>,
    pub frontmost: Arc<FakeFrontmost>,
    pub settings: Settings,
}

pub fn fake_context(config: Config) -> (AppContext, Fakes) {
    let fakes = Fakes {
        clipboard: Arc::new(FakeClipboard::default()),
        permissions: Arc::new(FakePermissions::new(true)),
        injector: Arc::new(FakeInjector::default()),
        frontmost: Arc::new(FakeFrontmost::default()),
        settings: Settings::new(config),
    };
    let ctx = AppContext {
        clipboard: fakes.clipboard.clone(),
        permissions: fakes.permissions.clone(),
        injector: fakes.injector.clone(),
        frontmost: fakes.frontmost.clone(),
        settings: fakes.settings.clone(),
    };
    (ctx, fakes)
}
