//! Real operating-system adapters for the capture pipeline
//!
//! - `ArboardClipboard`: clipboard reads and writes via arboard, plus the
//!   NSPasteboard change counter on macOS
//! - `SystemPermissions`: macOS Accessibility trust
//! - `SystemInjector`: Cmd+V through Core Graphics
//! - `SystemFrontmostApp`: NSWorkspace menu-bar-owning application
//!
//! Outside macOS the clipboard still works through arboard, the change
//! counter falls back to content fingerprinting, and keystroke injection is
//! unavailable.

use anyhow::{Context, Result};
use arboard::{Clipboard, ImageData};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::clipboard_history::{
    AppContext, EncodedImage, FrontmostApp, InputInjector, PermissionAuthority, RawImage,
    SystemClipboard,
};
use crate::config::Settings;

/// Build an `AppContext` wired to the real system
pub fn system_context(settings: Settings) -> AppContext {
    AppContext {
        clipboard: Arc::new(ArboardClipboard::new()),
        permissions: Arc::new(SystemPermissions),
        injector: Arc::new(SystemInjector),
        frontmost: Arc::new(SystemFrontmostApp),
        settings,
    }
}

// ============================================================================
// Clipboard
// ============================================================================

/// System clipboard backed by arboard.
///
/// A fresh `arboard::Clipboard` is opened per call; holding one open keeps
/// an X11 connection alive on Linux and isn't needed on macOS.
#[derive(Debug, Default)]
pub struct ArboardClipboard {
    #[cfg(not(target_os = "macos"))]
    fingerprint: parking_lot::Mutex<Fingerprint>,
}

#[cfg(not(target_os = "macos"))]
#[derive(Debug, Default)]
struct Fingerprint {
    last: Option<u64>,
    count: i64,
}

#[cfg(not(target_os = "macos"))]
impl Fingerprint {
    /// Bump the counter when the content hash moved
    fn observe(&mut self, hash: u64) -> i64 {
        if self.last != Some(hash) {
            self.last = Some(hash);
            self.count += 1;
        }
        self.count
    }
}

/// Bytes sampled from an image buffer when fingerprinting it
#[cfg(not(target_os = "macos"))]
const IMAGE_SAMPLE_POINTS: usize = 64;

/// Hash of what is on the clipboard, cheap enough to compute every tick.
///
/// Images contribute their dimensions, length and a strided byte sample
/// rather than the whole buffer.
#[cfg(not(target_os = "macos"))]
fn content_hash(
    text: Option<&str>,
    files: Option<&[PathBuf]>,
    image: Option<&ImageData>,
) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    files.hash(&mut hasher);
    if let Some(image) = image {
        (image.width, image.height, image.bytes.len()).hash(&mut hasher);
        let stride = (image.bytes.len() / IMAGE_SAMPLE_POINTS).max(1);
        for byte in image.bytes.iter().step_by(stride) {
            byte.hash(&mut hasher);
        }
    }
    hasher.finish()
}

impl ArboardClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn open() -> Result<Clipboard> {
        Clipboard::new().context("Failed to open system clipboard")
    }
}

impl SystemClipboard for ArboardClipboard {
    #[cfg(target_os = "macos")]
    fn change_count(&self) -> i64 {
        pasteboard_change_count().unwrap_or(0)
    }

    /// No OS counter here: hash the clipboard content and bump a local
    /// counter whenever the hash moves. The image is only fetched when
    /// there is neither text nor a file list.
    #[cfg(not(target_os = "macos"))]
    fn change_count(&self) -> i64 {
        let mut clipboard = match Self::open() {
            Ok(clipboard) => clipboard,
            Err(_) => return self.fingerprint.lock().count,
        };
        let text = clipboard.get_text().ok();
        let files = clipboard.get().file_list().ok().filter(|f| !f.is_empty());
        let image = if text.is_none() && files.is_none() {
            clipboard.get_image().ok()
        } else {
            None
        };

        let hash = content_hash(text.as_deref(), files.as_deref(), image.as_ref());
        self.fingerprint.lock().observe(hash)
    }

    fn read_text(&self) -> Option<String> {
        Self::open().ok()?.get_text().ok()
    }

    fn read_image(&self) -> Option<RawImage> {
        let image = Self::open().ok()?.get_image().ok()?;
        match rgba_to_png(&image) {
            Ok(bytes) => Some(RawImage { bytes }),
            Err(e) => {
                warn!(error = %e, "Clipboard image could not be re-encoded");
                None
            }
        }
    }

    fn read_file_list(&self) -> Option<Vec<PathBuf>> {
        let files = Self::open().ok()?.get().file_list().ok()?;
        (!files.is_empty()).then_some(files)
    }

    fn write_text(&self, text: &str) -> Result<()> {
        Self::open()?
            .set_text(text.to_string())
            .context("Failed to write text to clipboard")
    }

    fn write_image(&self, image: &EncodedImage) -> Result<()> {
        let rgba = image::load_from_memory(&image.bytes)
            .context("Failed to decode stored image")?
            .to_rgba8();
        let data = ImageData {
            width: rgba.width() as usize,
            height: rgba.height() as usize,
            bytes: rgba.into_raw().into(),
        };
        Self::open()?
            .set_image(data)
            .context("Failed to write image to clipboard")
    }

    #[cfg(target_os = "macos")]
    fn write_file_list(&self, paths: &[PathBuf]) -> Result<()> {
        write_file_urls(paths)
    }

    /// arboard can't write file references here; paste the paths as text
    #[cfg(not(target_os = "macos"))]
    fn write_file_list(&self, paths: &[PathBuf]) -> Result<()> {
        let joined = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        self.write_text(&joined)
    }
}

fn rgba_to_png(image: &ImageData) -> Result<Vec<u8>> {
    let rgba = image::RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.to_vec(),
    )
    .context("Failed to create RGBA image from clipboard data")?;

    let mut png = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png)
}

/// NSPasteboard.generalPasteboard.changeCount; a cheap integer read
#[cfg(target_os = "macos")]
fn pasteboard_change_count() -> Option<i64> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::nil;
    use objc::runtime::Object;

    unsafe {
        let pasteboard: *mut Object = NSPasteboard::generalPasteboard(nil);
        if pasteboard.is_null() {
            return None;
        }
        let change_count: i64 = objc::msg_send![pasteboard, changeCount];
        Some(change_count)
    }
}

#[cfg(target_os = "macos")]
fn write_file_urls(paths: &[PathBuf]) -> Result<()> {
    use cocoa::appkit::NSPasteboard;
    use cocoa::base::{id, nil, BOOL, NO};
    use cocoa::foundation::{NSArray, NSString};
    use objc::{class, msg_send, sel, sel_impl};

    unsafe {
        let pasteboard: id = NSPasteboard::generalPasteboard(nil);
        anyhow::ensure!(!pasteboard.is_null(), "General pasteboard unavailable");

        let urls: Vec<id> = paths
            .iter()
            .map(|path| {
                let ns_path = NSString::alloc(nil).init_str(&path.to_string_lossy());
                let url: id = msg_send![class!(NSURL), fileURLWithPath: ns_path];
                url
            })
            .collect();
        let array = NSArray::arrayWithObjects(nil, &urls);

        let _: i64 = msg_send![pasteboard, clearContents];
        let ok: BOOL = msg_send![pasteboard, writeObjects: array];
        anyhow::ensure!(ok != NO, "Pasteboard rejected file references");
    }
    tracing::debug!(count = paths.len(), "Wrote file references to pasteboard");
    Ok(())
}

// ============================================================================
// Permissions
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPermissions;

impl PermissionAuthority for SystemPermissions {
    #[cfg(target_os = "macos")]
    #[tracing::instrument(skip(self))]
    fn is_authorized(&self, prompt_user: bool) -> bool {
        use macos_accessibility_client::accessibility;

        let granted = if prompt_user {
            tracing::info!("Requesting accessibility permission");
            accessibility::application_is_trusted_with_prompt()
        } else {
            accessibility::application_is_trusted()
        };
        tracing::debug!(granted, "Checked accessibility permission");
        granted
    }

    /// Clipboard access is not gated on other platforms
    #[cfg(not(target_os = "macos"))]
    fn is_authorized(&self, _prompt_user: bool) -> bool {
        true
    }
}

// ============================================================================
// Keystroke injection
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInjector;

impl InputInjector for SystemInjector {
    #[cfg(target_os = "macos")]
    fn send_paste_keystroke(&self) -> Result<()> {
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
        use std::thread;
        use std::time::Duration;

        // 'v' is keycode 9
        const KEY_V: CGKeyCode = 9;

        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .ok()
            .context("Failed to create CGEventSource")?;

        let key_down = CGEvent::new_keyboard_event(source.clone(), KEY_V, true)
            .ok()
            .context("Failed to create key down event")?;
        key_down.set_flags(CGEventFlags::CGEventFlagCommand);

        let key_up = CGEvent::new_keyboard_event(source, KEY_V, false)
            .ok()
            .context("Failed to create key up event")?;
        key_up.set_flags(CGEventFlags::CGEventFlagCommand);

        key_down.post(CGEventTapLocation::HID);
        thread::sleep(Duration::from_millis(5));
        key_up.post(CGEventTapLocation::HID);

        tracing::debug!("Simulated Cmd+V via Core Graphics");
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn send_paste_keystroke(&self) -> Result<()> {
        anyhow::bail!("Paste keystroke injection is only supported on macOS")
    }
}

// ============================================================================
// Frontmost application
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFrontmostApp;

impl FrontmostApp for SystemFrontmostApp {
    #[cfg(target_os = "macos")]
    fn frontmost_app_name(&self) -> Option<String> {
        use objc::runtime::{Class, Object};
        use objc::{msg_send, sel, sel_impl};

        unsafe {
            let workspace_class = Class::get("NSWorkspace")?;
            let workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
            if workspace.is_null() {
                return None;
            }
            // menuBarOwningApplication stays correct while we run as an agent app
            let app: *mut Object = msg_send![workspace, menuBarOwningApplication];
            if app.is_null() {
                return None;
            }
            get_nsstring(msg_send![app, localizedName])
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn frontmost_app_name(&self) -> Option<String> {
        None
    }
}

#[cfg(target_os = "macos")]
unsafe fn get_nsstring(nsstring: *mut objc::runtime::Object) -> Option<String> {
    use objc::{msg_send, sel, sel_impl};

    if nsstring.is_null() {
        return None;
    }
    let utf8: *const std::os::raw::c_char = msg_send![nsstring, UTF8String];
    if utf8.is_null() {
        return None;
    }
    std::ffi::CStr::from_ptr(utf8)
        .to_str()
        .ok()
        .map(|s| s.to_string())
}

// ============================================================================
// System Tests (require `--features system-tests`)
// ============================================================================
// These touch the real clipboard and may overwrite whatever is on it.

#[cfg(all(test, not(target_os = "macos")))]
mod fingerprint_tests {
    use super::*;

    fn image(width: usize, height: usize, fill: u8) -> ImageData<'static> {
        ImageData {
            width,
            height,
            bytes: vec![fill; width * height * 4].into(),
        }
    }

    #[test]
    fn test_file_list_change_moves_hash() {
        let a = [PathBuf::from("/tmp/a.txt")];
        let b = [PathBuf::from("/tmp/b.txt")];
        assert_ne!(
            content_hash(None, Some(&a), None),
            content_hash(None, Some(&b), None)
        );
        assert_eq!(
            content_hash(None, Some(&a), None),
            content_hash(None, Some(&a), None)
        );
    }

    #[test]
    fn test_same_size_image_with_new_pixels_moves_hash() {
        assert_ne!(
            content_hash(None, None, Some(&image(8, 8, 0))),
            content_hash(None, None, Some(&image(8, 8, 255)))
        );
    }

    #[test]
    fn test_counter_only_advances_on_new_hash() {
        let mut fp = Fingerprint::default();
        assert_eq!(fp.observe(1), 1);
        assert_eq!(fp.observe(1), 1);
        assert_eq!(fp.observe(2), 2);
        assert_eq!(fp.observe(1), 3);
    }
}

#[cfg(all(test, feature = "system-tests"))]
mod system_tests {
    use super::*;

    #[test]
    fn test_text_roundtrip_bumps_change_count() {
        let clipboard = ArboardClipboard::new();
        let before = clipboard.change_count();
        let marker = format!("clipkeep-system-test-{}", uuid::Uuid::new_v4());

        clipboard.write_text(&marker).unwrap();
        assert_eq!(clipboard.read_text().as_deref(), Some(marker.as_str()));
        assert_ne!(clipboard.change_count(), before);
    }

    #[test]
    fn test_image_write_reads_back_as_png() {
        let clipboard = ArboardClipboard::new();
        let rgba = image::RgbaImage::from_pixel(8, 4, image::Rgba([10, 20, 30, 255]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgba8(rgba)
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        clipboard
            .write_image(&EncodedImage {
                bytes: jpeg,
                width: 8,
                height: 4,
            })
            .unwrap();

        let raw = clipboard.read_image().expect("image on clipboard");
        let decoded = image::load_from_memory(&raw.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }

    #[test]
    fn test_permission_check_does_not_prompt() {
        // Only verifies the call completes without a dialog
        let _ = SystemPermissions.is_authorized(false);
    }

    #[test]
    fn test_frontmost_app_lookup_completes() {
        let _ = SystemFrontmostApp.frontmost_app_name();
    }
}
