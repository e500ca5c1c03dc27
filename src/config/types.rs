//! Configuration type definitions

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::defaults::*;

/// User configuration loaded from ~/.clipkeep/config.json
///
/// Every field is optional; getters apply defaults and clamp to the
/// supported ranges so callers never see an out-of-range value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Clipboard polling interval in seconds (default: 0.5, range 0.1-2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_seconds: Option<f64>,
    /// Maximum number of unpinned entries kept (default: 30, range 5-30)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unpinned_history_count: Option<usize>,
    /// Number of most-recent entries checked for duplicates (default: 30)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_check_window: Option<usize>,
    /// Characters kept in text previews (default: 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_char_limit: Option<usize>,
    /// Maximum text entry size in bytes. 0 = no limit. (default: 100000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_text_bytes: Option<usize>,
    /// Directory holding the database and image blobs (default: ~/.clipkeep)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl Config {
    /// Polling interval clamped to [0.1s, 2.0s]
    pub fn polling_interval(&self) -> Duration {
        let secs = self
            .polling_interval_seconds
            .filter(|s| s.is_finite())
            .unwrap_or(DEFAULT_POLLING_INTERVAL_SECONDS)
            .clamp(MIN_POLLING_INTERVAL_SECONDS, MAX_POLLING_INTERVAL_SECONDS);
        Duration::from_secs_f64(secs)
    }

    /// Max unpinned entries clamped to [5, 30]
    pub fn max_unpinned_history_count(&self) -> usize {
        self.max_unpinned_history_count
            .unwrap_or(DEFAULT_MAX_UNPINNED_HISTORY_COUNT)
            .clamp(MIN_MAX_UNPINNED_HISTORY_COUNT, MAX_MAX_UNPINNED_HISTORY_COUNT)
    }

    pub fn dedup_check_window(&self) -> usize {
        self.dedup_check_window
            .unwrap_or(DEFAULT_DEDUP_CHECK_WINDOW)
            .max(1)
    }

    pub fn preview_char_limit(&self) -> usize {
        self.preview_char_limit
            .unwrap_or(DEFAULT_PREVIEW_CHAR_LIMIT)
            .max(1)
    }

    /// Returns max text size in bytes; `usize::MAX` when configured as 0
    pub fn max_text_bytes(&self) -> usize {
        match self.max_text_bytes.unwrap_or(DEFAULT_MAX_TEXT_BYTES) {
            0 => usize::MAX,
            n => n,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        let raw = self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR);
        PathBuf::from(shellexpand::tilde(raw).as_ref())
    }
}

/// Live-updatable configuration shared between the worker and its callers.
///
/// Cloning is cheap; all clones observe the same values.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    inner: Arc<RwLock<Config>>,
}

impl Settings {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> Config {
        self.inner.read().clone()
    }

    /// Apply a change in place. Tell the worker afterwards via
    /// `ClipboardHistory::settings_changed` so timers are re-evaluated.
    pub fn update<F: FnOnce(&mut Config)>(&self, f: F) {
        let mut guard = self.inner.write();
        f(&mut guard);
    }

    pub fn polling_interval(&self) -> Duration {
        self.inner.read().polling_interval()
    }

    pub fn max_unpinned_history_count(&self) -> usize {
        self.inner.read().max_unpinned_history_count()
    }

    pub fn dedup_check_window(&self) -> usize {
        self.inner.read().dedup_check_window()
    }

    pub fn preview_char_limit(&self) -> usize {
        self.inner.read().preview_char_limit()
    }

    pub fn max_text_bytes(&self) -> usize {
        self.inner.read().max_text_bytes()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.inner.read().data_dir()
    }
}
