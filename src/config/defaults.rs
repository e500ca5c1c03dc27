//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default clipboard polling interval (seconds)
pub const DEFAULT_POLLING_INTERVAL_SECONDS: f64 = 0.5;
/// Allowed range for the user-configured polling interval (seconds)
pub const MIN_POLLING_INTERVAL_SECONDS: f64 = 0.1;
pub const MAX_POLLING_INTERVAL_SECONDS: f64 = 2.0;
/// Interval floor applied while the host application is in the background
pub const BACKGROUND_POLLING_FLOOR_SECONDS: f64 = 1.0;

/// Default maximum number of unpinned history entries
pub const DEFAULT_MAX_UNPINNED_HISTORY_COUNT: usize = 30;
pub const MIN_MAX_UNPINNED_HISTORY_COUNT: usize = 5;
pub const MAX_MAX_UNPINNED_HISTORY_COUNT: usize = 30;

/// Default number of most-recent entries scanned for duplicates
pub const DEFAULT_DEDUP_CHECK_WINDOW: usize = 30;

/// Default character budget for text previews
pub const DEFAULT_PREVIEW_CHAR_LIMIT: usize = 100;

/// Default max text length for clipboard history entries (bytes)
pub const DEFAULT_MAX_TEXT_BYTES: usize = 100_000;

/// Default data directory (database, blobs, logs)
pub const DEFAULT_DATA_DIR: &str = "~/.clipkeep";

/// Config file name inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.json";
