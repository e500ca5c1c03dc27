//! Configuration module - capture pipeline settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.clipkeep/config.json
//! - Default values and clamping ranges for all settings
//! - A live-updatable `Settings` handle shared with the history worker
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - `Config` and the `Settings` handle
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    BACKGROUND_POLLING_FLOOR_SECONDS, DEFAULT_DEDUP_CHECK_WINDOW,
    DEFAULT_MAX_UNPINNED_HISTORY_COUNT, DEFAULT_POLLING_INTERVAL_SECONDS,
    DEFAULT_PREVIEW_CHAR_LIMIT,
};
pub use loader::{default_config_path, load_config, load_config_from};
pub use types::{Config, Settings};

#[cfg(test)]
pub use defaults::{DEFAULT_MAX_TEXT_BYTES, MAX_POLLING_INTERVAL_SECONDS, MIN_POLLING_INTERVAL_SECONDS};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
