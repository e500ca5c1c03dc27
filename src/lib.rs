//! clipkeep - clipboard history capture
//!
//! Watches the system clipboard, records text, images and file references
//! into a bounded SQLite-backed history, and pastes entries back on demand.

pub mod clipboard_history;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod scheduler;
