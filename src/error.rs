use thiserror::Error;
use tracing::{error, warn};

/// Error severity for notification display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // informational
    Warning,  // recoverable
    Error,    // operation failed
    Critical, // requires user action
}

/// Domain-specific errors for clipboard history
#[derive(Error, Debug)]
pub enum ClipboardHistoryError {
    #[error("Clipboard monitoring is not authorized")]
    AuthorizationDenied,

    #[error("Clipboard history item not found: {0}")]
    ItemNotFound(String),

    #[error("Failed to write to the clipboard: {0}")]
    PasteFailure(String),

    #[error("Image processing failed: {0}")]
    ImageProcessingFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Hotkey registration failed: {0}")]
    HotKeyRegistrationFailed(String),

    #[error("Clipboard history worker is not running")]
    WorkerUnavailable,
}

impl ClipboardHistoryError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AuthorizationDenied => ErrorSeverity::Critical,
            Self::ItemNotFound(_) => ErrorSeverity::Warning,
            Self::PasteFailure(_) => ErrorSeverity::Error,
            Self::ImageProcessingFailed(_) => ErrorSeverity::Info,
            Self::StorageError(_) => ErrorSeverity::Error,
            Self::HotKeyRegistrationFailed(_) => ErrorSeverity::Warning,
            Self::WorkerUnavailable => ErrorSeverity::Critical,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::AuthorizationDenied => {
                "Clipboard access needs permission. Grant it in system settings.".to_string()
            }
            Self::ItemNotFound(_) => "That clipboard item no longer exists".to_string(),
            Self::PasteFailure(msg) => format!("Could not paste: {}", msg),
            Self::ImageProcessingFailed(msg) => format!("Image skipped: {}", msg),
            Self::StorageError(msg) => format!("Clipboard history storage issue: {}", msg),
            Self::HotKeyRegistrationFailed(msg) => format!("Hotkey unavailable: {}", msg),
            Self::WorkerUnavailable => "Clipboard history is not running".to_string(),
        }
    }

    /// Wrap an anyhow error from the persistence layer, keeping its context chain.
    pub fn storage(err: &anyhow::Error) -> Self {
        Self::StorageError(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, ClipboardHistoryError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the user doesn't need to know.
///
/// # Examples
///
/// ```ignore
/// use clipkeep::error::ResultExt;
///
/// // Log and continue if the blob can't be removed
/// blob_store.delete(&hash).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

/// Panic in debug mode, log error in release mode.
///
/// Use for "impossible" states that should crash during development
/// but gracefully degrade in production.
#[macro_export]
macro_rules! debug_panic {
    ( $($fmt_arg:tt)* ) => {
        if cfg!(debug_assertions) {
            panic!( $($fmt_arg)* );
        } else {
            tracing::error!("IMPOSSIBLE STATE: {}", format_args!($($fmt_arg)*));
        }
    };
}
