//! clipkeep command-line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use clipkeep::clipboard_history::{ClipboardHistory, EntryId, HistoryEntry, HistoryEvent};
use clipkeep::config::{self, Settings};
use clipkeep::error::ClipboardHistoryError;
use clipkeep::platform;

/// How often `watch` re-checks a missing clipboard permission
const PERMISSION_RECHECK: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "clipkeep")]
#[command(version, about = "Clipboard history capture", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.clipkeep/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record clipboard changes until stdin closes or `q` is entered
    Watch {
        /// Poll at the background rate, as if the app were not frontmost
        #[arg(long)]
        background: bool,
    },
    /// Print recent entries, newest first
    List {
        #[arg(short, long, default_value_t = 30)]
        limit: usize,
    },
    /// Write an entry back to the clipboard and send the paste keystroke
    Paste { id: String },
    /// Pin or unpin an entry
    Pin { id: String },
    /// Delete an entry
    Delete { id: String },
    /// Delete every entry, pinned ones included
    Clear,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = clipkeep::logging::init();

    let config = match &args.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let settings = Settings::new(config);
    let ctx = platform::system_context(settings);
    let permissions = ctx.permissions.clone();

    let history = ClipboardHistory::open(ctx).context("Failed to start clipboard history")?;

    let result = match args.command {
        Command::Watch { background } => watch(&history, permissions.as_ref(), background),
        Command::List { limit } => {
            for entry in history.recent(limit) {
                print_entry(&entry);
            }
            Ok(())
        }
        Command::Paste { id } => history
            .paste_item(&EntryId::from(id))
            .map(|outcome| {
                if let Some(err) = outcome.keystroke_error {
                    println!("Copied to clipboard; paste keystroke failed: {}", err);
                } else {
                    println!("Pasted {}", outcome.id);
                }
            })
            .map_err(user_error),
        Command::Pin { id } => history
            .toggle_pin(&EntryId::from(id))
            .map(|entry| {
                let state = if entry.pinned { "Pinned" } else { "Unpinned" };
                println!("{} {}", state, entry.id);
            })
            .map_err(user_error),
        Command::Delete { id } => history
            .delete(&EntryId::from(id))
            .map(|()| println!("Deleted"))
            .map_err(user_error),
        Command::Clear => history
            .clear_all()
            .map(|()| println!("History cleared"))
            .map_err(user_error),
    };

    history.shutdown();
    result
}

fn watch(
    history: &ClipboardHistory,
    permissions: &dyn clipkeep::clipboard_history::PermissionAuthority,
    background: bool,
) -> Result<()> {
    let events = history.subscribe().map_err(user_error)?;
    if background {
        history.set_app_active(false).map_err(user_error)?;
    }

    let mut authorized = match history.start_monitoring() {
        Ok(()) => true,
        Err(ClipboardHistoryError::AuthorizationDenied) => {
            eprintln!("{}", ClipboardHistoryError::AuthorizationDenied.user_message());
            false
        }
        Err(e) => return Err(user_error(e)),
    };
    info!(authorized, "Watching clipboard");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = quit.clone();
        thread::Builder::new()
            .name("stdin-watch".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) if line.trim() == "q" => break,
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                }
                quit.store(true, Ordering::SeqCst);
            })
            .context("Failed to spawn stdin watcher")?;
    }

    let mut since_permission_check = Duration::ZERO;
    let step = Duration::from_millis(250);
    while !quit.load(Ordering::SeqCst) {
        match events.recv_timeout(step) {
            Ok(event) => print_event(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("History worker stopped");
                break;
            }
        }

        if !authorized {
            since_permission_check += step;
            if since_permission_check >= PERMISSION_RECHECK {
                since_permission_check = Duration::ZERO;
                if permissions.is_authorized(false) {
                    authorized = true;
                    history.set_authorization(true).map_err(user_error)?;
                }
            }
        }
    }

    history.stop_monitoring().map_err(user_error)?;
    info!("Stopped watching clipboard");
    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    let pin = if entry.pinned { "*" } else { " " };
    let source = entry.source_application.as_deref().unwrap_or("-");
    println!(
        "{} {} {} [{}] ({}) {}",
        pin,
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.kind().as_str(),
        source,
        entry.preview
    );
}

fn print_event(event: &HistoryEvent) {
    match event {
        HistoryEvent::Inserted(entry) => print_entry(entry),
        HistoryEvent::Collapsed(entry) => {
            println!("~ {} moved to top ({})", entry.id, entry.preview)
        }
        HistoryEvent::PinChanged { id, pinned } => println!("~ {} pinned={}", id, pinned),
        HistoryEvent::Removed { ids, reason } => {
            for id in ids {
                println!("- {} ({:?})", id, reason);
            }
        }
        HistoryEvent::Cleared => println!("- all entries cleared"),
        HistoryEvent::Notice(notice) => eprintln!("[{:?}] {}", notice.severity, notice.message),
    }
}

fn user_error(err: ClipboardHistoryError) -> anyhow::Error {
    anyhow::anyhow!(err.user_message())
}
