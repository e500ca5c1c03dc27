//! Clipboard history database operations
//!
//! SQLite persistence for history entries. Image renditions live in the
//! blob store and rows only hold their content references.
//!
//! Layout under the data directory:
//! - `clipkeep.sqlite` - the `entries` table
//! - `blobs/<sha256>.jpg` - image renditions
//!
//! An older `clipboard-history.sqlite` with a `history` table is adopted
//! and migrated when no current store exists.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::blob_store::BlobStore;
use super::image::normalize;
use super::ports::HistoryBackend;
use super::types::{
    files_preview, text_preview, EncodedImage, EntryId, EntryKind, EntryPayload, HistoryEntry,
    ImagePayload, IMAGE_PREVIEW_LABEL,
};
use crate::config::DEFAULT_PREVIEW_CHAR_LIMIT;
use crate::error::ResultExt;

pub const DB_FILE_NAME: &str = "clipkeep.sqlite";
pub const LEGACY_DB_FILE_NAME: &str = "clipboard-history.sqlite";
const BLOB_DIR_NAME: &str = "blobs";

/// SQLite-backed `HistoryBackend`
pub struct SqliteBackend {
    conn: Connection,
    db_path: PathBuf,
    blobs: BlobStore,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open the store in `data_dir`, adopting a legacy database if needed.
    ///
    /// A corrupt database file is backed up and replaced with an empty one.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_path = data_dir.join(DB_FILE_NAME);
        adopt_legacy_database(data_dir, &db_path)?;

        let blobs = BlobStore::open(data_dir.join(BLOB_DIR_NAME))?;

        let conn = match init_connection(&db_path, &blobs) {
            Ok(conn) => conn,
            Err(e) if is_corruption_error(&e) => {
                error!(error = %format!("{:#}", e), path = %db_path.display(), "Clipboard history database is corrupt, recreating");
                backup_database(&db_path)?;
                init_connection(&db_path, &blobs)
                    .context("Failed to recreate clipboard history database")?
            }
            Err(e) => return Err(e),
        };

        let backend = Self {
            conn,
            db_path,
            blobs,
        };
        backend.gc_blobs();
        Ok(backend)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn gc_blobs(&self) {
        match live_blob_refs(&self.conn) {
            Ok(live) => {
                if let Err(e) = self.blobs.gc_orphaned(&live) {
                    warn!(error = %format!("{:#}", e), "Blob garbage collection failed");
                }
            }
            Err(e) => warn!(error = %format!("{:#}", e), "Failed to list live blob references"),
        }
    }

    fn row_to_entry(&self, row: &StoredRow) -> Result<HistoryEntry> {
        let kind = EntryKind::parse(&row.kind)
            .with_context(|| format!("Unknown entry kind '{}'", row.kind))?;

        let payload = match kind {
            EntryKind::Text => EntryPayload::Text(
                row.text_content
                    .clone()
                    .context("Text entry has no content")?,
            ),
            EntryKind::File => {
                let raw = row.file_paths.as_deref().context("File entry has no paths")?;
                let paths: Vec<String> =
                    serde_json::from_str(raw).context("Failed to parse file paths")?;
                EntryPayload::Files(paths.into_iter().map(PathBuf::from).collect())
            }
            EntryKind::Image => EntryPayload::Image(ImagePayload {
                full: self.load_rendition(&row.image_ref, row.image_width, row.image_height)?,
                thumbnail: self.load_rendition(&row.thumb_ref, row.thumb_width, row.thumb_height)?,
            }),
        };

        let created_at = DateTime::<Utc>::from_timestamp_millis(row.created_at)
            .with_context(|| format!("Invalid timestamp {}", row.created_at))?;

        Ok(HistoryEntry {
            id: EntryId::from(row.id.clone()),
            created_at,
            preview: row.preview.clone(),
            payload,
            source_application: row.source_app.clone(),
            pinned: row.pinned,
        })
    }

    fn load_rendition(
        &self,
        reference: &Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<EncodedImage> {
        let reference = reference.as_deref().context("Image entry has no blob reference")?;
        Ok(EncodedImage {
            bytes: self.blobs.load(reference)?,
            width: width.unwrap_or(0),
            height: height.unwrap_or(0),
        })
    }

    fn release_blobs(&self, candidates: HashSet<String>) {
        for reference in candidates {
            match blob_is_referenced(&self.conn, &reference) {
                Ok(true) => {}
                Ok(false) => {
                    self.blobs.delete(&reference).warn_on_err();
                }
                Err(e) => warn!(error = %format!("{:#}", e), "Failed to check blob references"),
            }
        }
    }
}

impl HistoryBackend for SqliteBackend {
    fn load_all(&mut self) -> Result<Vec<HistoryEntry>> {
        let rows = {
            let mut stmt = self.conn.prepare(
                "SELECT id, kind, created_at, preview, text_content, file_paths,
                        image_ref, image_width, image_height,
                        thumb_ref, thumb_width, thumb_height, pinned, source_app
                 FROM entries ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([], StoredRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to read clipboard history rows")?;
            rows
        };

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.row_to_entry(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(id = %row.id, error = %format!("{:#}", e), "Skipping unreadable clipboard entry")
                }
            }
        }

        debug!(count = entries.len(), "Loaded clipboard history");
        Ok(entries)
    }

    fn insert(&mut self, entry: &HistoryEntry) -> Result<()> {
        let mut row = StoredRow::new(entry);
        if let EntryPayload::Image(image) = &entry.payload {
            row.image_ref = Some(self.blobs.store(&image.full.bytes)?);
            row.thumb_ref = Some(self.blobs.store(&image.thumbnail.bytes)?);
        }

        self.conn
            .execute(
                "INSERT INTO entries (id, kind, created_at, preview, text_content, file_paths,
                                      image_ref, image_width, image_height,
                                      thumb_ref, thumb_width, thumb_height, pinned, source_app)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    row.id,
                    row.kind,
                    row.created_at,
                    row.preview,
                    row.text_content,
                    row.file_paths,
                    row.image_ref,
                    row.image_width,
                    row.image_height,
                    row.thumb_ref,
                    row.thumb_width,
                    row.thumb_height,
                    row.pinned,
                    row.source_app,
                ],
            )
            .context("Failed to insert clipboard entry")?;

        debug!(id = %entry.id, kind = entry.kind().as_str(), "Inserted clipboard entry");
        Ok(())
    }

    fn update(&mut self, entry: &HistoryEntry) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE entries SET created_at = ?1, source_app = ?2, pinned = ?3 WHERE id = ?4",
                params![
                    entry.created_at.timestamp_millis(),
                    entry.source_application,
                    entry.pinned,
                    entry.id.as_str()
                ],
            )
            .context("Failed to update clipboard entry")?;
        if changed == 0 {
            anyhow::bail!("Clipboard entry {} is not stored", entry.id);
        }
        Ok(())
    }

    fn delete_many(&mut self, ids: &[EntryId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut released = HashSet::new();
        let tx = self.conn.transaction()?;
        {
            let mut refs = tx.prepare("SELECT image_ref, thumb_ref FROM entries WHERE id = ?1")?;
            let mut delete = tx.prepare("DELETE FROM entries WHERE id = ?1")?;
            for id in ids {
                let found = refs
                    .query_row([id.as_str()], |row| {
                        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
                    })
                    .optional()?;
                if let Some((full, thumb)) = found {
                    released.extend(full);
                    released.extend(thumb);
                }
                delete.execute([id.as_str()])?;
            }
        }
        tx.commit().context("Failed to delete clipboard entries")?;

        debug!(count = ids.len(), "Deleted clipboard entries");
        self.release_blobs(released);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM entries", [])
            .context("Failed to clear clipboard history")?;
        self.blobs.gc_orphaned(&HashSet::new())?;
        info!("Cleared clipboard history");
        Ok(())
    }

    fn recover(&mut self) -> Result<()> {
        // Release the file handle before moving the database aside
        let placeholder = Connection::open_in_memory()?;
        drop(std::mem::replace(&mut self.conn, placeholder));

        backup_database(&self.db_path)?;
        self.conn = init_connection(&self.db_path, &self.blobs)
            .context("Failed to recreate clipboard history database")?;
        self.gc_blobs();
        info!(path = %self.db_path.display(), "Recreated clipboard history database");
        Ok(())
    }

    fn is_corruption(&self, err: &anyhow::Error) -> bool {
        is_corruption_error(err)
    }
}

/// Whether any error in the chain is SQLite reporting an unusable file
pub fn is_corruption_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase)
        )
    })
}

/// Flat column values of one `entries` row
#[derive(Debug, Default)]
struct StoredRow {
    id: String,
    kind: String,
    created_at: i64,
    preview: String,
    text_content: Option<String>,
    file_paths: Option<String>,
    image_ref: Option<String>,
    image_width: Option<u32>,
    image_height: Option<u32>,
    thumb_ref: Option<String>,
    thumb_width: Option<u32>,
    thumb_height: Option<u32>,
    pinned: bool,
    source_app: Option<String>,
}

impl StoredRow {
    fn new(entry: &HistoryEntry) -> Self {
        let mut row = Self {
            id: entry.id.as_str().to_string(),
            kind: entry.kind().as_str().to_string(),
            created_at: entry.created_at.timestamp_millis(),
            preview: entry.preview.clone(),
            pinned: entry.pinned,
            source_app: entry.source_application.clone(),
            ..Default::default()
        };
        match &entry.payload {
            EntryPayload::Text(text) => row.text_content = Some(text.clone()),
            EntryPayload::Files(paths) => {
                let paths: Vec<String> = paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                // Serializing a Vec<String> cannot fail
                row.file_paths = serde_json::to_string(&paths).ok();
            }
            EntryPayload::Image(image) => {
                row.image_width = Some(image.full.width);
                row.image_height = Some(image.full.height);
                row.thumb_width = Some(image.thumbnail.width);
                row.thumb_height = Some(image.thumbnail.height);
            }
        }
        row
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            created_at: row.get(2)?,
            preview: row.get(3)?,
            text_content: row.get(4)?,
            file_paths: row.get(5)?,
            image_ref: row.get(6)?,
            image_width: row.get(7)?,
            image_height: row.get(8)?,
            thumb_ref: row.get(9)?,
            thumb_width: row.get(10)?,
            thumb_height: row.get(11)?,
            pinned: row.get(12)?,
            source_app: row.get(13)?,
        })
    }
}

fn init_connection(db_path: &Path, blobs: &BlobStore) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set database pragmas")?;

    create_schema(&conn)?;
    run_migrations(&conn)?;
    create_indexes(&conn)?;
    migrate_legacy_rows(&conn, blobs)?;

    debug!(path = %db_path.display(), "Clipboard history database initialized");
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            preview TEXT NOT NULL,
            text_content TEXT,
            file_paths TEXT,
            image_ref TEXT,
            image_width INTEGER,
            image_height INTEGER,
            thumb_ref TEXT,
            thumb_width INTEGER,
            thumb_height INTEGER,
            pinned INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .context("Failed to create entries table")?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "source_app", "TEXT")?;
    Ok(())
}

fn add_column_if_missing(conn: &Connection, name: &str, col_type: &str) -> Result<()> {
    let has: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('entries') WHERE name = ?1",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .map(|c| c > 0)
        .unwrap_or(false);

    if !has {
        conn.execute(
            &format!("ALTER TABLE entries ADD COLUMN {} {}", name, col_type),
            [],
        )
        .with_context(|| format!("Failed to add {} column", name))?;
        info!(column = name, "Added column to entries table");
    }
    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_created ON entries(created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_image_ref ON entries(image_ref)",
        [],
    )?;
    Ok(())
}

fn live_blob_refs(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT image_ref FROM entries WHERE image_ref IS NOT NULL
         UNION SELECT thumb_ref FROM entries WHERE thumb_ref IS NOT NULL",
    )?;
    let refs = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(refs)
}

fn blob_is_referenced(conn: &Connection, reference: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE image_ref = ?1 OR thumb_ref = ?1",
        [reference],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Move a corrupt database (and its WAL files) aside as `*.corrupt-<ts>.bak`
fn backup_database(db_path: &Path) -> Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    let backup = db_path.with_extension(format!("sqlite.corrupt-{}.bak", stamp));

    if db_path.exists() {
        fs::rename(db_path, &backup)
            .with_context(|| format!("Failed to back up database to {}", backup.display()))?;
        warn!(backup = %backup.display(), "Backed up corrupt clipboard history database");
    }
    for suffix in ["-wal", "-shm"] {
        let side = sidecar(db_path, suffix);
        if side.exists() {
            fs::remove_file(&side).log_err();
        }
    }
    Ok(backup)
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Rename a legacy database file into place when no current store exists.
/// Its `history` table is converted by `migrate_legacy_rows` on open.
fn adopt_legacy_database(data_dir: &Path, db_path: &Path) -> Result<()> {
    let legacy = data_dir.join(LEGACY_DB_FILE_NAME);
    if db_path.exists() || !legacy.exists() {
        return Ok(());
    }

    fs::rename(&legacy, db_path).with_context(|| {
        format!(
            "Failed to move legacy database {} into place",
            legacy.display()
        )
    })?;
    for suffix in ["-wal", "-shm"] {
        let side = sidecar(&legacy, suffix);
        if side.exists() {
            fs::rename(&side, sidecar(db_path, suffix))
                .with_context(|| format!("Failed to move {}", side.display()))?;
        }
    }
    info!(from = %legacy.display(), to = %db_path.display(), "Adopted legacy clipboard history database");
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Convert rows of a legacy `history` table into `entries`, then drop it.
///
/// Legacy text rows carry their content inline. Legacy image rows are
/// `blob:<hash>` references to PNG files in the blob directory and are
/// re-normalized; anything unreadable is skipped.
fn migrate_legacy_rows(conn: &Connection, blobs: &BlobStore) -> Result<()> {
    if !table_exists(conn, "history")? {
        return Ok(());
    }

    let legacy: Vec<(String, String, String, i64, bool)> = {
        let mut stmt = conn.prepare(
            "SELECT id, content, content_type, timestamp, COALESCE(pinned, 0) FROM history
             ORDER BY timestamp",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read legacy history rows")?;
        rows
    };

    let mut migrated = 0usize;
    let mut skipped = 0usize;
    // Legacy PNGs are only removed once the migrated rows are committed
    let mut adopted_blobs: Vec<PathBuf> = Vec::new();
    let tx = conn.unchecked_transaction()?;
    for (id, content, content_type, timestamp, pinned) in legacy {
        // Legacy rows may still hold second-resolution timestamps
        let created_at = if timestamp > 0 && timestamp < 100_000_000_000 {
            timestamp * 1000
        } else {
            timestamp
        };

        let mut row = StoredRow {
            id,
            created_at,
            pinned,
            ..Default::default()
        };
        match content_type.as_str() {
            "text" => {
                row.kind = EntryKind::Text.as_str().to_string();
                row.preview = text_preview(&content, DEFAULT_PREVIEW_CHAR_LIMIT);
                row.text_content = Some(content);
            }
            "file" => {
                let paths: Vec<PathBuf> = content.lines().map(PathBuf::from).collect();
                row.kind = EntryKind::File.as_str().to_string();
                row.preview = files_preview(&paths);
                row.file_paths = serde_json::to_string(
                    &paths
                        .iter()
                        .map(|p| p.to_string_lossy().into_owned())
                        .collect::<Vec<_>>(),
                )
                .ok();
            }
            "image" => match legacy_image(blobs, &content) {
                Ok((image, legacy_path)) => {
                    adopted_blobs.push(legacy_path);
                    row.kind = EntryKind::Image.as_str().to_string();
                    row.preview = IMAGE_PREVIEW_LABEL.to_string();
                    row.image_ref = Some(blobs.store(&image.full.bytes)?);
                    row.image_width = Some(image.full.width);
                    row.image_height = Some(image.full.height);
                    row.thumb_ref = Some(blobs.store(&image.thumbnail.bytes)?);
                    row.thumb_width = Some(image.thumbnail.width);
                    row.thumb_height = Some(image.thumbnail.height);
                }
                Err(e) => {
                    warn!(id = %row.id, error = %format!("{:#}", e), "Skipping legacy image entry");
                    skipped += 1;
                    continue;
                }
            },
            other => {
                warn!(id = %row.id, content_type = other, "Skipping legacy entry of unknown type");
                skipped += 1;
                continue;
            }
        }

        tx.execute(
            "INSERT OR IGNORE INTO entries (id, kind, created_at, preview, text_content, file_paths,
                                            image_ref, image_width, image_height,
                                            thumb_ref, thumb_width, thumb_height, pinned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.kind,
                row.created_at,
                row.preview,
                row.text_content,
                row.file_paths,
                row.image_ref,
                row.image_width,
                row.image_height,
                row.thumb_ref,
                row.thumb_width,
                row.thumb_height,
                row.pinned,
            ],
        )?;
        migrated += 1;
    }
    tx.execute("DROP TABLE history", [])?;
    tx.commit().context("Failed to migrate legacy history table")?;

    for path in &adopted_blobs {
        if let Err(e) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "Legacy blob left in place");
        }
    }
    info!(migrated, skipped, "Migrated legacy clipboard history");
    Ok(())
}

/// Decode a legacy `<hash>.png` blob; the file itself is left for the caller
fn legacy_image(blobs: &BlobStore, content: &str) -> Result<(ImagePayload, PathBuf)> {
    let hash = content
        .strip_prefix("blob:")
        .context("Legacy image is not a blob reference")?;
    let path = blobs.dir().join(format!("{}.png", hash));
    let bytes =
        fs::read(&path).with_context(|| format!("Failed to read legacy blob {}", path.display()))?;
    let image = normalize(&bytes)?;
    Ok((image, path))
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
