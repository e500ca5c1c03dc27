//! File-based blob storage for clipboard images
//!
//! Image renditions are stored as JPEG files on disk instead of inside
//! SQLite, which keeps the database small and the WAL quiet.
//!
//! Storage location: <data_dir>/blobs/<sha256>.jpg
//! Content reference in the DB: "blob:<sha256>"

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BLOB_PREFIX: &str = "blob:";
const BLOB_EXTENSION: &str = "jpg";

/// Content-addressed store rooted at a single directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Open (creating if needed) the blob directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create blob directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store bytes and return the content reference ("blob:<hash>").
    /// Identical content is written once.
    pub fn store(&self, bytes: &[u8]) -> Result<String> {
        let hash = compute_blob_hash(bytes);
        let path = self.path_for(&hash);

        if path.exists() {
            debug!(hash = %hash, "Blob already exists, skipping write");
        } else {
            // Write then rename so a crash never leaves a truncated blob
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, bytes)
                .with_context(|| format!("Failed to write blob to {}", tmp.display()))?;
            fs::rename(&tmp, &path)
                .with_context(|| format!("Failed to move blob into {}", path.display()))?;
            debug!(hash = %hash, size = bytes.len(), "Stored new blob");
        }

        Ok(format!("{}{}", BLOB_PREFIX, hash))
    }

    pub fn load(&self, reference: &str) -> Result<Vec<u8>> {
        let hash = parse_reference(reference)?;
        let path = self.path_for(hash);
        fs::read(&path).with_context(|| format!("Failed to read blob {}", path.display()))
    }

    /// Remove a blob. Missing files are not an error.
    pub fn delete(&self, reference: &str) -> Result<bool> {
        let hash = parse_reference(reference)?;
        match fs::remove_file(self.path_for(hash)) {
            Ok(()) => {
                debug!(hash = %hash, "Deleted blob file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete blob {}", hash)),
        }
    }

    /// Delete every blob whose reference is not in `live`
    pub fn gc_orphaned(&self, live: &HashSet<String>) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).context("Failed to read blob directory")?;
        let mut deleted = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let is_blob = path.extension().is_some_and(|ext| ext == BLOB_EXTENSION);
            let is_partial = path.extension().is_some_and(|ext| ext == "tmp");
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let referenced = live.contains(&format!("{}{}", BLOB_PREFIX, stem));
            if is_partial || (is_blob && !referenced) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(hash = %stem, "GC'd orphaned blob");
                        deleted += 1;
                    }
                    Err(e) => warn!(hash = %stem, error = %e, "Failed to GC blob"),
                }
            }
        }

        if deleted > 0 {
            debug!(deleted, "Garbage collected orphaned blobs");
        }
        Ok(deleted)
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", hash, BLOB_EXTENSION))
    }
}

/// SHA-256 of the bytes, hex-encoded
pub fn compute_blob_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn parse_reference(reference: &str) -> Result<&str> {
    let hash = reference
        .strip_prefix(BLOB_PREFIX)
        .with_context(|| format!("Not a blob reference: {}", reference))?;
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        anyhow::bail!("Malformed blob hash: {}", hash);
    }
    Ok(hash)
}
