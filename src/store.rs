//! Registry persistence.
//!
//! The registry is stored as a pretty-printed JSON array of publications in
//! registry order. Writes go to a temporary file in the target directory which
//! then replaces the previous file, so an interrupted run never leaves a
//! half-written registry behind.

use crate::error::Result;
use crate::publication::{Publication, SkipRecord};
use crate::reconcile::Registry;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Atomically replace `path` with `bytes`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let temp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_bytes_atomic(path, &bytes)
}

/// File-backed registry store.
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry.
    ///
    /// A missing or unparseable file yields an empty registry; any other read
    /// failure is returned, since the run must not overwrite state it could not see.
    pub fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Registry file not found, starting empty");
            return Ok(Registry::new());
        }

        let content = std::fs::read(&self.path)?;
        match serde_json::from_slice::<Vec<Publication>>(&content) {
            Ok(publications) => {
                let registry = Registry::from_publications(publications);
                info!(path = %self.path.display(), count = registry.len(), "Loaded registry");
                Ok(registry)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Registry file is corrupt, starting empty");
                Ok(Registry::new())
            }
        }
    }

    /// Atomically write the whole registry.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        let publications: Vec<&Publication> = registry.publications().collect();
        write_json_atomic(&self.path, &publications)?;
        info!(path = %self.path.display(), count = publications.len(), "Saved registry");
        Ok(())
    }
}

/// Atomically write the skip log of the current run.
pub fn save_skip_log(path: &Path, skipped: &[SkipRecord]) -> Result<()> {
    write_json_atomic(path, skipped)?;
    info!(path = %path.display(), count = skipped.len(), "Saved skip log");
    Ok(())
}

/// Read a skip log; missing or unreadable logs count as empty.
pub fn load_skip_log(path: &Path) -> Vec<SkipRecord> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Failed to parse skip log");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    }
}
