//! Binary data exchange for sync stores and rename-after-write file helpers.

use super::symbol::Symbol;
use super::sync_store::SyncStore;
use crate::core::{ModelError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const EXPORT_VERSION: u32 = 1;

// ============================================================================
// Atomic writes
// ============================================================================

/// Writes `bytes` next to `path` and renames the result over `path`.
///
/// Readers observe either the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| ModelError::Io(format!("Failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

pub fn save_binary<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = rmp_serde::to_vec(value).map_err(|e| ModelError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes)
}

pub fn load_binary<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| ModelError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    rmp_serde::from_read(BufReader::new(file)).map_err(|e| ModelError::Serialization(e.to_string()))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| ModelError::Serialization(e.to_string()))?;
    write_atomic(path, &bytes)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| ModelError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ModelError::Serialization(e.to_string()))
}

// ============================================================================
// Store export
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreExport {
    pub version: u32,
    pub name: String,
    pub exported_at: DateTime<Utc>,
    pub symbols: Vec<Symbol>,
}

impl StoreExport {
    pub fn record_count(&self) -> usize {
        self.symbols.iter().map(Symbol::number_records).sum()
    }
}

pub fn export_store(store: &SyncStore, path: &Path) -> Result<()> {
    let export = StoreExport {
        version: EXPORT_VERSION,
        name: store.name().to_string(),
        exported_at: Utc::now(),
        symbols: store.symbols().cloned().collect(),
    };
    save_binary(path, &export)
}

pub fn read_export(path: &Path) -> Result<StoreExport> {
    let export: StoreExport = load_binary(path)?;
    if export.version != EXPORT_VERSION {
        return Err(ModelError::Serialization(format!(
            "Unsupported store export version {} in {}",
            export.version,
            path.display()
        )));
    }
    Ok(export)
}

/// Loads an export into a fresh, unlocked store.
pub fn import_store(path: &Path, name: impl Into<String>) -> Result<SyncStore> {
    let export = read_export(path)?;
    Ok(SyncStore::from_symbols(name, export.symbols))
}
