//! JSON snapshots of an in-memory database.
//!
//! Snapshots hold table contents only; row locks and statement counters are
//! not persisted.

use crate::error::{StorageError, StorageResult};
use crate::memory::{LobCell, MemoryDatabase};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Snapshot file format version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    tables: BTreeMap<String, BTreeMap<String, Option<Vec<u8>>>>,
}

impl MemoryDatabase {
    /// Writes all tables to a JSON snapshot file.
    ///
    /// The file is written to a sibling temporary path and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save_snapshot(&self, path: &Path) -> StorageResult<()> {
        let tables = self
            .export_tables()
            .into_iter()
            .map(|(name, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|(key, cell)| (key, cell.as_bytes().map(|b| b.to_vec())))
                    .collect();
                (name, rows)
            })
            .collect();
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            tables,
        };
        let json =
            serde_json::to_vec_pretty(&file).map_err(|e| StorageError::Snapshot(e.to_string()))?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a database from a JSON snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a snapshot, or has
    /// an unsupported version.
    pub fn load_snapshot(path: &Path) -> StorageResult<Self> {
        let json = fs::read(path)?;
        let file: SnapshotFile =
            serde_json::from_slice(&json).map_err(|e| StorageError::Snapshot(e.to_string()))?;
        if file.version != SNAPSHOT_VERSION {
            return Err(StorageError::Snapshot(format!(
                "unsupported snapshot version {}",
                file.version
            )));
        }

        let tables = file
            .tables
            .into_iter()
            .map(|(name, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|(key, data)| {
                        let cell = match data {
                            Some(data) => LobCell::Data(Bytes::from(data)),
                            None => LobCell::Null,
                        };
                        (key, cell)
                    })
                    .collect();
                (name, rows)
            })
            .collect();
        Ok(Self::with_tables(tables))
    }

    /// Loads a snapshot if the file exists, otherwise returns an empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be loaded.
    pub fn open_snapshot(path: &Path) -> StorageResult<Self> {
        if path.exists() {
            Self::load_snapshot(path)
        } else {
            Ok(Self::new())
        }
    }
}
