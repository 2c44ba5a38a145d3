/*
 * This file is part of Tempsense Exporter.
 *
 * Copyright (C) 2025 Tempsense Exporter contributors
 *
 * Tempsense Exporter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tempsense Exporter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tempsense Exporter. If not, see <https://www.gnu.org/licenses/>.
 */

//! Operator-supplied sensor metadata, hot-reloaded from a CSV file.
//!
//! The file has a header row (ignored) followed by rows of
//! `ordinal,canonical-address,display-name,sensor-type`. Only plain comma
//! splitting is supported; rows with fewer than four columns are skipped.
//! The address column must carry the canonical form produced by
//! [`crate::address::normalize`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Columns a row must provide to be accepted; extra columns are ignored.
const REQUIRED_COLUMNS: usize = 4;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to stat {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMetadata {
    /// Operator-assigned identifier; arbitrary, not necessarily numeric.
    pub ordinal: String,
    pub canonical_address: String,
    pub display_name: String,
    pub sensor_type: String,
}

/// File-backed metadata map keyed by canonical address.
///
/// The entry set always reflects the last successfully parsed full contents
/// of the backing file; a failed reload leaves both the entries and the
/// recorded file version untouched, so the next refresh retries.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    entries: HashMap<String, SensorMetadata>,
    source_version: Option<SystemTime>,
}

impl MetadataStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        MetadataStore {
            path: path.into(),
            entries: HashMap::new(),
            source_version: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up metadata for a canonical address. A miss is not an error;
    /// callers substitute placeholder labels.
    pub fn lookup(&self, addr: &str) -> Option<&SensorMetadata> {
        self.entries.get(addr)
    }

    /// Reload the backing file if its modification time changed since the
    /// last successful load. Returns Ok(true) when a reload happened,
    /// Ok(false) when the file was unchanged and no I/O beyond the stat was
    /// performed. Errors are non-fatal: the previous entries stay in place.
    pub fn refresh_if_stale(&mut self) -> Result<bool, MetadataError> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| MetadataError::Stat { path: self.path.clone(), source: e })?;

        if self.source_version == Some(modified) {
            return Ok(false);
        }

        let data = fs::read_to_string(&self.path)
            .map_err(|e| MetadataError::Read { path: self.path.clone(), source: e })?;

        // Full replacement: build the new map completely before swapping it
        // in, so a lookup never observes a half-loaded set.
        let entries = parse_rows(&data);
        self.entries = entries;
        self.source_version = Some(modified);
        Ok(true)
    }
}

fn parse_rows(data: &str) -> HashMap<String, SensorMetadata> {
    let mut entries = HashMap::new();
    // First line is the header.
    for line in data.lines().skip(1) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < REQUIRED_COLUMNS {
            continue;
        }
        let meta = SensorMetadata {
            ordinal: cols[0].trim().to_string(),
            canonical_address: cols[1].trim().to_string(),
            display_name: cols[2].trim().to_string(),
            sensor_type: cols[3].trim().to_string(),
        };
        entries.insert(meta.canonical_address.clone(), meta);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_initial_load() {
        let f = write_csv("nr,id,name,type\n1,28-060504030201,Garden,outdoors\n");
        let mut store = MetadataStore::new(f.path());
        assert!(store.refresh_if_stale().unwrap());

        let meta = store.lookup("28-060504030201").unwrap();
        assert_eq!(meta.ordinal, "1");
        assert_eq!(meta.display_name, "Garden");
        assert_eq!(meta.sensor_type, "outdoors");
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let f = write_csv("nr,id,name,type\n1,28-060504030201,Garden,outdoors\n");
        let mut store = MetadataStore::new(f.path());
        store.refresh_if_stale().unwrap();
        assert!(store.lookup("28-ffffffffffff").is_none());
    }

    #[test]
    fn test_unchanged_file_is_not_reparsed() {
        let f = write_csv("nr,id,name,type\n1,28-060504030201,Garden,outdoors\n");
        let mut store = MetadataStore::new(f.path());
        assert!(store.refresh_if_stale().unwrap());
        // Same mtime: the refresh is a no-op.
        assert!(!store.refresh_if_stale().unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_changed_file_fully_replaces_entries() {
        let f = write_csv("nr,id,name,type\n1,28-aaaaaaaaaaaa,Old,indoors\n");
        let mut store = MetadataStore::new(f.path());
        store.refresh_if_stale().unwrap();
        assert!(store.lookup("28-aaaaaaaaaaaa").is_some());

        // Rewrite with a disjoint key set. The sleep keeps the mtimes apart
        // on filesystems with coarse timestamp granularity.
        thread::sleep(Duration::from_millis(20));
        fs::write(f.path(), "nr,id,name,type\n2,28-bbbbbbbbbbbb,New,outdoors\n").unwrap();

        assert!(store.refresh_if_stale().unwrap());
        assert!(store.lookup("28-aaaaaaaaaaaa").is_none());
        assert!(store.lookup("28-bbbbbbbbbbbb").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_malformed_row_skipped() {
        let f = write_csv(
            "nr,id,name,type\n\
             1,28-060504030201,Garden,outdoors\n\
             2,28-bbbbbbbbbbbb,NoType\n\
             3,28-cccccccccccc,Cellar,indoors\n",
        );
        let mut store = MetadataStore::new(f.path());
        store.refresh_if_stale().unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.lookup("28-bbbbbbbbbbbb").is_none());
        assert!(store.lookup("28-cccccccccccc").is_some());
    }

    #[test]
    fn test_extra_columns_ignored() {
        let f = write_csv("nr,id,name,type,comment\n1,28-060504030201,Garden,outdoors,south wall\n");
        let mut store = MetadataStore::new(f.path());
        store.refresh_if_stale().unwrap();
        let meta = store.lookup("28-060504030201").unwrap();
        assert_eq!(meta.sensor_type, "outdoors");
    }

    #[test]
    fn test_missing_file_keeps_previous_entries() {
        let f = write_csv("nr,id,name,type\n1,28-060504030201,Garden,outdoors\n");
        let path = f.path().to_path_buf();
        let mut store = MetadataStore::new(&path);
        store.refresh_if_stale().unwrap();
        assert_eq!(store.len(), 1);

        drop(f); // removes the file

        let err = store.refresh_if_stale();
        assert!(err.is_err());
        // Stale data is retained, including the lookup result.
        assert_eq!(store.len(), 1);
        assert!(store.lookup("28-060504030201").is_some());
    }

    #[test]
    fn test_failed_reload_retries_after_file_returns() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sensors.csv");
        let mut store = MetadataStore::new(&path);

        assert!(store.refresh_if_stale().is_err());
        assert!(store.is_empty());

        fs::write(&path, "nr,id,name,type\n1,28-060504030201,Garden,outdoors\n").unwrap();
        assert!(store.refresh_if_stale().unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let f = write_csv("nr,id,name,type\n");
        let mut store = MetadataStore::new(f.path());
        store.refresh_if_stale().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_parse_rows_crlf() {
        let entries = parse_rows("nr,id,name,type\r\n1,28-060504030201,Garden,outdoors\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["28-060504030201"].display_name, "Garden");
    }
}
