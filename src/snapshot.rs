// 📂 Snapshot Loader
// One registry file per year, parsed line by line into per-year record sets.
//
// A missing year is logged and skipped. A missing base directory or an
// unreadable file aborts the run.

use crate::error::{ReconcileError, Result};
use crate::parser::LineExtractor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder substituted with the year in a [`FileNaming`] pattern
pub const YEAR_PLACEHOLDER: &str = "{year}";

// ============================================================================
// FILE NAMING
// ============================================================================

/// FileNaming - Fixed per-grammar naming convention, e.g. `icd10pcs_order_{year}.txt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNaming {
    pub pattern: String,
}

impl FileNaming {
    pub fn new(pattern: impl Into<String>) -> Self {
        FileNaming {
            pattern: pattern.into(),
        }
    }

    /// File name for one year
    pub fn file_name(&self, year: i32) -> String {
        self.pattern.replace(YEAR_PLACEHOLDER, &year.to_string())
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// YearSnapshot - Records extracted from one yearly file
#[derive(Debug, Clone, Serialize)]
pub struct YearSnapshot<R> {
    pub year: i32,
    pub path: PathBuf,
    pub records: Vec<R>,

    /// Lines in the file
    pub lines_read: usize,

    /// Lines that did not match the grammar
    pub lines_skipped: usize,
}

/// MissingSource - A year with no file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSource {
    pub year: i32,
    pub path: PathBuf,
}

/// SnapshotSet - Every loaded year, in ascending year order
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSet<R> {
    pub snapshots: Vec<YearSnapshot<R>>,
    pub missing: Vec<MissingSource>,
}

impl<R> SnapshotSet<R> {
    /// Total records across all years
    pub fn total_records(&self) -> usize {
        self.snapshots.iter().map(|s| s.records.len()).sum()
    }

    /// Total lines read across all years
    pub fn total_lines(&self) -> usize {
        self.snapshots.iter().map(|s| s.lines_read).sum()
    }

    /// Total lines dropped as noise
    pub fn total_skipped(&self) -> usize {
        self.snapshots.iter().map(|s| s.lines_skipped).sum()
    }

    /// Years with a file on disk
    pub fn years_loaded(&self) -> Vec<i32> {
        self.snapshots.iter().map(|s| s.year).collect()
    }

    /// (year, record count) pairs
    pub fn per_year_counts(&self) -> Vec<(i32, usize)> {
        self.snapshots
            .iter()
            .map(|s| (s.year, s.records.len()))
            .collect()
    }

    /// All records, in ingestion order (year ascending, then line order)
    pub fn into_records(self) -> Vec<R> {
        self.snapshots
            .into_iter()
            .flat_map(|s| s.records)
            .collect()
    }
}

// ============================================================================
// LOADER
// ============================================================================

/// SnapshotLoader - Reads `base_dir/<naming(year)>` for each year of a range
pub struct SnapshotLoader<E> {
    base_dir: PathBuf,
    naming: FileNaming,
    extractor: E,
}

impl<E: LineExtractor> SnapshotLoader<E> {
    pub fn new(base_dir: impl Into<PathBuf>, naming: FileNaming, extractor: E) -> Self {
        SnapshotLoader {
            base_dir: base_dir.into(),
            naming,
            extractor,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Load every year of `year_start..=year_end`
    ///
    /// # Returns
    /// * `Ok(SnapshotSet)` - Loaded years plus the list of missing ones
    /// * `Err(MissingBaseDir)` - The base directory does not exist
    /// * `Err(Io)` - A file exists but cannot be read
    pub fn load(&self, year_start: i32, year_end: i32) -> Result<SnapshotSet<E::Record>> {
        if !self.base_dir.is_dir() {
            return Err(ReconcileError::MissingBaseDir {
                path: self.base_dir.clone(),
            });
        }

        let tag = self.extractor.grammar().code().to_string();
        let mut snapshots = Vec::new();
        let mut missing = Vec::new();

        for year in year_start..=year_end {
            let path = self.base_dir.join(self.naming.file_name(year));

            if !path.is_file() {
                warn!("[{}] Missing file: {} (skipped)", tag, path.display());
                missing.push(MissingSource { year, path });
                continue;
            }

            info!("[{}] Parsing {}", tag, path.display());
            let snapshot = self.load_year(year, &path)?;
            info!(
                "[{}]   -> {} records for {} ({} lines skipped)",
                tag,
                snapshot.records.len(),
                year,
                snapshot.lines_skipped
            );
            snapshots.push(snapshot);
        }

        Ok(SnapshotSet { snapshots, missing })
    }

    /// Load a single year's file
    pub fn load_year(&self, year: i32, path: &Path) -> Result<YearSnapshot<E::Record>> {
        let text = read_text_lossy(path)?;
        Ok(self.parse_text(year, path, &text))
    }

    /// Run the extractor over already-read text
    pub fn parse_text(&self, year: i32, path: &Path, text: &str) -> YearSnapshot<E::Record> {
        let mut records = Vec::new();
        let mut lines_read = 0;

        for (line_num, line) in text.lines().enumerate() {
            lines_read += 1;
            match self.extractor.extract(line, year) {
                Some(record) => records.push(record),
                None => debug!("{}:{} no match", path.display(), line_num + 1),
            }
        }

        YearSnapshot {
            year,
            path: path.to_path_buf(),
            lines_skipped: lines_read - records.len(),
            records,
            lines_read,
        }
    }
}

/// Read a text file as UTF-8, dropping invalid byte sequences
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| ReconcileError::io(path, e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).replace('\u{FFFD}', "")),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{AddendaExtractor, OrderExtractor};
    use tempfile::TempDir;

    fn order_loader(dir: &Path) -> SnapshotLoader<OrderExtractor> {
        SnapshotLoader::new(dir, FileNaming::new("order_{year}.txt"), OrderExtractor)
    }

    #[test]
    fn test_file_naming() {
        let naming = FileNaming::new("icd10pcs_order_{year}.txt");
        assert_eq!(naming.file_name(2024), "icd10pcs_order_2024.txt");
    }

    #[test]
    fn test_load_skips_missing_years() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("order_2020.txt"),
            "header line\n00001 0016070 1 Short  Long\n00002 0016071 1 Other\n",
        )
        .unwrap();
        fs::write(dir.path().join("order_2022.txt"), "00001 0016070 1 Newer\n").unwrap();

        let set = order_loader(dir.path()).load(2020, 2022).unwrap();

        assert_eq!(set.years_loaded(), vec![2020, 2022]);
        assert_eq!(set.missing.len(), 1);
        assert_eq!(set.missing[0].year, 2021);
        assert_eq!(set.per_year_counts(), vec![(2020, 2), (2022, 1)]);
        assert_eq!(set.total_records(), 3);
        assert_eq!(set.total_lines(), 4);
        assert_eq!(set.total_skipped(), 1);
    }

    #[test]
    fn test_into_records_keeps_ingestion_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("order_2019.txt"), "1 BBBBBBB 0 b\n2 AAAAAAA 0 a\n").unwrap();
        fs::write(dir.path().join("order_2020.txt"), "1 CCCCCCC 0 c\n").unwrap();

        let records = order_loader(dir.path()).load(2019, 2020).unwrap().into_records();
        let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();

        assert_eq!(codes, vec!["BBBBBBB", "AAAAAAA", "CCCCCCC"]);
        assert_eq!(records[2].source_year, 2020);
    }

    #[test]
    fn test_missing_base_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let loader = order_loader(&dir.path().join("does-not-exist"));

        let err = loader.load(2020, 2021).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingBaseDir { .. }));
    }

    #[test]
    fn test_all_years_missing_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let set = order_loader(dir.path()).load(2014, 2016).unwrap();

        assert!(set.snapshots.is_empty());
        assert_eq!(set.missing.len(), 3);
        assert_eq!(set.total_records(), 0);
    }

    #[test]
    fn test_invalid_utf8_bytes_are_dropped() {
        let dir = TempDir::new().unwrap();
        let mut bytes = b"Delete Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b" Device B52TZ2Z\n");
        fs::write(dir.path().join("addenda_2023.txt"), bytes).unwrap();

        let loader = SnapshotLoader::new(
            dir.path(),
            FileNaming::new("addenda_{year}.txt"),
            AddendaExtractor,
        );
        let set = loader.load(2023, 2023).unwrap();
        let events = set.into_records();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].description, "Caf Device");
        assert_eq!(events[0].removal_year, 2023);
    }
}
