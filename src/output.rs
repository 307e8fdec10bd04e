// 📝 Output Writers
// Flat delimited files, one per result table. Header row first, rows in the
// order given, so identical inputs give byte-identical files.

use crate::crossref::{EnrichedDeletion, MembershipRow, UnmatchedDetail, UnmatchedSummary};
use crate::entities::ProductCatalogRow;
use crate::error::{ReconcileError, Result};
use crate::reconciliation::CanonicalCatalog;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// CsvOptions - Dialect of one output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,

    /// Prefix the file with a UTF-8 byte order mark (spreadsheet friendly)
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            bom: false,
        }
    }
}

/// Write serializable rows under a fixed header; returns the row count
///
/// The header is written even when there are no rows.
pub fn write_rows<T, I>(path: &Path, headers: &[&str], rows: I, options: CsvOptions) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut file = File::create(path).map_err(|e| ReconcileError::io(path, e))?;
    if options.bom {
        file.write_all(UTF8_BOM)
            .map_err(|e| ReconcileError::io(path, e))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .from_writer(file);

    writer
        .write_record(headers)
        .map_err(|e| ReconcileError::csv(path, e))?;

    let mut count = 0;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ReconcileError::csv(path, e))?;
        count += 1;
    }

    writer.flush().map_err(|e| ReconcileError::io(path, e))?;
    info!("Wrote {} rows to {}", count, path.display());
    Ok(count)
}

// ============================================================================
// TABLE WRITERS
// ============================================================================

/// `code,label`, one row per distinct code, code order
pub fn write_catalog(path: &Path, catalog: &CanonicalCatalog, options: CsvOptions) -> Result<usize> {
    write_rows(
        path,
        &["code", "label"],
        catalog.iter().map(|e| (&e.code, &e.label)),
        options,
    )
}

/// `code,label,removal_year`; a missing label is an empty field
pub fn write_deletions(path: &Path, rows: &[EnrichedDeletion], options: CsvOptions) -> Result<usize> {
    write_rows(
        path,
        &["code", "label", "removal_year"],
        rows.iter().map(|r| (&r.code, &r.label, r.removal_year)),
        options,
    )
}

/// `reference_id,display_label,parent_item_id`
pub fn write_memberships(path: &Path, rows: &[MembershipRow], options: CsvOptions) -> Result<usize> {
    write_rows(
        path,
        &["reference_id", "display_label", "parent_item_id"],
        rows,
        options,
    )
}

/// `code,label` of every parent item
pub fn write_products(path: &Path, rows: &[ProductCatalogRow], options: CsvOptions) -> Result<usize> {
    write_rows(path, &["code", "label"], rows, options)
}

pub fn write_unmatched_detail(
    path: &Path,
    rows: &[UnmatchedDetail],
    options: CsvOptions,
) -> Result<usize> {
    write_rows(
        path,
        &[
            "parent_item_id",
            "parent_label",
            "composite",
            "raw_text",
            "normalized_text",
        ],
        rows,
        options,
    )
}

pub fn write_unmatched_unique(
    path: &Path,
    rows: &[UnmatchedSummary],
    options: CsvOptions,
) -> Result<usize> {
    write_rows(
        path,
        &["normalized_text", "raw_text", "parent_count"],
        rows,
        options,
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CodeRecord;
    use crate::reconciliation::TemporalReconciler;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.csv");
        let catalog = TemporalReconciler::new()
            .reconcile(vec![
                CodeRecord {
                    code: "BBBBBBB".to_string(),
                    label: "Second, with comma".to_string(),
                    source_year: 2020,
                },
                CodeRecord {
                    code: "AAAAAAA".to_string(),
                    label: "First".to_string(),
                    source_year: 2020,
                },
            ])
            .catalog;

        let n = write_catalog(&path, &catalog, CsvOptions::default()).unwrap();

        assert_eq!(n, 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "code,label\nAAAAAAA,First\nBBBBBBB,\"Second, with comma\"\n"
        );
    }

    #[test]
    fn test_write_deletions_with_missing_label() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deleted.csv");
        let rows = vec![EnrichedDeletion {
            code: "9999999".to_string(),
            label: None,
            removal_year: 2023,
            description: "gone".to_string(),
            label_year: None,
        }];

        write_deletions(&path, &rows, CsvOptions::default()).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "code,label,removal_year\n9999999,,2023\n"
        );
    }

    #[test]
    fn test_bom_and_semicolon_dialect() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unique.csv");
        let rows = vec![UnmatchedSummary {
            normalized_text: "ZINC".to_string(),
            raw_text: "zinc".to_string(),
            parent_count: 3,
        }];
        let options = CsvOptions {
            delimiter: b';',
            bom: true,
        };

        write_unmatched_unique(&path, &rows, options).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        assert_eq!(
            String::from_utf8(bytes[3..].to_vec()).unwrap(),
            "normalized_text;raw_text;parent_count\nZINC;zinc;3\n"
        );
    }

    #[test]
    fn test_header_only_when_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("members.csv");

        let n = write_memberships(&path, &[], CsvOptions::default()).unwrap();

        assert_eq!(n, 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "reference_id,display_label,parent_item_id\n"
        );
    }
}
