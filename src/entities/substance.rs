// 💊 Substance Reference Catalog
// Built from the pharmaceutical composition table:
//   tab-separated, no header, 8 fixed columns, legacy single-byte charset
//
//   cis_code | element_designation | substance_code | substance_label
//   dosage | dosage_reference | component_nature | linkage_number
//
// Each label is normalized; rows are sorted by substance code (stable) and
// the first row per normalized name is kept. One substance appears under
// many products, so most rows collapse.

use crate::error::{ReconcileError, Result};
use crate::normalize::normalize;
use crate::resolver::{Catalog, CatalogEntry};
use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Columns a row needs to carry a substance (code and label)
const MIN_COLUMNS: usize = 4;

// ============================================================================
// ROWS AND ENTRIES
// ============================================================================

/// CompositionRow - One line of the composition table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionRow {
    pub cis_code: String,
    pub element_designation: String,
    pub substance_code: String,
    pub substance_label: String,
    pub dosage: String,
    pub dosage_reference: String,
    pub component_nature: String,
    pub linkage_number: String,
}

impl CompositionRow {
    /// Build from raw fields; missing trailing columns stay empty
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let mut it = fields.into_iter().map(|f| f.trim().to_string());
        let mut next = || it.next().unwrap_or_default();
        CompositionRow {
            cis_code: next(),
            element_designation: next(),
            substance_code: next(),
            substance_label: next(),
            dosage: next(),
            dosage_reference: next(),
            component_nature: next(),
            linkage_number: next(),
        }
    }
}

/// ReferenceEntry - A substance reachable by its normalized name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub normalized_name: String,
    pub reference_id: String,
    pub display_label: String,
}

impl CatalogEntry for ReferenceEntry {
    fn reference_id(&self) -> &str {
        &self.reference_id
    }

    fn display_label(&self) -> &str {
        &self.display_label
    }
}

// ============================================================================
// SUBSTANCE CATALOG
// ============================================================================

/// SubstanceCatalog - Deduplicated reference entries in reference-id order
#[derive(Debug, Clone, Default)]
pub struct SubstanceCatalog {
    entries: Vec<ReferenceEntry>,
    index: HashMap<String, usize>,

    /// Rows parsed from the table
    pub rows_read: usize,

    /// Rows dropped (too few columns or blank label)
    pub rows_skipped: usize,
}

impl SubstanceCatalog {
    /// Load the composition table from disk
    ///
    /// # Returns
    /// * `Err(Io)` - File missing or unreadable
    /// * `Err(Encoding)` - Bytes the legacy charset cannot decode
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| ReconcileError::io(path, e))?;

        let (text, had_errors) = WINDOWS_1252.decode_without_bom_handling(&bytes);
        if had_errors {
            return Err(ReconcileError::Encoding {
                path: path.to_path_buf(),
            });
        }

        let catalog = Self::from_table(&text, path)?;
        info!(
            "Reference table {}: {} rows, {} substances ({} rows skipped)",
            path.display(),
            catalog.rows_read,
            catalog.len(),
            catalog.rows_skipped
        );
        Ok(catalog)
    }

    /// Parse already-decoded table text; `origin` is only used in errors
    pub fn from_table(text: &str, origin: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut short_rows = 0;

        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ReconcileError::csv(origin, e))?;
            if record.len() < MIN_COLUMNS {
                warn!(
                    "{}:{} has {} columns, expected 8 (skipped)",
                    origin.display(),
                    idx + 1,
                    record.len()
                );
                short_rows += 1;
                continue;
            }
            rows.push(CompositionRow::from_fields(record.iter()));
        }

        let mut catalog = Self::from_rows(rows);
        catalog.rows_read += short_rows;
        catalog.rows_skipped += short_rows;
        Ok(catalog)
    }

    /// Normalize, sort by reference id, keep the first row per name
    pub fn from_rows(mut rows: Vec<CompositionRow>) -> Self {
        let rows_read = rows.len();
        rows.sort_by(|a, b| compare_reference_ids(&a.substance_code, &b.substance_code));

        let mut entries = Vec::new();
        let mut index = HashMap::new();
        let mut blank = 0;

        for row in rows {
            let normalized_name = normalize(&row.substance_label);
            if normalized_name.is_empty() {
                blank += 1;
                continue;
            }
            if index.contains_key(&normalized_name) {
                continue;
            }
            index.insert(normalized_name.clone(), entries.len());
            entries.push(ReferenceEntry {
                normalized_name,
                reference_id: row.substance_code,
                display_label: row.substance_label,
            });
        }

        SubstanceCatalog {
            entries,
            index,
            rows_read,
            rows_skipped: blank,
        }
    }

    pub fn get(&self, normalized_name: &str) -> Option<&ReferenceEntry> {
        self.index.get(normalized_name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for SubstanceCatalog {
    type Entry = ReferenceEntry;

    fn lookup(&self, key: &str) -> Option<&ReferenceEntry> {
        self.get(key)
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = (&str, &ReferenceEntry)> + '_> {
        Box::new(self.entries.iter().map(|e| (e.normalized_name.as_str(), e)))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Order reference ids: unsigned integers numerically and first, then text
pub fn compare_reference_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn row(code: &str, label: &str) -> CompositionRow {
        CompositionRow {
            cis_code: "60000001".to_string(),
            substance_code: code.to_string(),
            substance_label: label.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_smallest_reference_id_wins() {
        let catalog = SubstanceCatalog::from_rows(vec![
            row("1202", "AMOXICILLINE TRIHYDRATÉE"),
            row("96", "Amoxicilline"),
            row("1000", "AMOXICILLINE"),
            row("42", "ACIDE CLAVULANIQUE"),
        ]);

        assert_eq!(catalog.len(), 3);
        let amox = catalog.get("AMOXICILLINE").unwrap();
        assert_eq!(amox.reference_id, "96");
        assert_eq!(amox.display_label, "Amoxicilline");

        // Candidates follow reference-id order
        let ids: Vec<&str> = catalog.entries().iter().map(|e| e.reference_id.as_str()).collect();
        assert_eq!(ids, vec!["42", "96", "1202"]);
    }

    #[test]
    fn test_compare_reference_ids() {
        assert_eq!(compare_reference_ids("96", "1000"), Ordering::Less);
        assert_eq!(compare_reference_ids("007", "7"), Ordering::Less);
        assert_eq!(compare_reference_ids("5", "A1"), Ordering::Less);
        assert_eq!(compare_reference_ids("B", "A"), Ordering::Greater);
    }

    #[test]
    fn test_blank_labels_are_skipped() {
        let catalog = SubstanceCatalog::from_rows(vec![row("1", "  "), row("2", "CODEINE")]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.rows_read, 2);
        assert_eq!(catalog.rows_skipped, 1);
        assert!(catalog.get("").is_none());
    }

    #[test]
    fn test_from_table_parses_tab_rows() {
        let text = "60001\tcomprimé\t2202\tPARACÉTAMOL\t500 mg\tun comprimé\tSA\t1\n\
                    60002\tgélule\t1585\tCODÉINE\t30 mg\tune gélule\tSA\t1\n\
                    broken line\n";

        let catalog = SubstanceCatalog::from_table(text, &PathBuf::from("COMPO.txt")).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.rows_read, 3);
        assert_eq!(catalog.rows_skipped, 1);
        assert_eq!(catalog.get("PARACETAMOL").unwrap().reference_id, "2202");
        assert_eq!(catalog.get("CODEINE").unwrap().display_label, "CODÉINE");
    }

    #[test]
    fn test_from_path_decodes_legacy_charset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("COMPO.txt");
        // 0xC9 is 'É' in the single-byte charset
        let mut bytes = b"60001\tgel\t24\t".to_vec();
        bytes.push(0xC9);
        bytes.extend_from_slice(b"THINYLESTRADIOL\t30\tx\tSA\t1\n");
        fs::write(&path, bytes).unwrap();

        let catalog = SubstanceCatalog::from_path(&path).unwrap();
        let entry = catalog.get("ETHINYLESTRADIOL").unwrap();

        assert_eq!(entry.display_label, "ÉTHINYLESTRADIOL");
        assert_eq!(entry.reference_id, "24");
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = SubstanceCatalog::from_path(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, ReconcileError::Io { .. }));
    }
}
