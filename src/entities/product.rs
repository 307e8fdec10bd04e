// 📦 Product Table - Parent items of substance mentions
// A tabular export of the drug registry: one row per product, with a name
// column, a "/"-joined composition column and an optional packaging column.
//
// Column names vary between exports, so the name and composition columns
// are found by case-insensitive substring patterns.

use crate::error::{ReconcileError, Result};
use crate::snapshot::read_text_lossy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Name column used when no pattern matches
pub const DEFAULT_NAME_COLUMN: &str = "Nom du Medicament";

/// Composition column used when no pattern matches
pub const DEFAULT_COMPOSITE_COLUMN: &str = "DCI";

const BOM: char = '\u{feff}';

// ============================================================================
// COLUMN DISCOVERY
// ============================================================================

/// Find the first header containing a pattern
///
/// Patterns are tried in priority order; for each pattern, headers are
/// scanned left to right. Matching is case-insensitive.
pub fn find_column(headers: &[String], patterns: &[String]) -> Option<usize> {
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

    patterns.iter().find_map(|pattern| {
        let pattern = pattern.to_lowercase();
        lowered.iter().position(|h| h.contains(&pattern))
    })
}

/// ColumnLayout - Where each field lives in a product table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub name_column: String,
    pub composite_column: String,
    pub packaging_column: Option<String>,
}

/// ColumnPatterns - How to discover a [`ColumnLayout`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPatterns {
    pub name: Vec<String>,
    pub composite: Vec<String>,

    /// Exact header of the packaging column
    pub packaging: String,
}

impl Default for ColumnPatterns {
    fn default() -> Self {
        ColumnPatterns {
            name: vec![
                "nom du medicament".to_string(),
                "nom du médicament".to_string(),
                "nom".to_string(),
            ],
            composite: vec!["dci".to_string()],
            packaging: "Conditionnement".to_string(),
        }
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// ProductRow - One product as read from the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub name: String,

    /// Delimited list of substance names
    pub composite: String,

    pub packaging: Option<String>,
}

impl ProductRow {
    /// `name - packaging`, or the name alone
    pub fn display_label(&self) -> String {
        match self.packaging.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => format!("{} - {}", self.name, p),
            _ => self.name.clone(),
        }
    }
}

/// ParentItem - A product with its assigned identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentItem {
    pub item_id: String,
    pub label: String,
    pub composite: String,
}

/// ProductCatalogRow - One row of the product catalog output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalogRow {
    pub code: String,
    pub label: String,
}

// ============================================================================
// PRODUCT TABLE
// ============================================================================

/// ProductTable - Rows of the drug registry export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductTable {
    pub layout: ColumnLayout,
    pub rows: Vec<ProductRow>,

    /// Rows without a product name
    pub rows_skipped: usize,
}

impl ProductTable {
    /// Read a delimited file with a header row
    pub fn from_path(path: &Path, delimiter: u8, patterns: &ColumnPatterns) -> Result<Self> {
        let text = read_text_lossy(path)?;
        let table = Self::from_text(&text, path, delimiter, patterns)?;
        info!(
            "Product table {}: {} products (name: {:?}, composition: {:?})",
            path.display(),
            table.rows.len(),
            table.layout.name_column,
            table.layout.composite_column
        );
        Ok(table)
    }

    /// Parse already-read text; `origin` is only used in errors
    pub fn from_text(
        text: &str,
        origin: &Path,
        delimiter: u8,
        patterns: &ColumnPatterns,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.trim_start_matches(BOM).as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ReconcileError::csv(origin, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let name_idx = resolve_column(&headers, &patterns.name, DEFAULT_NAME_COLUMN, origin)?;
        let composite_idx =
            resolve_column(&headers, &patterns.composite, DEFAULT_COMPOSITE_COLUMN, origin)?;
        let packaging_idx = headers.iter().position(|h| *h == patterns.packaging);

        let layout = ColumnLayout {
            name_column: headers[name_idx].clone(),
            composite_column: headers[composite_idx].clone(),
            packaging_column: packaging_idx.map(|i| headers[i].clone()),
        };

        let mut rows = Vec::new();
        let mut rows_skipped = 0;

        for record in reader.records() {
            let record = record.map_err(|e| ReconcileError::csv(origin, e))?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();

            let name = field(name_idx);
            if name.is_empty() {
                debug!("{}: row without a product name (skipped)", origin.display());
                rows_skipped += 1;
                continue;
            }

            rows.push(ProductRow {
                name,
                composite: field(composite_idx),
                packaging: packaging_idx.map(field),
            });
        }

        Ok(ProductTable {
            layout,
            rows,
            rows_skipped,
        })
    }

    /// Build directly from rows
    pub fn from_rows(rows: Vec<ProductRow>) -> Self {
        ProductTable {
            layout: ColumnLayout {
                name_column: DEFAULT_NAME_COLUMN.to_string(),
                composite_column: DEFAULT_COMPOSITE_COLUMN.to_string(),
                packaging_column: None,
            },
            rows,
            rows_skipped: 0,
        }
    }

    /// Sequential identifiers over sorted distinct names: `ARP000001`, ...
    pub fn assign_codes(&self, prefix: &str, width: usize) -> HashMap<String, String> {
        let names: BTreeSet<&str> = self.rows.iter().map(|r| r.name.as_str()).collect();

        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), format!("{}{:0width$}", prefix, i + 1, width = width)))
            .collect()
    }

    /// One parent item per row, in table order
    pub fn parent_items(&self, prefix: &str, width: usize) -> Vec<ParentItem> {
        let codes = self.assign_codes(prefix, width);

        self.rows
            .iter()
            .filter_map(|row| {
                codes.get(&row.name).map(|code| ParentItem {
                    item_id: code.clone(),
                    label: row.display_label(),
                    composite: row.composite.clone(),
                })
            })
            .collect()
    }
}

/// Distinct (code, label) pairs of the parent items, first occurrence order
pub fn product_catalog(items: &[ParentItem]) -> Vec<ProductCatalogRow> {
    let mut seen = HashSet::new();

    items
        .iter()
        .filter(|item| seen.insert((item.item_id.as_str(), item.label.as_str())))
        .map(|item| ProductCatalogRow {
            code: item.item_id.clone(),
            label: item.label.clone(),
        })
        .collect()
}

fn resolve_column(
    headers: &[String],
    patterns: &[String],
    fallback: &str,
    origin: &Path,
) -> Result<usize> {
    find_column(headers, patterns)
        .or_else(|| headers.iter().position(|h| h == fallback))
        .ok_or_else(|| ReconcileError::MissingColumn {
            path: origin.to_path_buf(),
            column: fallback.to_string(),
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn origin() -> PathBuf {
        PathBuf::from("produits.csv")
    }

    #[test]
    fn test_find_column_priority_order() {
        let headers = strings(&["N°", "Nomenclature", "Nom du médicament", "DCI"]);

        // "nom du médicament" is tried before the bare "nom"
        let patterns = ColumnPatterns::default();
        assert_eq!(find_column(&headers, &patterns.name), Some(2));
        assert_eq!(find_column(&headers, &patterns.composite), Some(3));
        assert_eq!(find_column(&headers, &strings(&["absent"])), None);
    }

    #[test]
    fn test_from_text_discovers_columns() {
        let text = "\u{feff}N°,Nom du Médicament,DCI,Conditionnement\n\
                    1,AUGMENTIN,AMOXICILLINE/ACIDE CLAVULANIQUE,Boîte de 12\n\
                    2,,PARACETAMOL,Boîte\n\
                    3,DOLIPRANE,PARACETAMOL,\n";

        let table = ProductTable::from_text(text, &origin(), b',', &ColumnPatterns::default())
            .unwrap();

        assert_eq!(table.layout.name_column, "Nom du Médicament");
        assert_eq!(table.layout.composite_column, "DCI");
        assert_eq!(table.layout.packaging_column.as_deref(), Some("Conditionnement"));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows_skipped, 1);
        assert_eq!(table.rows[0].display_label(), "AUGMENTIN - Boîte de 12");
        assert_eq!(table.rows[1].display_label(), "DOLIPRANE");
    }

    #[test]
    fn test_missing_composite_column() {
        let text = "Nom,Forme\nX,Y\n";
        let err = ProductTable::from_text(text, &origin(), b',', &ColumnPatterns::default())
            .unwrap_err();

        assert!(matches!(err, ReconcileError::MissingColumn { ref column, .. } if column == "DCI"));
    }

    #[test]
    fn test_assign_codes_over_sorted_names() {
        let row = |name: &str| ProductRow {
            name: name.to_string(),
            composite: String::new(),
            packaging: None,
        };
        let table = ProductTable::from_rows(vec![row("ZINNAT"), row("AUGMENTIN"), row("ZINNAT")]);

        let codes = table.assign_codes("ARP", 6);
        assert_eq!(codes.len(), 2);
        assert_eq!(codes["AUGMENTIN"], "ARP000001");
        assert_eq!(codes["ZINNAT"], "ARP000002");

        let items = table.parent_items("ARP", 6);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].item_id, "ARP000002");

        let catalog = product_catalog(&items);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].code, "ARP000002");
        assert_eq!(catalog[1].label, "AUGMENTIN");
    }
}
