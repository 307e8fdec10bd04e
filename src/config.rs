//! Pipeline configuration.
//!
//! Loaded from a JSON file; every field has a default, so `{}` is a complete
//! configuration. CLI flags override file values, which override defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entities::ColumnPatterns;
use crate::error::{ReconcileError, Result};
use crate::output::CsvOptions;
use crate::similarity::SimilarityKind;

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Top-level configuration, deserialized from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Yearly order and addenda files.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Reference table and product table.
    #[serde(default)]
    pub substances: SubstanceConfig,

    /// Output directory and file dialects.
    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|e| ReconcileError::json(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.registry;
        if r.year_start > r.year_end {
            return Err(ReconcileError::config(format!(
                "year_start {} is after year_end {}",
                r.year_start, r.year_end
            )));
        }

        let s = &self.substances;
        if !(0.0..=1.0).contains(&s.cutoff) {
            return Err(ReconcileError::config(format!(
                "cutoff {} is outside [0, 1]",
                s.cutoff
            )));
        }
        if s.delimiter.is_empty() {
            return Err(ReconcileError::config("composite delimiter is empty"));
        }
        if s.code_width == 0 {
            return Err(ReconcileError::config("code_width must be at least 1"));
        }
        ascii_delimiter("substances.products_delimiter", s.products_delimiter)?;

        let o = &self.output;
        ascii_delimiter("output.registry_delimiter", o.registry_delimiter)?;
        ascii_delimiter("output.substance_delimiter", o.substance_delimiter)?;

        Ok(())
    }
}

fn ascii_delimiter(name: &str, c: char) -> Result<u8> {
    if c.is_ascii() && !c.is_ascii_control() || c == '\t' {
        Ok(c as u8)
    } else {
        Err(ReconcileError::config(format!(
            "{} must be a printable ASCII character or tab, got {:?}",
            name, c
        )))
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `registry` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding the yearly files.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// First year, inclusive.
    #[serde(default = "default_year_start")]
    pub year_start: i32,

    /// Last year, inclusive.
    #[serde(default = "default_year_end")]
    pub year_end: i32,

    /// `{year}` is replaced with the year.
    #[serde(default = "default_order_file_pattern")]
    pub order_file_pattern: String,

    #[serde(default = "default_addenda_file_pattern")]
    pub addenda_file_pattern: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            year_start: default_year_start(),
            year_end: default_year_end(),
            order_file_pattern: default_order_file_pattern(),
            addenda_file_pattern: default_addenda_file_pattern(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("source")
}
fn default_year_start() -> i32 {
    2014
}
fn default_year_end() -> i32 {
    2026
}
fn default_order_file_pattern() -> String {
    "icd10pcs_order_{year}.txt".into()
}
fn default_addenda_file_pattern() -> String {
    "index_addenda_{year}.txt".into()
}

/// `substances` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstanceConfig {
    /// Tab-separated composition table. Substance stages are skipped when unset.
    #[serde(default)]
    pub reference_table: Option<PathBuf>,

    /// Delimited export of the drug registry table.
    #[serde(default)]
    pub products_table: Option<PathBuf>,

    #[serde(default = "default_products_delimiter")]
    pub products_delimiter: char,

    /// Name column patterns, highest priority first.
    #[serde(default = "default_name_column_patterns")]
    pub name_column_patterns: Vec<String>,

    #[serde(default = "default_composite_column_patterns")]
    pub composite_column_patterns: Vec<String>,

    /// Exact header of the packaging column.
    #[serde(default = "default_packaging_column")]
    pub packaging_column: String,

    /// Separator inside the composition field.
    #[serde(default = "default_composite_delimiter")]
    pub delimiter: String,

    /// Minimum similarity for a fuzzy match.
    #[serde(default = "default_cutoff")]
    pub cutoff: f64,

    #[serde(default)]
    pub similarity: SimilarityKind,

    /// Product identifiers are `<code_prefix><zero-padded index>`.
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,

    #[serde(default = "default_code_width")]
    pub code_width: usize,
}

impl Default for SubstanceConfig {
    fn default() -> Self {
        Self {
            reference_table: None,
            products_table: None,
            products_delimiter: default_products_delimiter(),
            name_column_patterns: default_name_column_patterns(),
            composite_column_patterns: default_composite_column_patterns(),
            packaging_column: default_packaging_column(),
            delimiter: default_composite_delimiter(),
            cutoff: default_cutoff(),
            similarity: SimilarityKind::default(),
            code_prefix: default_code_prefix(),
            code_width: default_code_width(),
        }
    }
}

impl SubstanceConfig {
    /// Both inputs, when configured.
    pub fn inputs(&self) -> Option<(&Path, &Path)> {
        match (&self.reference_table, &self.products_table) {
            (Some(reference), Some(products)) => Some((reference.as_path(), products.as_path())),
            _ => None,
        }
    }

    pub fn column_patterns(&self) -> ColumnPatterns {
        ColumnPatterns {
            name: self.name_column_patterns.clone(),
            composite: self.composite_column_patterns.clone(),
            packaging: self.packaging_column.clone(),
        }
    }

    pub fn products_delimiter_byte(&self) -> Result<u8> {
        ascii_delimiter("substances.products_delimiter", self.products_delimiter)
    }
}

fn default_products_delimiter() -> char {
    ','
}
fn default_name_column_patterns() -> Vec<String> {
    ColumnPatterns::default().name
}
fn default_composite_column_patterns() -> Vec<String> {
    ColumnPatterns::default().composite
}
fn default_packaging_column() -> String {
    ColumnPatterns::default().packaging
}
fn default_composite_delimiter() -> String {
    "/".into()
}
fn default_cutoff() -> f64 {
    crate::resolver::DEFAULT_CUTOFF
}
fn default_code_prefix() -> String {
    "ARP".into()
}
fn default_code_width() -> usize {
    6
}

/// `output` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,

    #[serde(default = "default_deletions_file")]
    pub deletions_file: String,

    #[serde(default = "default_memberships_file")]
    pub memberships_file: String,

    #[serde(default = "default_products_file")]
    pub products_file: String,

    #[serde(default = "default_unmatched_detail_file")]
    pub unmatched_detail_file: String,

    #[serde(default = "default_unmatched_unique_file")]
    pub unmatched_unique_file: String,

    #[serde(default = "default_report_file")]
    pub report_file: String,

    /// Delimiter of the catalog and deletion files.
    #[serde(default = "default_registry_delimiter")]
    pub registry_delimiter: char,

    /// Delimiter of the substance and product files.
    #[serde(default = "default_substance_delimiter")]
    pub substance_delimiter: char,

    /// Byte order mark on the substance and product files.
    #[serde(default = "default_true")]
    pub utf8_bom: bool,

    /// Write the JSON run report next to the outputs.
    #[serde(default = "default_true")]
    pub write_report: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            catalog_file: default_catalog_file(),
            deletions_file: default_deletions_file(),
            memberships_file: default_memberships_file(),
            products_file: default_products_file(),
            unmatched_detail_file: default_unmatched_detail_file(),
            unmatched_unique_file: default_unmatched_unique_file(),
            report_file: default_report_file(),
            registry_delimiter: default_registry_delimiter(),
            substance_delimiter: default_substance_delimiter(),
            utf8_bom: true,
            write_report: true,
        }
    }
}

impl OutputConfig {
    /// Full path of an output file.
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn registry_options(&self) -> Result<CsvOptions> {
        Ok(CsvOptions {
            delimiter: ascii_delimiter("output.registry_delimiter", self.registry_delimiter)?,
            bom: false,
        })
    }

    pub fn substance_options(&self) -> Result<CsvOptions> {
        Ok(CsvOptions {
            delimiter: ascii_delimiter("output.substance_delimiter", self.substance_delimiter)?,
            bom: self.utf8_bom,
        })
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_catalog_file() -> String {
    "icd10pcs_codes.csv".into()
}
fn default_deletions_file() -> String {
    "icd10pcs_deleted_codes.csv".into()
}
fn default_memberships_file() -> String {
    "substances_par_medicament.csv".into()
}
fn default_products_file() -> String {
    "codes_medicaments.csv".into()
}
fn default_unmatched_detail_file() -> String {
    "substances_non_trouvees_detail.csv".into()
}
fn default_unmatched_unique_file() -> String {
    "substances_non_trouvees_unique.csv".into()
}
fn default_report_file() -> String {
    "run_report.json".into()
}
fn default_registry_delimiter() -> char {
    ','
}
fn default_substance_delimiter() -> char {
    ';'
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_object_is_complete() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.registry.year_start, 2014);
        assert_eq!(config.registry.year_end, 2026);
        assert_eq!(config.substances.cutoff, 0.8);
        assert_eq!(config.substances.similarity, SimilarityKind::SequenceRatio);
        assert!(config.substances.inputs().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let json = r#"{
            "registry": { "base_dir": "data", "year_start": 2020 },
            "substances": { "cutoff": 0.9, "similarity": "jaro_winkler" },
            "output": { "dir": "out", "utf8_bom": false }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.registry.base_dir, PathBuf::from("data"));
        assert_eq!(config.registry.year_end, 2026);
        assert_eq!(config.substances.similarity, SimilarityKind::JaroWinkler);
        assert_eq!(config.substances.delimiter, "/");
        assert_eq!(config.output.path("x.csv"), PathBuf::from("out").join("x.csv"));
        assert!(!config.output.substance_options().unwrap().bom);
        assert_eq!(config.output.registry_options().unwrap().delimiter, b',');
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.registry.year_start = 2030;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.substances.cutoff = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.substances.delimiter.clear();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.substances.code_width = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.output.substance_delimiter = 'é';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "registry": { "year_end": 2018 } }"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.registry.year_end, 2018);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(ReconcileError::Json { .. })
        ));
    }
}
