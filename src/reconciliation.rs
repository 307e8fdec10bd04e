// ⚖️ Temporal Reconciler - Many yearly snapshots -> one canonical catalog
//
// Policy: last write wins, by year.
//   stable sort (code, source_year) ascending, keep the last record per code
//
// Records of the same code and year keep their ingestion order, so the last
// one ingested wins a same-year tie.

use crate::parser::CodeRecord;
use crate::resolver::{Catalog, CatalogEntry};
use crate::temporal::CodeTimeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};

// ============================================================================
// CANONICAL CATALOG
// ============================================================================

/// CanonicalEntry - Current label of one code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntry {
    pub code: String,
    pub label: String,

    /// Year the retained label comes from
    pub source_year: i32,
}

impl CatalogEntry for CanonicalEntry {
    fn reference_id(&self) -> &str {
        &self.code
    }

    fn display_label(&self) -> &str {
        &self.label
    }
}

/// CanonicalCatalog - code -> current label, ordered by code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCatalog {
    entries: BTreeMap<String, CanonicalEntry>,
}

impl CanonicalCatalog {
    pub fn get(&self, code: &str) -> Option<&CanonicalEntry> {
        self.entries.get(code)
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(|e| e.label.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in code order
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalEntry> {
        self.entries.values()
    }

    /// SHA-256 over `code\tlabel\n` lines in code order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.entries.values() {
            hasher.update(entry.code.as_bytes());
            hasher.update(b"\t");
            hasher.update(entry.label.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Catalog for CanonicalCatalog {
    type Entry = CanonicalEntry;

    fn lookup(&self, key: &str) -> Option<&CanonicalEntry> {
        self.entries.get(key)
    }

    fn candidates(&self) -> Box<dyn Iterator<Item = (&str, &CanonicalEntry)> + '_> {
        Box::new(self.entries.iter().map(|(k, v)| (k.as_str(), v)))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// ReconciliationReport - Counts for the console summary and run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Records across all years, before deduplication
    pub records_in: usize,

    /// Distinct codes retained
    pub distinct_codes: usize,

    /// Codes whose label differs between at least two years
    pub changed_labels: usize,

    /// Records contributed by each year
    pub per_year: BTreeMap<i32, usize>,

    pub fingerprint: String,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciled {} records from {} years into {} codes ({} with label changes)",
            self.records_in,
            self.per_year.len(),
            self.distinct_codes,
            self.changed_labels
        )
    }
}

/// Reconciliation - Output of one reconcile run
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub catalog: CanonicalCatalog,
    pub timelines: BTreeMap<String, CodeTimeline>,
    pub report: ReconciliationReport,
}

impl Reconciliation {
    /// Full label history of a code
    pub fn timeline(&self, code: &str) -> Option<&CodeTimeline> {
        self.timelines.get(code)
    }

    /// Label in force at `year`
    pub fn label_as_of(&self, code: &str, year: i32) -> Option<&str> {
        self.timelines
            .get(code)
            .and_then(|t| t.as_of(year))
            .map(|v| v.label.as_str())
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// TemporalReconciler - Folds yearly records into the canonical catalog
#[derive(Debug, Default)]
pub struct TemporalReconciler;

impl TemporalReconciler {
    pub fn new() -> Self {
        TemporalReconciler
    }

    /// Merge records from every year
    ///
    /// Output holds exactly one entry per distinct input code.
    pub fn reconcile(&self, mut records: Vec<CodeRecord>) -> Reconciliation {
        let records_in = records.len();
        let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
        for record in &records {
            *per_year.entry(record.source_year).or_insert(0) += 1;
        }

        // sort_by is stable
        records.sort_by(|a, b| {
            a.code
                .cmp(&b.code)
                .then(a.source_year.cmp(&b.source_year))
        });

        let mut timelines: BTreeMap<String, CodeTimeline> = BTreeMap::new();
        for record in records {
            timelines
                .entry(record.code.clone())
                .or_insert_with(|| CodeTimeline::new(record.code.clone()))
                .push(record.source_year, record.label);
        }

        let mut entries = BTreeMap::new();
        let mut changed_labels = 0;
        for (code, timeline) in &timelines {
            if timeline.label_changed() {
                changed_labels += 1;
                debug!(
                    "{}: {} label versions, current from {:?}",
                    code,
                    timeline.version_count(),
                    timeline.last_seen()
                );
            }
            if let Some(current) = timeline.current() {
                entries.insert(
                    code.clone(),
                    CanonicalEntry {
                        code: code.clone(),
                        label: current.label.clone(),
                        source_year: current.year,
                    },
                );
            }
        }

        let catalog = CanonicalCatalog { entries };
        let report = ReconciliationReport {
            records_in,
            distinct_codes: catalog.len(),
            changed_labels,
            per_year,
            fingerprint: catalog.fingerprint(),
            reconciled_at: Utc::now(),
        };
        info!("{}", report.summary());

        Reconciliation {
            catalog,
            timelines,
            report,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
