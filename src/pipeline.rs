// 🚀 Pipeline - Stage orchestration
//
// Registry stages:   order snapshots -> reconcile -> catalog file
//                    addenda snapshots -> enrich deletions -> deletions file
// Substance stages:  reference table -> resolver
//                    product table -> parent items -> mentions -> 4 files
//
// Years are parsed before the merge; stages run sequentially.

use crate::config::PipelineConfig;
use crate::crossref::{enrich_deletions, resolve_mentions};
use crate::entities::{product_catalog, ProductTable, SubstanceCatalog};
use crate::error::{ReconcileError, Result};
use crate::output;
use crate::parser::{AddendaExtractor, OrderExtractor};
use crate::reconciliation::{ReconciliationReport, TemporalReconciler};
use crate::resolver::{EntityResolver, MatchMethod};
use crate::similarity::Similarity;
use crate::snapshot::{FileNaming, MissingSource, SnapshotLoader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

// ============================================================================
// REPORTS
// ============================================================================

/// RegistryReport - Counts of the order and addenda stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryReport {
    /// (year, records) per loaded order file
    pub order_years: Vec<(i32, usize)>,
    pub order_lines_skipped: usize,
    pub missing_order_files: Vec<MissingSource>,

    pub reconciliation: ReconciliationReport,

    /// (year, deletion events) per loaded addenda file
    pub addenda_years: Vec<(i32, usize)>,
    pub missing_addenda_files: Vec<MissingSource>,

    pub deletions: usize,
    pub deletions_labelled: usize,
    pub deletions_unlabelled: usize,
}

/// SubstanceReport - Counts of the reference and product stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstanceReport {
    pub reference_rows: usize,
    pub reference_entries: usize,
    pub products: usize,
    pub product_codes: usize,
    pub mentions: usize,
    pub matched_exact: usize,
    pub matched_fuzzy: usize,
    pub unmatched: usize,
    pub unmatched_unique: usize,
    pub memberships: usize,
    pub similarity: String,
    pub cutoff: f64,
}

/// OutputFile - A written file and its row count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// RunReport - Everything a run did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub registry: Option<RegistryReport>,
    pub substances: Option<SubstanceReport>,
    pub outputs: Vec<OutputFile>,
}

impl RunReport {
    fn new() -> Self {
        RunReport {
            generated_at: Utc::now(),
            registry: None,
            substances: None,
            outputs: Vec::new(),
        }
    }

    /// Human-readable lines for the console summary
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(r) = &self.registry {
            for (year, count) in &r.order_years {
                lines.push(format!("Order {}: {} codes", year, count));
            }
            if !r.missing_order_files.is_empty() {
                lines.push(format!("Order files missing: {}", r.missing_order_files.len()));
            }
            lines.push(format!(
                "Canonical codes: {} (from {} records, {} relabelled)",
                r.reconciliation.distinct_codes,
                r.reconciliation.records_in,
                r.reconciliation.changed_labels
            ));
            for (year, count) in &r.addenda_years {
                lines.push(format!("Addenda {}: {} deletions", year, count));
            }
            lines.push(format!(
                "Deletions: {} ({} labelled, {} without label)",
                r.deletions, r.deletions_labelled, r.deletions_unlabelled
            ));
        }

        if let Some(s) = &self.substances {
            lines.push(format!(
                "Reference substances: {} (from {} rows)",
                s.reference_entries, s.reference_rows
            ));
            lines.push(format!("Products: {} ({} codes)", s.products, s.product_codes));
            lines.push(format!(
                "Mentions: {} ({} exact, {} fuzzy, {} unmatched, {} distinct unmatched)",
                s.mentions, s.matched_exact, s.matched_fuzzy, s.unmatched, s.unmatched_unique
            ));
        }

        for out in &self.outputs {
            lines.push(format!("Wrote {} ({} rows)", out.path.display(), out.rows));
        }

        lines
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Pipeline - Runs the configured stages and writes their outputs
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validates the configuration up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registry stages, plus substance stages when both inputs are configured
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::new();
        self.prepare_output_dir()?;

        report.registry = Some(self.registry_stages(&mut report.outputs)?);
        report.substances = self.substance_stages(&mut report.outputs)?;

        self.finish(report)
    }

    /// Order and addenda stages only
    pub fn run_registry(&self) -> Result<RunReport> {
        let mut report = RunReport::new();
        self.prepare_output_dir()?;

        report.registry = Some(self.registry_stages(&mut report.outputs)?);

        self.finish(report)
    }

    /// Reference and product stages only
    pub fn run_substances(&self) -> Result<RunReport> {
        if self.config.substances.inputs().is_none() {
            return Err(ReconcileError::config(
                "substances.reference_table and substances.products_table must both be set",
            ));
        }

        let mut report = RunReport::new();
        self.prepare_output_dir()?;

        report.substances = self.substance_stages(&mut report.outputs)?;

        self.finish(report)
    }

    fn prepare_output_dir(&self) -> Result<()> {
        let dir = &self.config.output.dir;
        fs::create_dir_all(dir).map_err(|e| ReconcileError::io(dir, e))
    }

    fn finish(&self, mut report: RunReport) -> Result<RunReport> {
        report.generated_at = Utc::now();

        if self.config.output.write_report {
            let path = self.config.output.path(&self.config.output.report_file);
            let json =
                serde_json::to_vec_pretty(&report).map_err(|e| ReconcileError::json(&path, e))?;
            fs::write(&path, json).map_err(|e| ReconcileError::io(&path, e))?;
            info!("Run report: {}", path.display());
        }

        Ok(report)
    }

    fn registry_stages(&self, outputs: &mut Vec<OutputFile>) -> Result<RegistryReport> {
        let reg = &self.config.registry;
        let out = &self.config.output;
        let options = out.registry_options()?;

        // Order snapshots -> canonical catalog
        let order_loader = SnapshotLoader::new(
            &reg.base_dir,
            FileNaming::new(reg.order_file_pattern.as_str()),
            OrderExtractor,
        );
        let orders = order_loader.load(reg.year_start, reg.year_end)?;
        let order_years = orders.per_year_counts();
        let order_lines_skipped = orders.total_skipped();
        let missing_order_files = orders.missing.clone();
        info!(
            "Order snapshots: {} records from {} files",
            orders.total_records(),
            order_years.len()
        );

        let reconciliation = TemporalReconciler::new().reconcile(orders.into_records());
        let catalog_path = out.path(&out.catalog_file);
        let rows = output::write_catalog(&catalog_path, &reconciliation.catalog, options)?;
        outputs.push(OutputFile {
            path: catalog_path,
            rows,
        });

        // Addenda snapshots -> enriched deletions
        let addenda_loader = SnapshotLoader::new(
            &reg.base_dir,
            FileNaming::new(reg.addenda_file_pattern.as_str()),
            AddendaExtractor,
        );
        let addenda = addenda_loader.load(reg.year_start, reg.year_end)?;
        let addenda_years = addenda.per_year_counts();
        let missing_addenda_files = addenda.missing.clone();

        let resolver = EntityResolver::new(reconciliation.catalog);
        let deletions = enrich_deletions(addenda.into_records(), &resolver);
        let deletions_path = out.path(&out.deletions_file);
        let rows = output::write_deletions(&deletions_path, &deletions.rows, options)?;
        outputs.push(OutputFile {
            path: deletions_path,
            rows,
        });

        Ok(RegistryReport {
            order_years,
            order_lines_skipped,
            missing_order_files,
            reconciliation: reconciliation.report,
            addenda_years,
            missing_addenda_files,
            deletions: deletions.rows.len(),
            deletions_labelled: deletions.labelled,
            deletions_unlabelled: deletions.unlabelled,
        })
    }

    fn substance_stages(&self, outputs: &mut Vec<OutputFile>) -> Result<Option<SubstanceReport>> {
        let sub = &self.config.substances;
        let out = &self.config.output;

        let (reference_path, products_path) = match sub.inputs() {
            Some(inputs) => inputs,
            None => {
                info!("Substance inputs not configured (skipped)");
                return Ok(None);
            }
        };
        let options = out.substance_options()?;

        let catalog = SubstanceCatalog::from_path(reference_path)?;
        let reference_rows = catalog.rows_read;
        let resolver = EntityResolver::with_similarity(catalog, sub.similarity);

        let table = ProductTable::from_path(
            products_path,
            sub.products_delimiter_byte()?,
            &sub.column_patterns(),
        )?;
        let items = table.parent_items(&sub.code_prefix, sub.code_width);
        let products = product_catalog(&items);

        let mentions = resolve_mentions(&items, &resolver, &sub.delimiter, sub.cutoff);

        let path = out.path(&out.memberships_file);
        let rows = output::write_memberships(&path, &mentions.memberships, options)?;
        outputs.push(OutputFile { path, rows });

        let path = out.path(&out.products_file);
        let rows = output::write_products(&path, &products, options)?;
        outputs.push(OutputFile { path, rows });

        let path = out.path(&out.unmatched_detail_file);
        let rows = output::write_unmatched_detail(&path, &mentions.unmatched_detail, options)?;
        outputs.push(OutputFile { path, rows });

        let path = out.path(&out.unmatched_unique_file);
        let rows = output::write_unmatched_unique(&path, &mentions.unmatched_unique, options)?;
        outputs.push(OutputFile { path, rows });

        Ok(Some(SubstanceReport {
            reference_rows,
            reference_entries: resolver.catalog().len(),
            products: table.rows.len(),
            product_codes: products.len(),
            mentions: mentions.mentions(),
            matched_exact: mentions.count_by_method(MatchMethod::Exact),
            matched_fuzzy: mentions.count_by_method(MatchMethod::Fuzzy),
            unmatched: mentions.unmatched(),
            unmatched_unique: mentions.unmatched_unique.len(),
            memberships: mentions.memberships.len(),
            similarity: resolver.similarity().name().to_string(),
            cutoff: sub.cutoff,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
