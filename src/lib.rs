// Registry Reconcile - Core Library
// Yearly registry snapshots -> canonical catalog, and free-text substance
// mentions -> reference catalog entries.

pub mod error;
pub mod config;
pub mod parser;         // Line Pattern Extractor
pub mod snapshot;       // Snapshot Loader
pub mod temporal;       // Label timelines
pub mod reconciliation; // Temporal Reconciler
pub mod normalize;      // Text Normalizer
pub mod similarity;
pub mod resolver;       // Entity Resolver
pub mod entities;       // Substance catalog + product table
pub mod crossref;       // Cross-Reference Builder
pub mod output;
pub mod pipeline;

// Re-export commonly used types
pub use error::{ReconcileError, Result};
pub use config::{OutputConfig, PipelineConfig, RegistryConfig, SubstanceConfig};
pub use parser::{
    AddendaExtractor, CodeRecord, DeletionEvent, Grammar, LineExtractor, OrderExtractor,
    OrderLine, extract, parse_addenda_line, parse_order_line,
};
pub use snapshot::{FileNaming, MissingSource, SnapshotLoader, SnapshotSet, YearSnapshot};
pub use temporal::{CodeTimeline, VersionedLabel};
pub use reconciliation::{
    CanonicalCatalog, CanonicalEntry, Reconciliation, ReconciliationReport, TemporalReconciler,
};
pub use normalize::normalize;
pub use similarity::{JaroWinkler, NormalizedLevenshtein, SequenceRatio, Similarity, SimilarityKind};
pub use resolver::{Catalog, CatalogEntry, EntityResolver, MatchCache, MatchMethod, Resolution};
pub use entities::{ParentItem, ProductRow, ProductTable, ReferenceEntry, SubstanceCatalog};
pub use crossref::{
    EnrichedDeletion, EntityMention, MatchResult, MembershipRow, MentionReport, UnmatchedDetail,
    UnmatchedSummary, enrich_deletions, explode_mentions, resolve_mentions,
};
pub use pipeline::{Pipeline, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
