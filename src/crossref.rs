// 🔗 Cross-Reference Builder
// Two joins:
//   1. deletions  x canonical catalog -> current label per deleted code
//   2. mentions   x substance catalog -> membership + unmatched review tables
//
// Both are left joins: nothing is dropped, misses stay visible.

use crate::entities::ParentItem;
use crate::normalize::normalize;
use crate::parser::DeletionEvent;
use crate::reconciliation::CanonicalCatalog;
use crate::resolver::{Catalog, EntityResolver, MatchMethod};
use crate::similarity::Similarity;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// ============================================================================
// DELETION ENRICHMENT
// ============================================================================

/// EnrichedDeletion - A deletion event with the code's current label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedDeletion {
    pub code: String,

    /// None when the code is in no loaded order snapshot
    pub label: Option<String>,

    pub removal_year: i32,
    pub description: String,

    /// Snapshot year the label comes from
    pub label_year: Option<i32>,
}

/// DeletionReport - Outcome of the deletion join
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionReport {
    pub rows: Vec<EnrichedDeletion>,
    pub labelled: usize,
    pub unlabelled: usize,
}

/// Attach the canonical label to each deletion, keeping event order
///
/// Exact lookup only: a code either is in the catalog or is not.
pub fn enrich_deletions<S: Similarity>(
    events: Vec<DeletionEvent>,
    resolver: &EntityResolver<CanonicalCatalog, S>,
) -> DeletionReport {
    let mut report = DeletionReport::default();

    for event in events {
        let entry = resolver.lookup_exact(&event.code);
        match entry {
            Some(_) => report.labelled += 1,
            None => {
                debug!("deleted code {} has no canonical label", event.code);
                report.unlabelled += 1;
            }
        }

        report.rows.push(EnrichedDeletion {
            code: event.code,
            label: entry.map(|e| e.label.clone()),
            removal_year: event.removal_year,
            description: event.description,
            label_year: entry.map(|e| e.source_year),
        });
    }

    info!(
        "Deletions: {} enriched, {} without label",
        report.labelled, report.unlabelled
    );
    report
}

// ============================================================================
// MENTIONS
// ============================================================================

/// EntityMention - One atomic name split out of a parent's composite field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMention {
    pub raw_text: String,
    pub normalized_text: String,
    pub parent_item_id: String,
}

/// MatchResult - Resolution of one mention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub mention: EntityMention,
    pub reference_id: Option<String>,
    pub display_label: Option<String>,
    pub matched: bool,
    pub method: MatchMethod,
    pub score: Option<f64>,
}

/// Split a composite field into mentions, one per non-empty trimmed segment
pub fn explode_mentions(item: &ParentItem, delimiter: &str) -> Vec<EntityMention> {
    item.composite
        .split(delimiter)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| EntityMention {
            raw_text: segment.to_string(),
            normalized_text: normalize(segment),
            parent_item_id: item.item_id.clone(),
        })
        .collect()
}

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// MembershipRow - A parent item contains a resolved reference entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MembershipRow {
    pub reference_id: String,
    pub display_label: String,
    pub parent_item_id: String,
}

/// UnmatchedDetail - An unresolved mention with its parent context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnmatchedDetail {
    pub parent_item_id: String,
    pub parent_label: String,
    pub composite: String,
    pub raw_text: String,
    pub normalized_text: String,
}

/// UnmatchedSummary - One unresolved name and how many parents use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedSummary {
    pub normalized_text: String,

    /// First raw spelling seen
    pub raw_text: String,

    /// Distinct parent items referencing it
    pub parent_count: usize,
}

/// MentionReport - Everything the mention join produces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentionReport {
    pub results: Vec<MatchResult>,
    pub memberships: Vec<MembershipRow>,
    pub unmatched_detail: Vec<UnmatchedDetail>,
    pub unmatched_unique: Vec<UnmatchedSummary>,
}

impl MentionReport {
    pub fn mentions(&self) -> usize {
        self.results.len()
    }

    pub fn matched(&self) -> usize {
        self.results.iter().filter(|r| r.matched).count()
    }

    pub fn unmatched(&self) -> usize {
        self.mentions() - self.matched()
    }

    pub fn count_by_method(&self, method: MatchMethod) -> usize {
        self.results.iter().filter(|r| r.method == method).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} mentions: {} exact, {} fuzzy, {} unmatched ({} distinct)",
            self.mentions(),
            self.count_by_method(MatchMethod::Exact),
            self.count_by_method(MatchMethod::Fuzzy),
            self.unmatched(),
            self.unmatched_unique.len()
        )
    }
}

// ============================================================================
// MENTION RESOLUTION
// ============================================================================

/// Explode every parent item, resolve each mention, partition the results
pub fn resolve_mentions<C, S>(
    items: &[ParentItem],
    resolver: &EntityResolver<C, S>,
    delimiter: &str,
    cutoff: f64,
) -> MentionReport
where
    C: Catalog,
    S: Similarity,
{
    let mut report = MentionReport::default();
    let mut seen_members = HashSet::new();
    let mut seen_unmatched = HashSet::new();

    for item in items {
        for mention in explode_mentions(item, delimiter) {
            let resolution = resolver.resolve(&mention.normalized_text, cutoff);
            let reference_id = resolution.reference_id().map(str::to_string);
            let display_label = resolution.display_label().map(str::to_string);

            match (&reference_id, &display_label) {
                (Some(id), Some(label)) => {
                    let row = MembershipRow {
                        reference_id: id.clone(),
                        display_label: label.clone(),
                        parent_item_id: item.item_id.clone(),
                    };
                    if seen_members.insert(row.clone()) {
                        report.memberships.push(row);
                    }
                }
                _ => {
                    let row = UnmatchedDetail {
                        parent_item_id: item.item_id.clone(),
                        parent_label: item.label.clone(),
                        composite: item.composite.clone(),
                        raw_text: mention.raw_text.clone(),
                        normalized_text: mention.normalized_text.clone(),
                    };
                    if seen_unmatched.insert(row.clone()) {
                        report.unmatched_detail.push(row);
                    }
                }
            }

            report.results.push(MatchResult {
                matched: resolution.is_matched(),
                method: resolution.method(),
                score: resolution.score(),
                mention,
                reference_id,
                display_label,
            });
        }
    }

    report.unmatched_unique = summarize_unmatched(&report.unmatched_detail);
    info!("{}", report.summary());
    report
}

/// Group unmatched rows by normalized text, counting distinct parents
///
/// Sorted by count descending, then normalized text ascending.
pub fn summarize_unmatched(detail: &[UnmatchedDetail]) -> Vec<UnmatchedSummary> {
    let mut groups: HashMap<&str, (&str, HashSet<&str>)> = HashMap::new();

    for row in detail {
        groups
            .entry(row.normalized_text.as_str())
            .or_insert_with(|| (row.raw_text.as_str(), HashSet::new()))
            .1
            .insert(row.parent_item_id.as_str());
    }

    let mut summary: Vec<UnmatchedSummary> = groups
        .into_iter()
        .map(|(normalized, (raw, parents))| UnmatchedSummary {
            normalized_text: normalized.to_string(),
            raw_text: raw.to_string(),
            parent_count: parents.len(),
        })
        .collect();

    summary.sort_by(|a, b| {
        b.parent_count
            .cmp(&a.parent_count)
            .then_with(|| a.normalized_text.cmp(&b.normalized_text))
    });
    summary
}

// ============================================================================
// TESTS
// ============================================================================
