// 🎯 Entity Resolver
// normalized query -> exact lookup -> fuzzy fallback (>= cutoff) -> unmatched
//
// Generic over the reference catalog and the similarity function, so the same
// resolver serves the deletion join (exact only) and the substance join.
// Fuzzy results are memoized in a cache owned by the resolver instance.

use crate::similarity::{SequenceRatio, Similarity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Cutoff used when none is configured
pub const DEFAULT_CUTOFF: f64 = 0.8;

// ============================================================================
// CATALOG TRAITS
// ============================================================================

/// CatalogEntry - What a resolution hands back to the caller
pub trait CatalogEntry {
    fn reference_id(&self) -> &str;
    fn display_label(&self) -> &str;
}

/// Catalog - Read-only reference set keyed by normalized name
pub trait Catalog {
    type Entry: CatalogEntry;

    /// Exact lookup
    fn lookup(&self, key: &str) -> Option<&Self::Entry>;

    /// Every (key, entry) pair in a fixed order
    ///
    /// Fuzzy ties go to the first pair yielded, so this order must not
    /// change between calls.
    fn candidates(&self) -> Box<dyn Iterator<Item = (&str, &Self::Entry)> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// MatchMethod - How a query was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Unmatched,
}

impl MatchMethod {
    pub fn name(&self) -> &str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::Unmatched => "unmatched",
        }
    }
}

/// Resolution - Outcome of one `resolve` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a, E> {
    Exact(&'a E),
    Fuzzy { entry: &'a E, score: f64 },
    Unmatched,
}

impl<'a, E: CatalogEntry> Resolution<'a, E> {
    pub fn entry(&self) -> Option<&'a E> {
        match *self {
            Resolution::Exact(entry) => Some(entry),
            Resolution::Fuzzy { entry, .. } => Some(entry),
            Resolution::Unmatched => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        !matches!(self, Resolution::Unmatched)
    }

    pub fn method(&self) -> MatchMethod {
        match self {
            Resolution::Exact(_) => MatchMethod::Exact,
            Resolution::Fuzzy { .. } => MatchMethod::Fuzzy,
            Resolution::Unmatched => MatchMethod::Unmatched,
        }
    }

    /// 1.0 for exact hits, the similarity for fuzzy hits
    pub fn score(&self) -> Option<f64> {
        match self {
            Resolution::Exact(_) => Some(1.0),
            Resolution::Fuzzy { score, .. } => Some(*score),
            Resolution::Unmatched => None,
        }
    }

    pub fn reference_id(&self) -> Option<&'a str> {
        self.entry().map(|e| e.reference_id())
    }

    pub fn display_label(&self) -> Option<&'a str> {
        self.entry().map(|e| e.display_label())
    }
}

// ============================================================================
// MATCH CACHE
// ============================================================================

/// MatchCache - Memoized fuzzy outcomes, keyed by (query, cutoff)
///
/// Stores the winning catalog key and its score, or `None` for a miss.
/// Read-mostly; safe to share between workers holding the same resolver.
#[derive(Debug, Default)]
pub struct MatchCache {
    entries: RwLock<HashMap<(String, u64), Option<(String, f64)>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, query: &str, cutoff: f64) -> Option<Option<(String, f64)>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(&(query.to_string(), cutoff.to_bits())).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    fn insert(&self, query: &str, cutoff: f64, outcome: Option<(String, f64)>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert((query.to_string(), cutoff.to_bits()), outcome);
    }

    /// Number of cached queries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

// ============================================================================
// ENTITY RESOLVER
// ============================================================================

/// EntityResolver - Exact-then-fuzzy matching against a catalog
pub struct EntityResolver<C, S = SequenceRatio> {
    catalog: C,
    similarity: S,
    cache: MatchCache,
}

impl<C: Catalog> EntityResolver<C, SequenceRatio> {
    /// Resolver using the gestalt sequence ratio
    pub fn new(catalog: C) -> Self {
        Self::with_similarity(catalog, SequenceRatio)
    }
}

impl<C: Catalog, S: Similarity> EntityResolver<C, S> {
    pub fn with_similarity(catalog: C, similarity: S) -> Self {
        EntityResolver {
            catalog,
            similarity,
            cache: MatchCache::new(),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn similarity(&self) -> &S {
        &self.similarity
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    /// Exact lookup only
    pub fn lookup_exact(&self, key: &str) -> Option<&C::Entry> {
        self.catalog.lookup(key)
    }

    /// Resolve an already-normalized query
    ///
    /// 1. exact lookup, returned immediately on a hit
    /// 2. best fuzzy candidate with similarity >= `cutoff`
    /// 3. otherwise `Unmatched`
    ///
    /// `cutoff` is clamped to [0, 1]. Never fails.
    pub fn resolve(&self, normalized_query: &str, cutoff: f64) -> Resolution<'_, C::Entry> {
        if let Some(entry) = self.catalog.lookup(normalized_query) {
            return Resolution::Exact(entry);
        }
        if normalized_query.is_empty() {
            return Resolution::Unmatched;
        }

        let cutoff = if cutoff.is_nan() { DEFAULT_CUTOFF } else { cutoff.clamp(0.0, 1.0) };

        let outcome = match self.cache.get(normalized_query, cutoff) {
            Some(cached) => cached,
            None => {
                let computed = self.best_candidate(normalized_query, cutoff);
                self.cache.insert(normalized_query, cutoff, computed.clone());
                computed
            }
        };

        match outcome.and_then(|(key, score)| self.catalog.lookup(&key).map(|e| (e, score))) {
            Some((entry, score)) => {
                debug!(
                    "fuzzy match {:?} -> {:?} ({:.3}, {})",
                    normalized_query,
                    entry.display_label(),
                    score,
                    self.similarity.name()
                );
                Resolution::Fuzzy { entry, score }
            }
            None => Resolution::Unmatched,
        }
    }

    /// Highest-scoring candidate at or above the cutoff
    ///
    /// Only a strictly higher score replaces the current best, so the first
    /// candidate in catalog order wins ties.
    fn best_candidate(&self, query: &str, cutoff: f64) -> Option<(String, f64)> {
        let mut best: Option<(&str, f64)> = None;

        for (key, _) in self.catalog.candidates() {
            let bound = self.similarity.upper_bound(key, query);
            if bound < cutoff {
                continue;
            }
            if let Some((_, best_score)) = best {
                if bound <= best_score {
                    continue;
                }
            }

            let score = self.similarity.ratio(key, query);
            if score < cutoff {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((key, score)),
            }
        }

        best.map(|(key, score)| (key.to_string(), score))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: String,
        label: String,
    }

    impl CatalogEntry for Entry {
        fn reference_id(&self) -> &str {
            &self.id
        }
        fn display_label(&self) -> &str {
            &self.label
        }
    }

    /// Insertion-ordered test catalog
    struct TestCatalog {
        order: Vec<String>,
        index: BTreeMap<String, Entry>,
    }

    impl TestCatalog {
        fn new(names: &[(&str, &str)]) -> Self {
            let mut order = Vec::new();
            let mut index = BTreeMap::new();
            for (name, id) in names {
                order.push(name.to_string());
                index.insert(
                    name.to_string(),
                    Entry {
                        id: id.to_string(),
                        label: name.to_lowercase(),
                    },
                );
            }
            TestCatalog { order, index }
        }
    }

    impl Catalog for TestCatalog {
        type Entry = Entry;

        fn lookup(&self, key: &str) -> Option<&Entry> {
            self.index.get(key)
        }

        fn candidates(&self) -> Box<dyn Iterator<Item = (&str, &Entry)> + '_> {
            Box::new(
                self.order
                    .iter()
                    .filter_map(|k| self.index.get(k).map(|e| (k.as_str(), e))),
            )
        }

        fn len(&self) -> usize {
            self.order.len()
        }
    }

    /// Sequence ratio that counts how often it is invoked
    #[derive(Default)]
    struct CountingRatio {
        calls: Cell<usize>,
    }

    impl Similarity for CountingRatio {
        fn ratio(&self, candidate: &str, query: &str) -> f64 {
            self.calls.set(self.calls.get() + 1);
            SequenceRatio.ratio(candidate, query)
        }
        fn upper_bound(&self, candidate: &str, query: &str) -> f64 {
            self.calls.set(self.calls.get() + 1);
            SequenceRatio.upper_bound(candidate, query)
        }
        fn name(&self) -> &str {
            "counting"
        }
    }

    /// Every candidate scores the same
    struct Flat;

    impl Similarity for Flat {
        fn ratio(&self, _candidate: &str, _query: &str) -> f64 {
            0.9
        }
        fn name(&self) -> &str {
            "flat"
        }
    }

    #[test]
    fn test_exact_match_skips_similarity() {
        let catalog = TestCatalog::new(&[("IBUPROFENE", "1"), ("PARACETAMOL", "2")]);
        let resolver = EntityResolver::with_similarity(catalog, CountingRatio::default());

        let r = resolver.resolve("PARACETAMOL", DEFAULT_CUTOFF);

        assert_eq!(r.method(), MatchMethod::Exact);
        assert_eq!(r.reference_id(), Some("2"));
        assert_eq!(r.score(), Some(1.0));
        assert_eq!(resolver.similarity().calls.get(), 0);
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_fuzzy_match_respects_cutoff() {
        let resolver = EntityResolver::new(TestCatalog::new(&[("PARACETAMOL", "2")]));

        let r = resolver.resolve("PARACETAM0L", 0.8);
        assert_eq!(r.method(), MatchMethod::Fuzzy);
        assert_eq!(r.reference_id(), Some("2"));
        assert_eq!(r.display_label(), Some("paracetamol"));
        assert!((r.score().unwrap() - 20.0 / 22.0).abs() < 1e-9);

        let r = resolver.resolve("PARACETAM0L", 0.99);
        assert!(!r.is_matched());
        assert_eq!(r.reference_id(), None);
        assert_eq!(r.display_label(), None);
    }

    #[test]
    fn test_best_candidate_wins() {
        let resolver = EntityResolver::new(TestCatalog::new(&[
            ("AMOXICILLINE", "1"),
            ("AMPICILLINE", "2"),
        ]));

        let r = resolver.resolve("AMPICILINE", 0.8);
        assert_eq!(r.reference_id(), Some("2"));
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let resolver = EntityResolver::with_similarity(
            TestCatalog::new(&[("ZETA", "z"), ("ALPHA", "a"), ("MU", "m")]),
            Flat,
        );

        for _ in 0..3 {
            assert_eq!(resolver.resolve("OTHER", 0.8).reference_id(), Some("z"));
        }
    }

    #[test]
    fn test_empty_query_is_unmatched() {
        let resolver = EntityResolver::with_similarity(TestCatalog::new(&[("A", "1")]), Flat);
        assert_eq!(resolver.resolve("", 0.0).method(), MatchMethod::Unmatched);
    }

    #[test]
    fn test_cache_memoizes_fuzzy_outcomes() {
        let catalog = TestCatalog::new(&[("PARACETAMOL", "2"), ("CODEINE", "3")]);
        let resolver = EntityResolver::with_similarity(catalog, CountingRatio::default());

        let first = resolver.resolve("PARACETAM0L", 0.8).reference_id();
        let calls = resolver.similarity().calls.get();
        let second = resolver.resolve("PARACETAM0L", 0.8).reference_id();

        assert_eq!(first, second);
        assert_eq!(resolver.similarity().calls.get(), calls);
        assert_eq!(resolver.cache().hits(), 1);
        assert_eq!(resolver.cache().misses(), 1);

        // A different cutoff is a different cache key
        assert!(!resolver.resolve("PARACETAM0L", 0.99).is_matched());
        assert_eq!(resolver.cache().len(), 2);
    }

    #[test]
    fn test_cutoff_is_clamped() {
        let resolver = EntityResolver::new(TestCatalog::new(&[("PARACETAMOL", "2")]));

        assert!(!resolver.resolve("PARACETAM0L", 5.0).is_matched());
        assert!(resolver.resolve("XYZ", -1.0).is_matched());
        assert!(resolver.resolve("PARACETAM0L", f64::NAN).is_matched());
    }
}
