// 📏 String Similarity
// Ratios in [0.0, 1.0] used by the fuzzy step of the entity resolver.
//
// The default is the gestalt pattern-matching ratio (Ratcliff/Obershelp):
//   2 * M / (|a| + |b|)
// where M is the number of characters in the recursively found longest
// common blocks. Levenshtein and Jaro-Winkler come from strsim.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SIMILARITY TRAIT
// ============================================================================

/// Similarity - Scores a catalog candidate against a query
pub trait Similarity {
    /// Similarity ratio in [0.0, 1.0]
    fn ratio(&self, candidate: &str, query: &str) -> f64;

    /// Cheap value that `ratio` can never exceed
    ///
    /// The resolver skips the full `ratio` when this bound already rules a
    /// candidate out.
    fn upper_bound(&self, _candidate: &str, _query: &str) -> f64 {
        1.0
    }

    /// Name for reports
    fn name(&self) -> &str;
}

/// Gestalt pattern-matching ratio
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRatio;

impl Similarity for SequenceRatio {
    fn ratio(&self, candidate: &str, query: &str) -> f64 {
        sequence_ratio(candidate, query)
    }

    fn upper_bound(&self, candidate: &str, query: &str) -> f64 {
        quick_ratio(candidate, query)
    }

    fn name(&self) -> &str {
        "sequence_ratio"
    }
}

/// 1 - (edit distance / longer length), from strsim
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLevenshtein;

impl Similarity for NormalizedLevenshtein {
    fn ratio(&self, candidate: &str, query: &str) -> f64 {
        strsim::normalized_levenshtein(candidate, query)
    }

    fn name(&self) -> &str {
        "normalized_levenshtein"
    }
}

/// Jaro-Winkler, from strsim
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn ratio(&self, candidate: &str, query: &str) -> f64 {
        strsim::jaro_winkler(candidate, query)
    }

    fn name(&self) -> &str {
        "jaro_winkler"
    }
}

/// SimilarityKind - Runtime choice of similarity, selectable from config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    SequenceRatio,
    NormalizedLevenshtein,
    JaroWinkler,
}

impl Similarity for SimilarityKind {
    fn ratio(&self, candidate: &str, query: &str) -> f64 {
        match self {
            SimilarityKind::SequenceRatio => SequenceRatio.ratio(candidate, query),
            SimilarityKind::NormalizedLevenshtein => NormalizedLevenshtein.ratio(candidate, query),
            SimilarityKind::JaroWinkler => JaroWinkler.ratio(candidate, query),
        }
    }

    fn upper_bound(&self, candidate: &str, query: &str) -> f64 {
        match self {
            SimilarityKind::SequenceRatio => SequenceRatio.upper_bound(candidate, query),
            _ => 1.0,
        }
    }

    fn name(&self) -> &str {
        match self {
            SimilarityKind::SequenceRatio => SequenceRatio.name(),
            SimilarityKind::NormalizedLevenshtein => NormalizedLevenshtein.name(),
            SimilarityKind::JaroWinkler => JaroWinkler.name(),
        }
    }
}

// ============================================================================
// GESTALT PATTERN MATCHING
// ============================================================================

/// Gestalt ratio between two strings, by character
///
/// Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Upper bound on [`sequence_ratio`]: shared characters regardless of order
pub fn quick_ratio(a: &str, b: &str) -> f64 {
    let mut available: HashMap<char, usize> = HashMap::new();
    for c in b.chars() {
        *available.entry(c).or_insert(0) += 1;
    }

    let mut matches = 0;
    let mut len_a = 0;
    for c in a.chars() {
        len_a += 1;
        if let Some(n) = available.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                matches += 1;
            }
        }
    }

    let total = len_a + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    2.0 * matches as f64 / total as f64
}

/// Total size of the matching blocks between `a` and `b`
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate() {
        b2j.entry(c).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }

    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`
///
/// Among equally long blocks, the one starting earliest in `a` wins, then
/// the one starting earliest in `b`. Returns `(i, j, size)`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // j -> length of the match ending at a[i - 1], b[j]
    let mut j2len: HashMap<usize, usize> = HashMap::new();

    for (i, c) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_j2len = HashMap::new();

        if let Some(positions) = b2j.get(c) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| j2len.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next_j2len.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }

        j2len = next_j2len;
    }

    (best_i, best_j, best_size)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sequence_ratio_identical() {
        assert!(approx(sequence_ratio("PARACETAMOL", "PARACETAMOL"), 1.0));
        assert!(approx(sequence_ratio("", ""), 1.0));
    }

    #[test]
    fn test_sequence_ratio_disjoint() {
        assert!(approx(sequence_ratio("ABC", "XYZ"), 0.0));
        assert!(approx(sequence_ratio("ABC", ""), 0.0));
    }

    #[test]
    fn test_sequence_ratio_typo() {
        // "PARACETAM" + "L" shared: 2 * 10 / 22
        let r = sequence_ratio("PARACETAMOL", "PARACETAM0L");
        assert!(approx(r, 20.0 / 22.0));
    }

    #[test]
    fn test_sequence_ratio_shifted() {
        // "BCD" is the only common block
        assert!(approx(sequence_ratio("ABCD", "BCDE"), 0.75));
    }

    #[test]
    fn test_sequence_ratio_recurses_on_both_sides() {
        // Longest block "CD", then "A" on the left and "F" on the right
        assert!(approx(sequence_ratio("AXCDYF", "AZCDWF"), 2.0 * 4.0 / 12.0));
    }

    #[test]
    fn test_sequence_ratio_handles_multibyte() {
        assert!(approx(sequence_ratio("ÉTÉ", "ÉTÉ"), 1.0));
        assert!(approx(sequence_ratio("ÉTÉ", "ETE"), 2.0 * 1.0 / 6.0));
    }

    #[test]
    fn test_quick_ratio_bounds_sequence_ratio() {
        let pairs = [
            ("PARACETAMOL", "PARACETAM0L"),
            ("ABCD", "DCBA"),
            ("AMOXICILLINE", "ACIDE CLAVULANIQUE"),
            ("", "X"),
        ];
        for (a, b) in pairs {
            assert!(quick_ratio(a, b) >= sequence_ratio(a, b));
        }
        assert!(approx(quick_ratio("ABCD", "DCBA"), 1.0));
    }

    #[test]
    fn test_strsim_backed_similarities() {
        assert!(approx(NormalizedLevenshtein.ratio("PARACETAMOL", "PARACETAM0L"), 1.0 - 1.0 / 11.0));
        assert!(JaroWinkler.ratio("PARACETAMOL", "PARACETAM0L") > 0.9);
        assert!(approx(NormalizedLevenshtein.upper_bound("A", "B"), 1.0));
    }

    #[test]
    fn test_similarity_kind_dispatch() {
        assert_eq!(SimilarityKind::default(), SimilarityKind::SequenceRatio);
        assert_eq!(SimilarityKind::JaroWinkler.name(), "jaro_winkler");
        assert!(approx(
            SimilarityKind::SequenceRatio.ratio("ABCD", "BCDE"),
            sequence_ratio("ABCD", "BCDE")
        ));

        let kind: SimilarityKind = serde_json::from_str("\"normalized_levenshtein\"").unwrap();
        assert_eq!(kind, SimilarityKind::NormalizedLevenshtein);
    }
}
