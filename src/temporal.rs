// ⏰ Label Timelines
// A registry code is a stable identity; its label is a value that can change
// from one yearly snapshot to the next.
//
// Time here is the snapshot year. A timeline holds every (year, label) seen
// for one code, in reconciliation order: year ascending, then ingestion order.

use serde::{Deserialize, Serialize};

// ============================================================================
// VERSIONED LABEL
// ============================================================================

/// VersionedLabel - The label a code carried in one snapshot year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedLabel {
    pub year: i32,
    pub label: String,
}

// ============================================================================
// CODE TIMELINE
// ============================================================================

/// CodeTimeline - Identity (code) + every label it had across snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTimeline {
    /// Stable identity
    pub code: String,

    /// Append-only history, oldest first
    pub versions: Vec<VersionedLabel>,
}

impl CodeTimeline {
    /// Create an empty timeline for a code
    pub fn new(code: impl Into<String>) -> Self {
        CodeTimeline {
            code: code.into(),
            versions: Vec::new(),
        }
    }

    /// Append a version
    ///
    /// Callers push in (year, ingestion) order, so the last version pushed
    /// is always the most recent one.
    pub fn push(&mut self, year: i32, label: impl Into<String>) {
        self.versions.push(VersionedLabel {
            year,
            label: label.into(),
        });
    }

    /// Most recent version (max year; last ingested on ties)
    pub fn current(&self) -> Option<&VersionedLabel> {
        self.versions.last()
    }

    /// Version in force at `year`: the latest one with `version.year <= year`
    pub fn as_of(&self, year: i32) -> Option<&VersionedLabel> {
        self.versions.iter().rev().find(|v| v.year <= year)
    }

    /// First year the code appears in
    pub fn first_seen(&self) -> Option<i32> {
        self.versions.first().map(|v| v.year)
    }

    /// Last year the code appears in
    pub fn last_seen(&self) -> Option<i32> {
        self.versions.last().map(|v| v.year)
    }

    /// Complete history
    pub fn history(&self) -> &[VersionedLabel] {
        &self.versions
    }

    /// Count total versions
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Seen in more than one snapshot (or more than once in one)
    pub fn has_history(&self) -> bool {
        self.versions.len() > 1
    }

    /// True when at least two versions carry different labels
    pub fn label_changed(&self) -> bool {
        match self.versions.first() {
            Some(first) => self.versions.iter().any(|v| v.label != first.label),
            None => false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline() -> CodeTimeline {
        let mut t = CodeTimeline::new("0016070");
        t.push(2018, "A");
        t.push(2021, "B");
        t
    }

    #[test]
    fn test_current_is_last_pushed() {
        let t = timeline();
        assert_eq!(t.current().unwrap().label, "B");
        assert_eq!(t.current().unwrap().year, 2021);
    }

    #[test]
    fn test_as_of_year() {
        let t = timeline();

        assert!(t.as_of(2017).is_none());
        assert_eq!(t.as_of(2018).unwrap().label, "A");
        assert_eq!(t.as_of(2020).unwrap().label, "A");
        assert_eq!(t.as_of(2024).unwrap().label, "B");
    }

    #[test]
    fn test_seen_range_and_history() {
        let t = timeline();

        assert_eq!(t.first_seen(), Some(2018));
        assert_eq!(t.last_seen(), Some(2021));
        assert_eq!(t.version_count(), 2);
        assert!(t.has_history());
        assert!(t.label_changed());
        assert_eq!(t.history()[0].label, "A");
    }

    #[test]
    fn test_unchanged_label_is_not_a_change() {
        let mut t = CodeTimeline::new("0016071");
        t.push(2019, "Same");
        t.push(2020, "Same");

        assert!(t.has_history());
        assert!(!t.label_changed());
    }

    #[test]
    fn test_empty_timeline() {
        let t = CodeTimeline::new("X");
        assert!(t.current().is_none());
        assert!(t.first_seen().is_none());
        assert!(!t.label_changed());
    }
}
