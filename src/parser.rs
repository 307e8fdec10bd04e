// 🏗️ Line Pattern Extractor
// Turns one raw registry line into a typed record, or into nothing.
//
// Two grammars:
// - Order:   "<ordinal> <code> <level> <short-label>[  <long-label>]"
// - Addenda: "... Delete <description> <code>"
//
// Lines that do not fit a grammar are expected noise (headers, blank lines,
// section titles) and are dropped without error.

use serde::{Deserialize, Serialize};

/// Length of a registry code (e.g. "0016070").
pub const CODE_LEN: usize = 7;

/// Literal token marking a deletion line in an addenda file.
pub const DELETE_MARKER: &str = "Delete";

// ============================================================================
// CORE TYPES
// ============================================================================

/// Grammar - Which registry file format a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grammar {
    Order,
    Addenda,
}

impl Grammar {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            Grammar::Order => "Order snapshot",
            Grammar::Addenda => "Addenda",
        }
    }

    /// Short tag used in log lines
    pub fn code(&self) -> &str {
        match self {
            Grammar::Order => "ORDER",
            Grammar::Addenda => "ADDENDA",
        }
    }
}

/// OrderLine - Every field of a matching order line
///
/// Field boundaries:
/// - `ordinal`: leading run of digits
/// - `code`: exactly [`CODE_LEN`] uppercase ASCII letters or digits, whitespace on both sides
/// - `level`: a single digit
/// - `short_label`: text up to the first run of two or more whitespace characters
/// - `long_label`: everything after that run, when present
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub ordinal: String,
    pub code: String,
    pub level: u8,
    pub short_label: String,
    pub long_label: Option<String>,
}

impl OrderLine {
    /// Long label when present, short label otherwise
    pub fn label(&self) -> &str {
        self.long_label.as_deref().unwrap_or(&self.short_label)
    }

    /// Attach the snapshot year
    pub fn into_record(self, source_year: i32) -> CodeRecord {
        let label = self.label().to_string();
        CodeRecord {
            code: self.code,
            label,
            source_year,
        }
    }
}

/// AddendaLine - The two fields of a matching deletion line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddendaLine {
    pub description: String,
    pub code: String,
}

impl AddendaLine {
    /// Attach the addenda year
    pub fn into_event(self, removal_year: i32) -> DeletionEvent {
        DeletionEvent {
            code: self.code,
            description: self.description,
            removal_year,
        }
    }
}

/// CodeRecord - One registry entry as seen in one yearly snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub code: String,
    pub label: String,
    pub source_year: i32,
}

/// DeletionEvent - One "Delete" line of an addenda file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEvent {
    pub code: String,
    pub description: String,
    pub removal_year: i32,
}

/// Output of [`extract`], one variant per grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Order(OrderLine),
    Addenda(AddendaLine),
}

// ============================================================================
// EXTRACTOR TRAIT
// ============================================================================

/// LineExtractor - Turns a line of one grammar into a typed record
///
/// Implementations never fail: a line that does not match yields `None`.
pub trait LineExtractor {
    /// Record produced for a matching line
    type Record;

    /// Grammar this extractor handles
    fn grammar(&self) -> Grammar;

    /// Extract a record from one line, tagging it with the file's year
    fn extract(&self, line: &str, year: i32) -> Option<Self::Record>;

    /// Extractor version (for provenance in reports)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// Order snapshot extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderExtractor;

impl LineExtractor for OrderExtractor {
    type Record = CodeRecord;

    fn grammar(&self) -> Grammar {
        Grammar::Order
    }

    fn extract(&self, line: &str, year: i32) -> Option<CodeRecord> {
        parse_order_line(line).map(|l| l.into_record(year))
    }
}

/// Addenda deletion extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct AddendaExtractor;

impl LineExtractor for AddendaExtractor {
    type Record = DeletionEvent;

    fn grammar(&self) -> Grammar {
        Grammar::Addenda
    }

    fn extract(&self, line: &str, year: i32) -> Option<DeletionEvent> {
        parse_addenda_line(line).map(|l| l.into_event(year))
    }
}

/// Extract one line with the given grammar
pub fn extract(line: &str, grammar: Grammar) -> Option<Extracted> {
    match grammar {
        Grammar::Order => parse_order_line(line).map(Extracted::Order),
        Grammar::Addenda => parse_addenda_line(line).map(Extracted::Addenda),
    }
}

// ============================================================================
// GRAMMARS
// ============================================================================

/// Parse an order snapshot line
///
/// # Examples:
/// ```
/// use registry_reconcile::parser::parse_order_line;
///
/// let line = "00002 0016070 1 Bypass Cereb Vent to Nasophar  Bypass Cerebral Ventricle to Nasopharynx";
/// let parsed = parse_order_line(line).unwrap();
/// assert_eq!(parsed.code, "0016070");
/// assert_eq!(parsed.label(), "Bypass Cerebral Ventricle to Nasopharynx");
/// ```
pub fn parse_order_line(line: &str) -> Option<OrderLine> {
    let (ordinal, rest) = next_field(line)?;
    if !ordinal.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (code, rest) = next_field(rest)?;
    if !is_registry_code(code) {
        return None;
    }

    let (level, rest) = next_field(rest)?;
    let mut level_chars = level.chars();
    let level = match (level_chars.next(), level_chars.next()) {
        (Some(c), None) => c.to_digit(10)? as u8,
        _ => return None,
    };

    let labels = rest.trim();
    if labels.is_empty() {
        return None;
    }

    let (short_label, long_label) = split_label_columns(labels);

    Some(OrderLine {
        ordinal: ordinal.to_string(),
        code: code.to_string(),
        level,
        short_label: short_label.to_string(),
        long_label: long_label.map(|l| l.to_string()),
    })
}

/// Parse an addenda line carrying a deletion
///
/// The leftmost word-bounded `Delete` marker opens the description, and the
/// code is the last [`CODE_LEN`] characters of the right-trimmed line.
pub fn parse_addenda_line(line: &str) -> Option<AddendaLine> {
    if !line.contains(DELETE_MARKER) {
        return None;
    }

    let marker_end = find_delete_marker(line)?;
    let body = line.trim_end();

    if body.len() < marker_end + CODE_LEN {
        return None;
    }
    let code_start = body.len() - CODE_LEN;
    if !body.is_char_boundary(code_start) {
        return None;
    }

    let code = &body[code_start..];
    if !is_registry_code(code) {
        return None;
    }

    Some(AddendaLine {
        description: body[marker_end..code_start].trim().to_string(),
        code: code.to_string(),
    })
}

/// True when `s` is exactly [`CODE_LEN`] uppercase ASCII letters or digits
pub fn is_registry_code(s: &str) -> bool {
    s.len() == CODE_LEN && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

// ============================================================================
// HELPERS
// ============================================================================

/// Next whitespace-delimited field and the remainder (starting at the separator)
fn next_field(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

/// Split at the first run of 2+ whitespace characters
fn split_label_columns(labels: &str) -> (&str, Option<&str>) {
    let mut run_start = None;
    let mut run_len = 0;

    for (idx, c) in labels.char_indices() {
        if c.is_whitespace() {
            if run_len == 0 {
                run_start = Some(idx);
            }
            run_len += 1;
            continue;
        }

        if run_len >= 2 {
            if let Some(start) = run_start {
                let long = labels[idx..].trim();
                return (labels[..start].trim(), Some(long).filter(|l| !l.is_empty()));
            }
        }
        run_len = 0;
        run_start = None;
    }

    (labels.trim(), None)
}

/// Byte offset right after the leftmost word-bounded delete marker
fn find_delete_marker(line: &str) -> Option<usize> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    line.match_indices(DELETE_MARKER).find_map(|(idx, marker)| {
        let end = idx + marker.len();
        let before_ok = line[..idx].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = line[end..].chars().next().map_or(true, |c| !is_word(c));
        (before_ok && after_ok).then_some(end)
    })
}

// ============================================================================
// TESTS
// ============================================================================
