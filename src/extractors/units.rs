// src/extractors/units.rs
//! Unit and scale reconciler. Reads scale phrases from the table cells, the
//! text above and below the table, and the orphaned rows over the header,
//! then assigns one magnitude per column.

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

use crate::extractors::matrix::CellMatrix;
use crate::extractors::report::ExtractionReport;
use crate::extractors::roles::ColumnRoles;
use crate::extractors::scanner::{block_texts, fragment_text};
use crate::extractors::text;

// --- Regex Patterns (Lazy Static) ---
static NON_ALPHA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z]").expect("non-alpha regex"));
static PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((.*?)\)").expect("parenthetical regex"));
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("digit regex"));
static UNIT_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(thousand|million|billion)s?\b").expect("unit word regex")
});

const SINGULARS: [(&str, &str); 9] = [
    ("thousands", "thousand"),
    ("millions", "million"),
    ("billions", "billion"),
    ("dollars", "dollar"),
    ("shares", "share"),
    ("amounts", "amount"),
    ("numbers", "number"),
    ("values", "value"),
    ("figures", "figure"),
];

const FILLER_WORDS: [&str; 15] = [
    "number", "value", "amount", "figure", "are", "and", "stated", "expressed", "presented",
    "denoted", "price", "paid", "reflected", "which", "total",
];
const KEPT_WORDS: [&str; 7] = [
    "dollar", "share", "per share", "except", "million", "thousand", "billion",
];
const TEXT_NOISE_WORDS: [&str; 21] = [
    "in", "of", "thousand", "million", "billion", "share", "per", "dollar", "paid", "price",
    "average", "total", "number", "amount", "data", "information", "except", "and", "are",
    "expressed", "reflected",
];
const UNIT_MARKERS: [&str; 3] = ["in thousand", "in million", "in billion"];

// --- Scale codes ---

/// Magnitude of one unit kind. `dollars` and `shares` together mean every
/// eligible column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scale {
    pub dollars: bool,
    pub shares: bool,
    /// 1 thousand, 2 million, 3 billion.
    pub magnitude: u8,
}

impl Scale {
    fn code(&self) -> String {
        let prefix = match (self.dollars, self.shares) {
            (true, false) => "d",
            (false, true) => "s",
            _ => "a",
        };
        format!("{}{}", prefix, self.magnitude)
    }
}

/// Result of classifying one unit phrase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScaleCode {
    None,
    /// A bare scale word with no unit kind.
    Magnitude(u8),
    Scale(Scale),
    /// Two unit kinds with their own magnitudes.
    Combined(Scale, Scale),
    /// The phrase could not be read; holds the short diagnostic code.
    Unresolved(String),
}

impl ScaleCode {
    /// Short diagnostic form: "1", "s1", "d2", "a1", "d2s1" or a `y` code.
    pub fn code(&self) -> String {
        match self {
            ScaleCode::None => String::new(),
            ScaleCode::Magnitude(m) => m.to_string(),
            ScaleCode::Scale(scale) => scale.code(),
            ScaleCode::Combined(a, b) => format!("{}{}", a.code(), b.code()),
            ScaleCode::Unresolved(raw) => raw.clone(),
        }
    }

    fn is_unresolved(&self) -> bool {
        matches!(self, ScaleCode::Unresolved(_))
    }
}

impl Serialize for ScaleCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScaleCode::None => serializer.serialize_none(),
            other => serializer.serialize_str(&other.code()),
        }
    }
}

fn magnitude_of(word: &str) -> Option<u8> {
    match word {
        "thousand" => Some(1),
        "million" => Some(2),
        "billion" => Some(3),
        _ => None,
    }
}

fn scale_for(kind: &str, magnitude: u8) -> Option<Scale> {
    match kind {
        "dollar" => Some(Scale {
            dollars: true,
            shares: false,
            magnitude,
        }),
        "share" => Some(Scale {
            dollars: false,
            shares: true,
            magnitude,
        }),
        _ => None,
    }
}

fn singular(word: &str) -> String {
    let lower = word.to_lowercase();
    SINGULARS
        .iter()
        .find(|(plural, _)| *plural == lower)
        .map(|(_, one)| one.to_string())
        .unwrap_or(lower)
}

/// Classifies a unit phrase such as `in thousands, except per share data`.
pub fn classify_unit(phrase: &str) -> ScaleCode {
    let cleaned = NON_ALPHA_RE.replace_all(phrase, " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() > 20 {
        return ScaleCode::Unresolved(format!("y{}", words.len()));
    }

    // 1. Singular, lowercase, longer than two characters
    let words: Vec<String> = words
        .iter()
        .map(|w| singular(w))
        .filter(|w| w.chars().count() > 2)
        .collect();

    // 2. "per share" becomes one token, filler words go
    let mut merged: Vec<String> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        if words[i] == "per" && words.get(i + 1).map(String::as_str) == Some("share") {
            merged.push("per share".to_string());
            i += 2;
        } else {
            merged.push(words[i].clone());
            i += 1;
        }
    }
    let words: Vec<String> = merged
        .into_iter()
        .filter(|w| !FILLER_WORDS.contains(&w.as_str()))
        .collect();

    let exotic = words
        .iter()
        .filter(|w| !KEPT_WORDS.contains(&w.as_str()))
        .count();
    if exotic > 2 {
        return ScaleCode::Unresolved("y".to_string());
    }

    let units: Vec<(usize, u8)> = words
        .iter()
        .enumerate()
        .filter_map(|(i, w)| magnitude_of(w).map(|m| (i, m)))
        .collect();

    // 3. Shapes by word count
    match words.len() {
        1 => {
            return match units.first() {
                Some((_, m)) => ScaleCode::Magnitude(*m),
                None => ScaleCode::Unresolved("y".to_string()),
            }
        }
        2 => {
            let kind = words.iter().find(|w| *w == "share" || *w == "dollar");
            match (units.first(), kind) {
                (Some((_, m)), Some(kind)) => {
                    if let Some(scale) = scale_for(kind, *m) {
                        return ScaleCode::Scale(scale);
                    }
                }
                (Some((_, m)), None) => return ScaleCode::Unresolved(format!("y{}", m)),
                _ => {}
            }
        }
        _ => {}
    }

    if words.len() > 2 && units.len() == 1 {
        if let Some(code) = except_clause(&words, units[0]) {
            return code;
        }
    }
    if words.len() > 2 && units.len() == 2 {
        if let Some(code) = two_units(&words) {
            return code;
        }
    }
    ScaleCode::Unresolved("y".to_string())
}

/// `in thousands, except per share data` and its dollar/share variants.
fn except_clause(words: &[String], (unit_at, magnitude): (usize, u8)) -> Option<ScaleCode> {
    let except_at = words.iter().position(|w| w == "except")?;
    if unit_at > except_at {
        return None;
    }
    let kinds = |range: &[String]| -> BTreeSet<String> {
        range
            .iter()
            .filter(|w| matches!(w.as_str(), "dollar" | "share" | "per share"))
            .cloned()
            .collect()
    };
    let before = kinds(&words[..except_at]);
    let after = kinds(&words[except_at..]);
    let per_share: BTreeSet<String> = BTreeSet::from(["per share".to_string()]);
    let per_share_and_share: BTreeSet<String> =
        BTreeSet::from(["per share".to_string(), "share".to_string()]);

    let scale = |dollars: bool, shares: bool| {
        Some(ScaleCode::Scale(Scale {
            dollars,
            shares,
            magnitude,
        }))
    };
    let before: Vec<&str> = before.iter().map(String::as_str).collect();
    match before.as_slice() {
        [] if after == per_share => scale(true, true),
        [] if after == per_share_and_share => scale(true, false),
        ["dollar"] if after == per_share => scale(true, false),
        ["share"] if after == per_share => scale(false, true),
        _ => None,
    }
}

/// `in millions of dollars and thousands of shares`.
fn two_units(words: &[String]) -> Option<ScaleCode> {
    let relevant: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| magnitude_of(w).is_some() || *w == "share" || *w == "dollar")
        .collect();
    let magnitudes: Vec<u8> = relevant.iter().filter_map(|w| magnitude_of(w)).collect();
    let kinds: Vec<&str> = relevant
        .iter()
        .copied()
        .filter(|w| magnitude_of(w).is_none())
        .collect();
    let (first, second) = match kinds.as_slice() {
        [a, b] => (*a, *b),
        // One kind named: the other magnitude goes to the other kind
        [only] => {
            let other = if *only == "share" { "dollar" } else { "share" };
            (other, *only)
        }
        _ => return None,
    };
    Some(ScaleCode::Combined(
        scale_for(first, magnitudes[0])?,
        scale_for(second, magnitudes[1])?,
    ))
}

// --- Phrase extraction from prose ---

fn normalized_words(text: &str) -> (String, Vec<String>) {
    let spaced = NON_ALPHA_RE.replace_all(text, " ").trim().to_string();
    let words = spaced.split_whitespace().map(singular).collect();
    (spaced, words)
}

fn names_unit(words: &[String]) -> bool {
    let joined = words.join(" ");
    UNIT_MARKERS.iter().any(|m| joined.contains(m))
}

fn noise_share(words: &[String]) -> usize {
    words
        .iter()
        .filter(|w| !TEXT_NOISE_WORDS.contains(&w.as_str()))
        .count()
}

/// First digit-free parenthetical of the text above the table that reads
/// like a scale note.
pub fn unit_phrase_above(text: &str) -> Option<String> {
    for caps in PARENTHETICAL_RE.captures_iter(text) {
        let inner = &caps[1];
        if DIGIT_RE.is_match(inner) || !UNIT_WORD_RE.is_match(inner) {
            continue;
        }
        let (spaced, words) = normalized_words(inner);
        if !names_unit(&words) || words.len() > 20 {
            continue;
        }
        let rest = noise_share(&words) as f64;
        let size = words.len() as f64;
        if rest < 0.2 * size || (words.len() <= 7 && rest < 0.5 * size) {
            return Some(spaced);
        }
    }
    None
}

/// Short blocks below the table that read like scale notes.
pub fn unit_phrases_below(blocks: &[String]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|block| {
            let (spaced, words) = normalized_words(block);
            if !names_unit(&words) || words.len() > 15 {
                return None;
            }
            let rest = noise_share(&words) as f64;
            (rest < 0.2 * words.len() as f64 || words.len() <= 7).then_some(spaced)
        })
        .collect()
}

// --- Reconciliation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSource {
    Table,
    TextAbove,
    TextBelow,
    OrphanHeader,
}

impl UnitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSource::Table => "table",
            UnitSource::TextAbove => "text_above",
            UnitSource::TextBelow => "text_below",
            UnitSource::OrphanHeader => "orphan_header",
        }
    }
}

impl Serialize for UnitSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitError {
    /// Bare magnitudes mixed with typed codes.
    MultipleTypes,
    /// Different bare magnitudes inside one column.
    ValueContradiction,
    TooManyCandidates,
    AmbiguousToken,
    UnitOverwrite,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSourceRecord {
    pub source: UnitSource,
    pub found: bool,
    pub codes: Vec<ScaleCode>,
    pub errors: Vec<UnitError>,
}

impl UnitSourceRecord {
    fn new(source: UnitSource) -> Self {
        Self {
            source,
            found: false,
            codes: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn error(&mut self, error: UnitError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }
}

/// Per-column magnitudes and the evidence behind them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleAssignment {
    pub magnitudes: Vec<Option<u8>>,
    pub dollar_columns: Vec<bool>,
    pub sources: Vec<UnitSourceRecord>,
    pub healthy: bool,
}

/// What the reconciler reads.
pub struct UnitInputs<'a> {
    /// Header row plus tagged rows.
    pub matrix: &'a CellMatrix,
    pub roles: &'a ColumnRoles,
    pub before_html: &'a str,
    pub after_html: &'a str,
    pub top_leftovers: &'a CellMatrix,
}

struct ColumnScales<'a> {
    roles: &'a ColumnRoles,
    dollars: &'a [bool],
    magnitudes: Vec<Option<u8>>,
}

impl ColumnScales<'_> {
    fn set(&mut self, c: usize, magnitude: u8, record: &mut UnitSourceRecord) {
        if !self.roles.get(c).takes_scale() {
            return;
        }
        if let Some(current) = self.magnitudes[c] {
            if current != magnitude {
                record.error(UnitError::UnitOverwrite);
            }
        }
        self.magnitudes[c] = Some(magnitude);
    }

    fn apply_scale(&mut self, scale: Scale, record: &mut UnitSourceRecord) {
        for c in 0..self.magnitudes.len() {
            let wanted = (scale.dollars && scale.shares)
                || (scale.dollars && self.dollars[c])
                || (scale.shares && !self.dollars[c]);
            if wanted {
                self.set(c, scale.magnitude, record);
            }
        }
    }

    /// Applies a code read from prose: it reaches every eligible column.
    fn apply(&mut self, code: &ScaleCode, record: &mut UnitSourceRecord) {
        match code {
            ScaleCode::Magnitude(m) => {
                for c in 0..self.magnitudes.len() {
                    self.set(c, *m, record);
                }
            }
            ScaleCode::Scale(scale) => self.apply_scale(*scale, record),
            ScaleCode::Combined(a, b) => {
                self.apply_scale(*a, record);
                self.apply_scale(*b, record);
            }
            ScaleCode::None | ScaleCode::Unresolved(_) => {}
        }
    }

    /// Shared checks for a list of codes from one prose source.
    fn apply_all(&mut self, codes: &[ScaleCode], record: &mut UnitSourceRecord) {
        if codes.len() > 2 {
            record.error(UnitError::TooManyCandidates);
            return;
        }
        if codes.iter().any(ScaleCode::is_unresolved) {
            record.error(UnitError::AmbiguousToken);
            return;
        }
        for code in codes {
            self.apply(code, record);
        }
    }
}

fn cell_code(cell: &str) -> Option<ScaleCode> {
    text::unit_phrase(&text::lower_label(cell)).map(|phrase| classify_unit(&phrase))
}

/// Reads the four unit sources in order and merges their codes.
pub fn reconcile_units(inputs: &UnitInputs, report: &mut ExtractionReport) -> ScaleAssignment {
    let matrix = inputs.matrix;
    let n_cols = matrix.n_cols();
    let dollar_columns: Vec<bool> = (0..n_cols)
        .map(|c| matrix.column(c).into_iter().flatten().any(text::has_dollar))
        .collect();
    let mut scales = ColumnScales {
        roles: inputs.roles,
        dollars: &dollar_columns,
        magnitudes: vec![None; n_cols],
    };

    // 1. Table cells
    let mut table = UnitSourceRecord::new(UnitSource::Table);
    let per_column: Vec<Vec<ScaleCode>> = (0..n_cols)
        .map(|c| {
            let mut codes: Vec<ScaleCode> = Vec::new();
            for code in matrix.column(c).into_iter().flatten().filter_map(cell_code) {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            codes
        })
        .collect();
    let mut all_codes: Vec<ScaleCode> = Vec::new();
    for code in per_column.iter().flatten() {
        if !all_codes.contains(code) {
            all_codes.push(code.clone());
        }
    }
    if !all_codes.is_empty() {
        table.found = true;
        table.codes = all_codes.clone();
        let bare = all_codes
            .iter()
            .filter(|c| matches!(c, ScaleCode::Magnitude(_)))
            .count();
        if bare > 0 && bare < all_codes.len() {
            table.error(UnitError::MultipleTypes);
        } else if bare > 0 {
            // Bare magnitudes stay in their own column
            for (c, codes) in per_column.iter().enumerate() {
                match codes.as_slice() {
                    [ScaleCode::Magnitude(m)] => scales.set(c, *m, &mut table),
                    [] => {}
                    _ => table.error(UnitError::ValueContradiction),
                }
            }
        } else {
            scales.apply_all(&all_codes, &mut table);
        }
    }

    // 2. Text above
    let mut above = UnitSourceRecord::new(UnitSource::TextAbove);
    if let Some(phrase) = unit_phrase_above(&fragment_text(inputs.before_html)) {
        tracing::debug!("Unit phrase above table: {:?}", phrase);
        above.found = true;
        above.codes = vec![classify_unit(&phrase)];
        let codes = above.codes.clone();
        scales.apply_all(&codes, &mut above);
    }

    // 3. Text below
    let mut below = UnitSourceRecord::new(UnitSource::TextBelow);
    let phrases = unit_phrases_below(&block_texts(inputs.after_html));
    if !phrases.is_empty() {
        tracing::debug!("Unit phrases below table: {:?}", phrases);
        below.found = true;
        below.codes = phrases.iter().map(|p| classify_unit(p)).collect();
        let codes = below.codes.clone();
        scales.apply_all(&codes, &mut below);
    }

    // 4. Last orphaned row over the header
    let mut orphan = UnitSourceRecord::new(UnitSource::OrphanHeader);
    if let Some(last) = inputs.top_leftovers.n_rows().checked_sub(1) {
        let mut codes: Vec<ScaleCode> = Vec::new();
        for code in inputs.top_leftovers.row(last).iter().flatten().filter_map(|c| cell_code(c)) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if !codes.is_empty() {
            orphan.found = true;
            orphan.codes = codes.clone();
            scales.apply_all(&codes, &mut orphan);
        }
    }

    let sources = vec![table, above, below, orphan];
    let healthy = sources.iter().all(|s| s.errors.is_empty());
    let errors: Vec<String> = sources
        .iter()
        .flat_map(|s| {
            s.errors.iter().map(move |e| {
                let name = serde_json::to_value(e)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default();
                format!("{}:{}", s.source.as_str(), name)
            })
        })
        .collect();
    let magnitudes = scales.magnitudes;
    tracing::debug!("Column magnitudes {:?}, healthy: {}", magnitudes, healthy);

    report.set(
        "unit_source",
        serde_json::to_value(&sources).unwrap_or(serde_json::Value::Null),
    );
    report.set("unit_errors", serde_json::json!(errors));
    report.set("unit_healthy", healthy);

    ScaleAssignment {
        magnitudes,
        dollar_columns,
        sources,
        healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::roles::classify_columns;

    const HEADER: [&str; 5] = [
        "Period",
        "Total Number of Shares Purchased",
        "Average Price Paid per Share",
        "Shares Purchased as Part of Publicly Announced Plans",
        "Maximum Dollar Value that May Yet Be Purchased",
    ];

    fn reconcile(
        rows: &[&[&str]],
        before: &str,
        after: &str,
        top: CellMatrix,
    ) -> (ScaleAssignment, ExtractionReport) {
        let matrix = CellMatrix::from_strs(rows);
        let mut report = ExtractionReport::new();
        let roles = classify_columns(&matrix, &mut report).unwrap();
        let inputs = UnitInputs {
            matrix: &matrix,
            roles: &roles,
            before_html: before,
            after_html: after,
            top_leftovers: &top,
        };
        let assignment = reconcile_units(&inputs, &mut report);
        (assignment, report)
    }

    #[test]
    fn test_classify_phrases() {
        assert_eq!(classify_unit("in thousands").code(), "1");
        assert_eq!(classify_unit("in thousands, except per share data").code(), "a1");
        assert_eq!(
            classify_unit("in millions of dollars and thousands of shares").code(),
            "d2s1"
        );
        assert_eq!(classify_unit("dollars in millions").code(), "d2");
        assert_eq!(classify_unit("shares in thousands").code(), "s1");
        assert_eq!(classify_unit("in thousands of shares and in millions").code(), "d1s2");
        assert_eq!(classify_unit("thousands of widgets").code(), "y1");
        assert!(classify_unit("in thousands except where otherwise noted below").is_unresolved());
    }

    #[test]
    fn test_except_per_share_above_reaches_all_eligible_columns() {
        let (assignment, report) = reconcile(
            &[&HEADER, &["April 2023", "1,000", "$10.00", "1,000", "$5,000"]],
            "<p>Issuer purchases (in thousands, except per share data)</p>",
            "",
            CellMatrix::default(),
        );
        assert_eq!(assignment.magnitudes, vec![None, Some(1), None, Some(1), Some(1)]);
        assert!(assignment.healthy);
        assert_eq!(report.get("unit_healthy"), Some(&serde_json::Value::from(true)));
    }

    #[test]
    fn test_combined_code_splits_dollar_and_share_columns() {
        let (assignment, _) = reconcile(
            &[&HEADER, &["April 2023", "1,000", "$10.00", "1,000", "$5,000"]],
            "<p>(in millions of dollars and thousands of shares)</p>",
            "",
            CellMatrix::default(),
        );
        assert_eq!(assignment.dollar_columns, vec![false, false, true, false, true]);
        assert_eq!(assignment.magnitudes, vec![None, Some(1), None, Some(1), Some(2)]);
    }

    #[test]
    fn test_table_magnitude_is_column_local() {
        let mut header = HEADER;
        header[4] = "Maximum Dollar Value that May Yet Be Purchased (in millions)";
        let (assignment, _) = reconcile(
            &[&header, &["April 2023", "1,000", "$10.00", "1,000", "$5"]],
            "",
            "",
            CellMatrix::default(),
        );
        assert_eq!(assignment.magnitudes, vec![None, None, None, None, Some(2)]);
        assert_eq!(assignment.sources[0].codes, vec![ScaleCode::Magnitude(2)]);
    }

    #[test]
    fn test_conflicting_sources_are_unhealthy() {
        let mut header = HEADER;
        header[4] = "Maximum Dollar Value that May Yet Be Purchased (in millions)";
        let top = CellMatrix::from_strs(&[&["(in thousands)", "", "", "", ""]]);
        let (assignment, report) = reconcile(
            &[&header, &["April 2023", "1,000", "$10.00", "1,000", "$5"]],
            "",
            "<p>(1) Dollar amounts in thousands.</p>",
            top,
        );
        assert!(!assignment.healthy);
        assert!(assignment.sources[2].errors.contains(&UnitError::UnitOverwrite));
        assert_eq!(report.get("unit_healthy"), Some(&serde_json::Value::from(false)));
    }

    #[test]
    fn test_three_notes_below_are_too_many() {
        let (assignment, report) = reconcile(
            &[&HEADER, &["April 2023", "1,000", "$10.00", "1,000", "$5,000"]],
            "",
            "<p>in thousands</p><p>in millions</p><p>in billions</p>",
            CellMatrix::default(),
        );
        assert!(!assignment.healthy);
        assert_eq!(assignment.sources[2].codes.len(), 3);
        assert_eq!(assignment.sources[2].errors, vec![UnitError::TooManyCandidates]);
        assert_eq!(assignment.magnitudes, vec![None; 5]);
        assert_eq!(
            report.get("unit_errors"),
            Some(&serde_json::json!(["text_below:too_many_candidates"]))
        );
        assert_eq!(report.get("unit_healthy"), Some(&serde_json::Value::from(false)));
    }

    #[test]
    fn test_unresolved_orphan_header_is_ambiguous() {
        let top = CellMatrix::from_strs(&[&["thousands of widgets", "", "", "", ""]]);
        let (assignment, report) = reconcile(
            &[&HEADER, &["April 2023", "1,000", "$10.00", "1,000", "$5,000"]],
            "",
            "",
            top,
        );
        assert!(!assignment.healthy);
        assert!(assignment.sources[3].found);
        assert_eq!(assignment.sources[3].errors, vec![UnitError::AmbiguousToken]);
        assert_eq!(assignment.magnitudes, vec![None; 5]);
        assert_eq!(
            report.get("unit_errors"),
            Some(&serde_json::json!(["orphan_header:ambiguous_token"]))
        );
        assert_eq!(report.get("unit_healthy"), Some(&serde_json::Value::from(false)));
    }
}

