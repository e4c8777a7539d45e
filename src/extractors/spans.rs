// src/extractors/spans.rs
//! Temporal span detector: finds the three month-opening rows and the
//! quarter's closing row, and tags every kept row with its span and rank.

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::ops::{Range, RangeInclusive};

use crate::extractors::config::ExtractorConfig;
use crate::extractors::matrix::CellMatrix;
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::text;
use crate::utils::error::ExtractError;

// --- Regex Patterns (Lazy Static) ---
static SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("split regex"));
static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|oct|nov|dec)$",
    )
    .expect("month regex")
});
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("digits regex"));

const PUNCTUATION_TOKENS: [&str; 6] = [",", ":", ".", "-", "_", "–"];
const BROKEN_ROW_ENDINGS: [&str; 6] = ["to", "To", "Through", "through", "-", "–"];
const TIE_BREAK_DROPPED: [&str; 2] = ["through", "to"];

// --- Tokens ---

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Month,
    /// A number inside the configured year range.
    Year,
    /// A number from 1 to 32.
    DayOrMonth,
    Number,
    Literal(String),
}

impl TokenKind {
    fn tie_break_text(&self) -> Option<&str> {
        match self {
            TokenKind::Month | TokenKind::Year | TokenKind::DayOrMonth => None,
            TokenKind::Number => Some("a number"),
            TokenKind::Literal(text) if TIE_BREAK_DROPPED.contains(&text.as_str()) => None,
            TokenKind::Literal(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

/// Splits a period label into month, number and literal tokens. Separators
/// are kept as literal tokens.
pub fn tokenize(label: &str, years: &RangeInclusive<u32>) -> Vec<Token> {
    let mut parts: Vec<&str> = Vec::new();
    let mut last = 0;
    for m in SPLIT_RE.find_iter(label) {
        parts.push(&label[last..m.start()]);
        parts.push(m.as_str());
        last = m.end();
    }
    parts.push(&label[last..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let kind = if MONTH_RE.is_match(part) {
                TokenKind::Month
            } else if DIGITS_RE.is_match(part) {
                match part.parse::<u32>() {
                    Ok(n) if years.contains(&n) => TokenKind::Year,
                    Ok(n) if (1..=32).contains(&n) => TokenKind::DayOrMonth,
                    _ => TokenKind::Number,
                }
            } else {
                TokenKind::Literal(part.to_string())
            };
            Token {
                kind,
                text: part.to_string(),
            }
        })
        .collect()
}

// --- Passes ---

/// Signature variants tried in order until one yields a group of three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternPass {
    WithPunctuation = 1,
    WithoutPunctuation = 2,
    WithoutYears = 3,
}

impl PatternPass {
    const ALL: [PatternPass; 3] = [
        PatternPass::WithPunctuation,
        PatternPass::WithoutPunctuation,
        PatternPass::WithoutYears,
    ];

    fn keeps(&self, token: &Token) -> bool {
        let punctuation = matches!(&token.kind, TokenKind::Literal(t) if PUNCTUATION_TOKENS.contains(&t.as_str()));
        match self {
            PatternPass::WithPunctuation => true,
            PatternPass::WithoutPunctuation => !punctuation,
            PatternPass::WithoutYears => !punctuation && token.kind != TokenKind::Year,
        }
    }

    /// Tokens handed to the date resolver for a row found by this pass.
    fn date_tokens(&self, tokens: &[Token]) -> Vec<Token> {
        let pass = match self {
            PatternPass::WithPunctuation => PatternPass::WithPunctuation,
            _ => PatternPass::WithoutPunctuation,
        };
        tokens.iter().filter(|t| pass.keeps(t)).cloned().collect()
    }
}

// --- Span tags ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Month1,
    Month2,
    Month3,
    Total,
}

impl SpanKind {
    pub fn id(&self) -> u8 {
        match self {
            SpanKind::Month1 => 1,
            SpanKind::Month2 => 2,
            SpanKind::Month3 => 3,
            SpanKind::Total => 4,
        }
    }

    pub fn is_month(&self) -> bool {
        !matches!(self, SpanKind::Total)
    }
}

impl Serialize for SpanKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

/// Span membership of one data row. `rank` counts rows within the span,
/// the opener being 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowTag {
    pub span: SpanKind,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanTable {
    /// Header row followed by the tagged rows.
    pub matrix: CellMatrix,
    /// One tag per matrix row after the header.
    pub tags: Vec<RowTag>,
    /// Date tokens of the three month openers.
    pub openers: [Vec<Token>; 3],
    pub pass: PatternPass,
    pub total_found: bool,
    /// Rows between the header and month 1 that carry values.
    pub mid_leftovers: CellMatrix,
}

// --- Detector ---

pub struct SpanDetector<'a> {
    config: &'a ExtractorConfig,
}

impl<'a> SpanDetector<'a> {
    pub fn new(config: &'a ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn detect(
        &self,
        mut matrix: CellMatrix,
        report: &mut ExtractionReport,
    ) -> Result<SpanTable, ExtractError> {
        // 1. Re-join period labels broken across rows
        join_broken_rows(&mut matrix);

        // 2. Tokenize the lowered, marker-free labels
        let labels: Vec<String> = (0..matrix.n_rows())
            .map(|r| matrix.get(r, 0).map(text::label_key).unwrap_or_default())
            .collect();
        let tokens: Vec<Vec<Token>> = labels
            .iter()
            .map(|label| tokenize(label, &self.config.year_range))
            .collect();

        // 3. Month openers
        let Some((pass, openers)) = find_openers(&tokens) else {
            report.set("num_monthly_intervals", 0);
            return Err(TerminalStatus::Not3MonthlyIntervals.into());
        };
        report.set("num_monthly_intervals", openers.len());
        report.set("pattern_pass", pass as u8);
        let [first, second, third] = openers;
        tracing::info!(
            "Month openers at rows {}, {}, {} (pass {})",
            first,
            second,
            third,
            pass as u8
        );

        // 4. Closing row of the quarter
        let total_row = find_total_row(&matrix, &labels, third);
        report.set("tot_row_found", u8::from(total_row.is_some()));

        // 5. Spans
        let n = matrix.n_rows();
        let month_spans: [Range<usize>; 3] = [
            first..second,
            second..third,
            third..total_row.unwrap_or(n),
        ];
        let total_span = total_row.map(|tot| continue_total(&matrix, &month_spans, tot));
        let end_row = match &total_span {
            Some(span) => span.end - 1,
            None => month_spans[2].end - 1,
        };

        let mut row_spans: Vec<Option<SpanKind>> = vec![None; end_row + 1];
        let kinds = [SpanKind::Month1, SpanKind::Month2, SpanKind::Month3];
        for (kind, span) in kinds.iter().zip(month_spans.iter()) {
            for r in span.clone() {
                row_spans[r] = Some(*kind);
            }
        }
        if let Some(span) = &total_span {
            for r in span.clone() {
                row_spans[r] = Some(SpanKind::Total);
            }
        }

        let opener_tokens = [
            pass.date_tokens(&tokens[first]),
            pass.date_tokens(&tokens[second]),
            pass.date_tokens(&tokens[third]),
        ];

        // 6. Cut and clean up
        matrix.truncate_rows(end_row + 1);
        let (matrix, tags, mid_leftovers) = tidy_rows(matrix, row_spans);
        report.set("mid_leftover_rows", mid_leftovers.n_rows());

        Ok(SpanTable {
            matrix,
            tags,
            openers: opener_tokens,
            pass,
            total_found: total_row.is_some(),
            mid_leftovers,
        })
    }
}

// --- Steps ---

fn join_broken_rows(matrix: &mut CellMatrix) {
    for i in 0..matrix.n_rows().saturating_sub(1) {
        let (Some(label), Some(next)) = (matrix.get(i, 0), matrix.get(i + 1, 0)) else {
            continue;
        };
        let broken = BROKEN_ROW_ENDINGS
            .iter()
            .any(|ending| label.trim().ends_with(ending));
        if broken && matrix.values_empty(i, 1) {
            let joined = format!("{} {}", label, next);
            matrix.set(i + 1, 0, Some(joined));
            matrix.set(i, 0, None);
        }
    }
    matrix.drop_empty();
}

/// Groups rows by token signature and returns the chosen group of three.
fn find_openers(tokens: &[Vec<Token>]) -> Option<(PatternPass, [usize; 3])> {
    for pass in PatternPass::ALL {
        let mut groups: Vec<(Vec<TokenKind>, Vec<usize>)> = Vec::new();
        // Row 0 is the header
        for (r, row) in tokens.iter().enumerate().skip(1) {
            let key: Vec<TokenKind> = row
                .iter()
                .filter(|t| pass.keeps(t))
                .map(|t| t.kind.clone())
                .collect();
            if key.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(r),
                None => groups.push((key, vec![r])),
            }
        }

        let triples: Vec<&(Vec<TokenKind>, Vec<usize>)> =
            groups.iter().filter(|(_, rows)| rows.len() == 3).collect();
        if triples.len() > 1 {
            tracing::debug!("{} candidate opener groups in pass {}", triples.len(), pass as u8);
        }
        let chosen = triples.into_iter().min_by_key(|(key, _)| {
            key.iter()
                .filter_map(TokenKind::tie_break_text)
                .filter(|t| t.chars().count() >= 2)
                .count()
        });
        if let Some((_, rows)) = chosen {
            return Some((pass, [rows[0], rows[1], rows[2]]));
        }
    }
    None
}

fn find_total_row(matrix: &CellMatrix, labels: &[String], third: usize) -> Option<usize> {
    let n = matrix.n_rows();
    let after = third + 1..n;
    let label_has = |r: &usize, needle: &str| labels[*r].contains(needle);

    // a. explicit total label
    if let Some(r) = after.clone().find(|r| label_has(r, "total")) {
        return Some(r);
    }
    // b. month 3 carries values and one row follows it
    if !matrix.values_empty(third, 1) && third + 1 == n.saturating_sub(1) {
        return Some(third + 1);
    }
    // c, d. quarter wording
    if let Some(r) = after.clone().find(|r| label_has(r, "quarter")) {
        return Some(r);
    }
    if let Some(r) = after.clone().find(|r| label_has(r, "three")) {
        return Some(r);
    }
    // e. unlabeled value row shortly after the first value row
    let start = (third..n)
        .find(|&r| !matrix.values_empty(r, 1))
        .map_or(third + 1, |r| r + 1);
    (start..n).find(|&r| {
        matrix.get(r, 0).is_none() && !matrix.values_empty(r, 1) && r - start <= 2
    })
}

/// Total row plus the rows after it whose labels already appeared inside a
/// month span.
fn continue_total(matrix: &CellMatrix, months: &[Range<usize>; 3], tot: usize) -> Range<usize> {
    let seen: HashSet<&str> = months
        .iter()
        .flat_map(|span| span.clone().skip(1))
        .filter_map(|r| matrix.get(r, 0))
        .collect();
    let end = (tot + 1..matrix.n_rows())
        .find(|&r| !matrix.get(r, 0).map_or(false, |label| seen.contains(label)))
        .unwrap_or(matrix.n_rows());
    tot..end
}

struct TaggedRows {
    matrix: CellMatrix,
    spans: Vec<Option<SpanKind>>,
    ranks: Vec<Option<usize>>,
}

impl TaggedRows {
    fn first_opener(&self) -> usize {
        (0..self.spans.len())
            .find(|&r| self.spans[r] == Some(SpanKind::Month1) && self.ranks[r] == Some(0))
            .unwrap_or(1)
    }

    fn remove(&mut self, doomed: &[usize]) {
        self.matrix.remove_rows(doomed);
        let keep: Vec<bool> = (0..self.spans.len()).map(|r| !doomed.contains(&r)).collect();
        let mut flags = keep.iter();
        self.spans.retain(|_| flags.next().copied().unwrap_or(true));
        let mut flags = keep.iter();
        self.ranks.retain(|_| flags.next().copied().unwrap_or(true));
    }
}

fn tidy_rows(
    matrix: CellMatrix,
    spans: Vec<Option<SpanKind>>,
) -> (CellMatrix, Vec<RowTag>, CellMatrix) {
    let ranks = ranks_of(&spans);
    let mut rows = TaggedRows {
        matrix,
        spans,
        ranks,
    };

    // A marker-only row between header and first opener joins the header
    if rows.first_opener() == 2 {
        let markers_only = rows
            .matrix
            .row(1)
            .iter()
            .all(|c| text::is_footnote_only(c.as_deref()));
        if markers_only {
            for c in 0..rows.matrix.n_cols() {
                if rows.matrix.get(0, c).is_none() {
                    let marker = rows.matrix.get(1, c).map(str::to_string);
                    rows.matrix.set(0, c, marker);
                }
            }
            rows.remove(&[1]);
        }
    }

    // Value-less rows above month 1 go; the rest are leftovers
    let first = rows.first_opener();
    if first > 1 {
        let empty: Vec<usize> = (1..first)
            .filter(|&r| rows.matrix.values_empty(r, 1))
            .collect();
        rows.remove(&empty);
    }
    let first = rows.first_opener();
    let mut mid_leftovers = CellMatrix::default();
    if first > 1 {
        mid_leftovers = rows.matrix.slice_rows(1..first);
        let doomed: Vec<usize> = (1..first).collect();
        rows.remove(&doomed);
    }

    // Value-less rows inside a span go, as long as one row stays
    let mut doomed = Vec::new();
    for kind in [SpanKind::Month1, SpanKind::Month2, SpanKind::Month3, SpanKind::Total] {
        let members: Vec<usize> = (0..rows.spans.len())
            .filter(|&r| rows.spans[r] == Some(kind))
            .collect();
        let empty: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&r| rows.matrix.values_empty(r, 1))
            .collect();
        if members.len() > empty.len() {
            doomed.extend(empty);
        }
    }
    rows.remove(&doomed);

    let tags = rows
        .spans
        .iter()
        .zip(rows.ranks.iter())
        .skip(1)
        .filter_map(|(span, rank)| {
            Some(RowTag {
                span: (*span)?,
                rank: (*rank)?,
            })
        })
        .collect();
    (rows.matrix, tags, mid_leftovers)
}

/// Running count of rows per span, in row order.
fn ranks_of(spans: &[Option<SpanKind>]) -> Vec<Option<usize>> {
    let mut counts = [0usize; 4];
    spans
        .iter()
        .map(|span| {
            span.map(|kind| {
                let slot = &mut counts[usize::from(kind.id() - 1)];
                let rank = *slot;
                *slot += 1;
                rank
            })
        })
        .collect()
}
