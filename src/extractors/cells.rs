// src/extractors/cells.rs
//! Final cell cleanup, numeric coercion and the output table.

// --- Imports ---
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::extractors::dates::MonthlyDates;
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::roles::{ColumnRoles, Program, ProgramAssignment};
use crate::extractors::spans::{SpanKind, SpanTable};
use crate::extractors::text;
use crate::extractors::units::ScaleAssignment;
use crate::utils::error::ExtractError;

// --- Regex Patterns (Lazy Static) ---
static DOLLAR_PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\$\s*\)").expect("dollar paren regex"));
static PARENTHETICAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*\)\s*([,/&])?\s*").expect("parenthetical regex"));
static EDGE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[,/&]+\s*|\s*[,/&]+\s*$").expect("edge punctuation regex"));
static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\b|\d)(thousands?|millions?|billions?)\b").expect("unit regex")
});
static NOT_APPLICABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^n[/\-.,]?a$").expect("n/a regex"));
static PUNCTUATION_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^a-zA-Z0-9]+$").expect("punctuation regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

// --- Cell values ---

/// Marks a cell that held only removable decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
    FootnoteRemoved,
    ParentheticalRemoved,
    UnitRemoved,
    DollarRemoved,
    StarRemoved,
    /// "n/a", dashes and similar.
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Placeholder(Placeholder),
    /// Text that survived every cleanup step.
    Text(String),
}

impl CellValue {
    pub fn is_healthy(&self) -> bool {
        !matches!(self, CellValue::Text(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Runs `step`; an emptied, previously non-empty result becomes `placeholder`.
fn strip_step(
    text: String,
    placeholder: Placeholder,
    step: impl Fn(&str) -> String,
) -> Result<String, CellValue> {
    let stripped = step(&text);
    if !text.trim().is_empty() && stripped.trim().is_empty() {
        return Err(CellValue::Placeholder(placeholder));
    }
    Ok(stripped.trim().to_string())
}

fn drop_dollars(text: &str) -> String {
    DOLLAR_PAREN_RE.replace_all(text, "").replace('$', "")
}

fn drop_parentheticals(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = PARENTHETICAL_RE.replace_all(&current, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    EDGE_PUNCT_RE.replace_all(&current, "").into_owned()
}

fn drop_units(text: &str) -> String {
    let text = UNIT_RE.replace_all(text, "${1} ");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

fn drop_stars(text: &str) -> String {
    text.replace('*', "")
}

fn is_other(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if NOT_APPLICABLE_RE.is_match(&lower) {
        return true;
    }
    if PUNCTUATION_ONLY_RE.is_match(&lower) {
        let mut unique: Vec<char> = lower.chars().collect();
        unique.sort_unstable();
        unique.dedup();
        return unique.len() <= 2;
    }
    false
}

fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', "").parse::<f64>().ok())
}

/// Cleans one value cell. Returns the value and the footnote markers it
/// carried.
pub fn clean_cell(cell: Option<&str>) -> (CellValue, Vec<String>) {
    let Some(raw) = cell else {
        return (CellValue::Empty, Vec::new());
    };
    let footnotes = text::footnote_markers(raw);
    (clean_text(raw.trim().to_string()), footnotes)
}

fn clean_text(raw: String) -> CellValue {
    let steps: [(Placeholder, fn(&str) -> String); 5] = [
        (Placeholder::DollarRemoved, drop_dollars),
        (Placeholder::FootnoteRemoved, text::strip_footnote_markers),
        (Placeholder::ParentheticalRemoved, drop_parentheticals),
        (Placeholder::UnitRemoved, drop_units),
        (Placeholder::StarRemoved, drop_stars),
    ];
    let mut current = raw;
    for (placeholder, step) in steps {
        current = match strip_step(current, placeholder, step) {
            Ok(next) => next,
            Err(value) => return value,
        };
    }
    if current.is_empty() {
        return CellValue::Empty;
    }
    if is_other(&current) {
        return CellValue::Placeholder(Placeholder::Other);
    }
    match parse_number(&current) {
        Some(n) => CellValue::Number(n),
        None => CellValue::Text(current),
    }
}

// --- Output ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub span: SpanKind,
    pub rank: usize,
    pub program: Program,
    pub program_score: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: Option<String>,
    /// One value per column after the period column.
    pub values: Vec<CellValue>,
    pub footnotes: Vec<String>,
}

/// The structured repurchase table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputTable {
    pub roles: ColumnRoles,
    pub headers: Vec<Option<String>>,
    pub rows: Vec<OutputRow>,
    pub dollar_columns: Vec<bool>,
    pub scales: Vec<Option<u8>>,
}

impl OutputTable {
    pub fn rows_in(&self, span: SpanKind) -> impl Iterator<Item = &OutputRow> + '_ {
        self.rows.iter().filter(move |row| row.span == span)
    }
}

pub struct CellInputs<'a> {
    pub spans: &'a SpanTable,
    pub dates: &'a MonthlyDates,
    pub roles: &'a ColumnRoles,
    pub programs: &'a ProgramAssignment,
    pub scales: &'a ScaleAssignment,
}

/// Appends markers not yet listed, keeping first-seen order.
fn push_unique(footnotes: &mut Vec<String>, notes: Vec<String>) {
    for note in notes {
        if !footnotes.contains(&note) {
            footnotes.push(note);
        }
    }
}

/// Cleans every value cell and assembles the output table. Unhealthy units
/// win over unhealthy cells.
pub fn build_output(
    inputs: &CellInputs,
    report: &mut ExtractionReport,
) -> Result<OutputTable, ExtractError> {
    let matrix = &inputs.spans.matrix;
    let n_cols = matrix.n_cols();

    // 1. Clean rows
    let mut rows = Vec::with_capacity(inputs.spans.tags.len());
    for (i, tag) in inputs.spans.tags.iter().enumerate() {
        let r = i + 1;
        let label = matrix.get(r, 0).map(str::to_string);
        let mut footnotes = Vec::new();
        push_unique(
            &mut footnotes,
            label.as_deref().map(text::footnote_markers).unwrap_or_default(),
        );
        let mut values = Vec::with_capacity(n_cols.saturating_sub(1));
        for c in 1..n_cols {
            let (value, notes) = clean_cell(matrix.get(r, c));
            push_unique(&mut footnotes, notes);
            values.push(value);
        }
        let range = inputs.dates.for_span(tag.span);
        rows.push(OutputRow {
            span: tag.span,
            rank: tag.rank,
            program: inputs.programs.programs.get(i).copied().unwrap_or(Program::Single),
            program_score: inputs.programs.scores.get(i).copied().flatten(),
            start_date: range.start,
            end_date: range.end,
            label,
            values,
            footnotes,
        });
    }

    // 2. Health
    let cells_healthy = rows
        .iter()
        .flat_map(|row| row.values.iter())
        .all(CellValue::is_healthy);
    report.set("inner_cell_health", u8::from(cells_healthy));
    if !inputs.scales.healthy {
        return Err(TerminalStatus::UnhealthyUnit.into());
    }
    if !cells_healthy {
        let bad: Vec<&CellValue> = rows
            .iter()
            .flat_map(|row| row.values.iter())
            .filter(|v| !v.is_healthy())
            .collect();
        tracing::info!("Unhealthy cells: {:?}", bad);
        return Err(TerminalStatus::UnhealthyInnerCell.into());
    }

    Ok(OutputTable {
        roles: inputs.roles.clone(),
        headers: matrix.row(0).to_vec(),
        rows,
        dollar_columns: inputs.scales.dollar_columns.clone(),
        scales: inputs.scales.magnitudes.clone(),
    })
}
