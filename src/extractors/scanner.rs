// src/extractors/scanner.rs

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;

use crate::extractors::config::ExtractorConfig;
use crate::extractors::matrix::{Cell, CellMatrix};
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::text;
use crate::utils::error::ExtractError;

// --- Constants ---
/// Distinct words typical of a repurchase table header.
pub const REPURCHASE_VOCABULARY: [&str; 28] = [
    "paid", "total", "part", "announced", "shares", "plans", "period", "purchases", "number",
    "share", "under", "publicly", "yet", "price", "programs", "average", "may", "per",
    "purchased", "plan", "program", "approximate", "maximum", "dollar", "value", "aggregate",
    "except", "dollars",
];

const FILTERED_WORDS: [&str; 30] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug",
    "sep", "oct", "nov", "dec", "thousand", "million", "billion", "thousands", "millions",
    "billions",
];

/// Tables with less visible text than this are ignored.
const MIN_TABLE_TEXT_CHARS: usize = 10;
/// Guard against absurd span attributes.
const MAX_SPAN: usize = 256;

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

static NON_LETTERS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z]+").expect("non-letter regex"));

// --- Data Structures ---

/// Structural and vocabulary features of one `<table>` in the section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableCandidate {
    pub index: usize,
    pub num_rows: usize,
    pub num_cols: usize,
    /// Counts after dropping fully-empty rows / columns.
    pub num_rows_nonempty: usize,
    pub num_cols_nonempty: usize,
    pub words: Vec<String>,
    /// Distinct words shared with [`REPURCHASE_VOCABULARY`].
    pub vocabulary_hits: usize,
}

impl TableCandidate {
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

/// How the table of interest was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Unique,
    Majority,
}

impl Selection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Selection::Unique => "unique",
            Selection::Majority => "majority_of_word_inter_len",
        }
    }
}

/// A parsed table: optional column labels (from `<thead>` or leading
/// all-`<th>` rows) and the body grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub labels: Option<Vec<Cell>>,
    pub body: CellMatrix,
}

/// The selected table and the section split around it.
#[derive(Debug, Clone)]
pub struct ScannedSection {
    pub table_index: usize,
    pub table: RawTable,
    pub before_html: String,
    pub after_html: String,
}

// --- Scanner ---

pub struct TableScanner<'a> {
    config: &'a ExtractorConfig,
}

impl<'a> TableScanner<'a> {
    pub fn new(config: &'a ExtractorConfig) -> Self {
        Self { config }
    }

    /// Finds the repurchase table in `section_html` and splits the section
    /// around it.
    pub fn scan(
        &self,
        section_html: &str,
        report: &mut ExtractionReport,
    ) -> Result<ScannedSection, ExtractError> {
        // 1. Parse the fragment and enumerate tables
        let document = Html::parse_fragment(section_html);
        let tables: Vec<ElementRef> = document.select(&TABLE_SELECTOR).collect();
        report.set("num_tables", tables.len());
        if tables.is_empty() {
            return Err(TerminalStatus::NumTablesZero.into());
        }

        // 2. Score every table
        let candidates: Vec<TableCandidate> = tables
            .iter()
            .enumerate()
            .map(|(index, table)| describe_table(index, *table))
            .collect();
        for c in &candidates {
            tracing::debug!(
                "Table {}: {}x{} ({}x{} non-empty), {} words, {} vocabulary hits",
                c.index,
                c.num_rows,
                c.num_cols,
                c.num_rows_nonempty,
                c.num_cols_nonempty,
                c.word_count(),
                c.vocabulary_hits
            );
        }

        // 3. Pick the table of interest
        let (table_id, selection) = select_table_of_interest(&candidates, self.config)?;
        report.set("table_of_interest_id", table_id);
        report.set("table_of_interest_selection", selection.as_str());
        tracing::info!("Selected table {} ({})", table_id, selection.as_str());

        // 4. Look for another significant table and excise it
        let other_id = select_other_significant(&candidates, table_id, self.config, report)?;
        let serialized = document.root_element().html();
        let kept: &str = match other_id {
            None => serialized.as_str(),
            Some(other_id) => {
                let other_html = tables[other_id].html();
                let (start, end) =
                    locate(&serialized, &other_html, self.config.locate_prefix_chars).map_err(
                        |missing| match missing {
                            Locate::NoStart => TerminalStatus::StartMatchOfSigWasntFound,
                            Locate::OutOfBounds => TerminalStatus::FailedToLocateSigTable,
                        },
                    )?;
                if other_id > table_id {
                    &serialized[..start]
                } else {
                    &serialized[end..]
                }
            }
        };

        // 5. Split the remaining section around the table of interest
        let table = tables[table_id];
        let (start, end) = locate(kept, &table.html(), self.config.locate_prefix_chars).map_err(
            |missing| match missing {
                Locate::NoStart => TerminalStatus::StartMatchOfTableWasntFound,
                Locate::OutOfBounds => TerminalStatus::FailedToLocateTable,
            },
        )?;

        let raw = parse_table(table);
        report.set("raw_rows", raw.body.n_rows());
        report.set("raw_cols", raw.body.n_cols());

        Ok(ScannedSection {
            table_index: table_id,
            table: raw,
            before_html: kept[..start].to_string(),
            after_html: kept[end..].to_string(),
        })
    }
}

// --- Selection rules ---

/// Applies the size / vocabulary filter and the dominance rule.
pub fn select_table_of_interest(
    candidates: &[TableCandidate],
    config: &ExtractorConfig,
) -> Result<(usize, Selection), ExtractError> {
    let mut qualifying: Vec<&TableCandidate> = candidates
        .iter()
        .filter(|c| {
            c.num_rows_nonempty >= config.min_rows
                && c.num_cols_nonempty >= config.min_cols
                && c.vocabulary_hits >= config.min_vocabulary
        })
        .collect();

    match qualifying.len() {
        0 => Err(TerminalStatus::NoTableOfInterestFound.into()),
        1 => Ok((qualifying[0].index, Selection::Unique)),
        _ => {
            // Stable sort keeps document order among equal scores.
            qualifying.sort_by(|a, b| b.vocabulary_hits.cmp(&a.vocabulary_hits));
            let best = qualifying[0].vocabulary_hits as f64;
            let runner_up = qualifying[1].vocabulary_hits as f64;
            if best >= config.dominance_ratio * runner_up {
                Ok((qualifying[0].index, Selection::Majority))
            } else {
                Err(TerminalStatus::MultipleTablesOfInterest.into())
            }
        }
    }
}

/// Finds the single other table worth excising, if any.
pub fn select_other_significant(
    candidates: &[TableCandidate],
    table_id: usize,
    config: &ExtractorConfig,
    report: &mut ExtractionReport,
) -> Result<Option<usize>, ExtractError> {
    let others: Vec<usize> = candidates
        .iter()
        .filter(|c| {
            c.index != table_id
                && c.num_cols_nonempty >= config.other_min_cols
                && c.word_count() > config.other_min_words
        })
        .map(|c| c.index)
        .collect();
    report.set("num_other_sig_tables", others.len());

    let other_id = match others.as_slice() {
        [] => return Ok(None),
        [only] => *only,
        many => {
            let first = many.iter().copied().min().unwrap_or(table_id);
            if first > table_id {
                first
            } else {
                return Err(TerminalStatus::MultipleOtherSigTables.into());
            }
        }
    };
    report.set("unique_other_sig_table_id", other_id);
    tracing::debug!("Other significant table: {}", other_id);
    Ok(Some(other_id))
}

// --- Locating serialized tables ---

enum Locate {
    NoStart,
    OutOfBounds,
}

fn locate(haystack: &str, table_html: &str, prefix_chars: usize) -> Result<(usize, usize), Locate> {
    let prefix_end = table_html
        .char_indices()
        .nth(prefix_chars)
        .map(|(i, _)| i)
        .unwrap_or(table_html.len());
    let start = haystack
        .find(&table_html[..prefix_end])
        .ok_or(Locate::NoStart)?;
    let end = start + table_html.len();
    if end > haystack.len() || !haystack.is_char_boundary(end) {
        tracing::warn!("Table located at {} but its span overruns the section", start);
        return Err(Locate::OutOfBounds);
    }
    Ok((start, end))
}

// --- Table parsing ---

fn describe_table(index: usize, table: ElementRef) -> TableCandidate {
    let words = table_words(table);
    let vocabulary: HashSet<&str> = REPURCHASE_VOCABULARY.iter().copied().collect();
    let distinct: HashSet<&str> = words.iter().map(String::as_str).collect();
    let vocabulary_hits = distinct.intersection(&vocabulary).count();

    let visible: usize = table.text().map(|t| t.trim().chars().count()).sum();
    if visible < MIN_TABLE_TEXT_CHARS {
        return TableCandidate {
            index,
            words,
            vocabulary_hits,
            ..Default::default()
        };
    }

    let raw = parse_table(table);
    let full = with_labels(&raw);
    let mut trimmed = full.clone();
    trimmed.drop_empty();
    TableCandidate {
        index,
        num_rows: full.n_rows(),
        num_cols: full.n_cols(),
        num_rows_nonempty: trimmed.n_rows(),
        num_cols_nonempty: trimmed.n_cols(),
        words,
        vocabulary_hits,
    }
}

fn with_labels(raw: &RawTable) -> CellMatrix {
    let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(raw.body.n_rows() + 1);
    if let Some(labels) = &raw.labels {
        rows.push(labels.clone());
    }
    rows.extend(raw.body.rows().iter().cloned());
    CellMatrix::new(rows)
}

fn table_words(table: ElementRef) -> Vec<String> {
    let text = element_text(table);
    NON_LETTERS_RE
        .split(&text)
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .filter(|w| !FILTERED_WORDS.contains(&w.as_str()))
        .collect()
}

/// Visible text with text nodes separated by single spaces.
pub fn element_text(element: ElementRef) -> String {
    let joined = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    text::collapse_whitespace(&joined)
}

/// True when `table` is the closest enclosing table of `row`.
fn owned_by(row: ElementRef, table: ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
        .map_or(false, |a| a.id() == table.id())
}

fn in_thead(row: ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|a| a.value().name() != "table")
        .any(|a| a.value().name() == "thead")
}

struct RawCell {
    text: Cell,
    colspan: usize,
    rowspan: usize,
    header: bool,
}

fn span_attr(cell: ElementRef, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1)
        .min(MAX_SPAN)
}

fn row_cells(row: ElementRef) -> Vec<RawCell> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .map(|c| {
            let text = element_text(c);
            RawCell {
                text: if text.is_empty() { None } else { Some(text) },
                colspan: span_attr(c, "colspan"),
                rowspan: span_attr(c, "rowspan"),
                header: c.value().name() == "th",
            }
        })
        .collect()
}

/// Reads a `<table>` into a grid, repeating spanned cells into every slot
/// they cover. Rows of nested tables are skipped.
pub fn parse_table(table: ElementRef) -> RawTable {
    let rows: Vec<ElementRef> = table
        .select(&ROW_SELECTOR)
        .filter(|tr| owned_by(*tr, table))
        .collect();

    let mut grid: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
    let mut header_flags: Vec<bool> = Vec::with_capacity(rows.len());
    let mut pending: Vec<Option<(usize, Cell)>> = Vec::new();

    for tr in &rows {
        let cells = row_cells(*tr);
        let all_th = !cells.is_empty() && cells.iter().all(|c| c.header);
        header_flags.push(in_thead(*tr) || all_th);

        let mut row: Vec<Cell> = Vec::new();
        let mut cells = cells.into_iter();
        loop {
            let col = row.len();
            if let Some(slot) = pending.get_mut(col) {
                if let Some((left, carried)) = slot.take() {
                    row.push(carried.clone());
                    if left > 1 {
                        *slot = Some((left - 1, carried));
                    }
                    continue;
                }
            }
            let Some(cell) = cells.next() else { break };
            for _ in 0..cell.colspan {
                let col = row.len();
                row.push(cell.text.clone());
                if cell.rowspan > 1 {
                    if pending.len() <= col {
                        pending.resize(col + 1, None);
                    }
                    pending[col] = Some((cell.rowspan - 1, cell.text.clone()));
                }
            }
        }
        // Carried cells right of the last real cell.
        for col in row.len()..pending.len() {
            if let Some((left, carried)) = pending[col].take() {
                row.resize(col, None);
                row.push(carried.clone());
                if left > 1 {
                    pending[col] = Some((left - 1, carried));
                }
            }
        }
        grid.push(row);
    }

    // Header rows: the <thead> rows, else the leading all-<th> rows.
    let has_thead = rows.iter().any(|tr| in_thead(*tr));
    let header_len = if has_thead {
        rows.iter().take_while(|tr| in_thead(**tr)).count()
    } else {
        header_flags.iter().take_while(|&&h| h).count()
    };
    let header_len = header_len.min(grid.len());

    let all = CellMatrix::new(grid);
    if header_len == 0 {
        return RawTable {
            labels: None,
            body: all,
        };
    }

    let labels: Vec<Cell> = (0..all.n_cols())
        .map(|c| {
            let parts: Vec<&str> = (0..header_len).filter_map(|r| all.get(r, c)).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        })
        .collect();
    RawTable {
        labels: Some(labels),
        body: all.slice_rows(header_len..all.n_rows()),
    }
}

// --- Fragment text helpers ---

/// Text of each top-level node of an HTML fragment, empty blocks skipped.
pub fn block_texts(fragment_html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(fragment_html);
    let mut blocks = Vec::new();
    for child in fragment.root_element().children() {
        let text = match child.value() {
            Node::Text(t) => text::collapse_whitespace(t),
            Node::Element(_) => match ElementRef::wrap(child) {
                Some(el) => element_text(el),
                None => continue,
            },
            _ => continue,
        };
        if !text.is_empty() {
            blocks.push(text);
        }
    }
    blocks
}

/// All visible text of a fragment, space separated.
pub fn fragment_text(fragment_html: &str) -> String {
    let fragment = Html::parse_fragment(fragment_html);
    element_text(fragment.root_element())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, hits: usize) -> TableCandidate {
        TableCandidate {
            index,
            num_rows: 6,
            num_cols: 5,
            num_rows_nonempty: 6,
            num_cols_nonempty: 5,
            words: vec!["word".to_string(); 20],
            vocabulary_hits: hits,
        }
    }

    const REPURCHASE_HEADER: &str = "<tr><th>Period</th><th>Total Number of Shares Purchased</th>\
        <th>Average Price Paid per Share</th>\
        <th>Total Number of Shares Purchased as Part of Publicly Announced Plans or Programs</th>\
        <th>Approximate Dollar Value of Shares that May Yet Be Purchased Under the Plans</th></tr>";

    fn repurchase_table() -> String {
        format!(
            "<table>{}\
             <tr><td>April 1 - 30, 2023</td><td>100</td><td>$10.00</td><td>100</td><td>$900</td></tr>\
             <tr><td>May 1 - 31, 2023</td><td>200</td><td>$11.00</td><td>200</td><td>$700</td></tr>\
             <tr><td>June 1 - 30, 2023</td><td>300</td><td>$12.00</td><td>300</td><td>$400</td></tr>\
             <tr><td>Total</td><td>600</td><td>$11.33</td><td>600</td><td></td></tr></table>",
            REPURCHASE_HEADER
        )
    }

    #[test]
    fn test_zero_tables_terminates() {
        let config = ExtractorConfig::default();
        let mut report = ExtractionReport::new();
        let err = TableScanner::new(&config)
            .scan("<p>No purchases were made during the quarter.</p>", &mut report)
            .unwrap_err();
        assert_eq!(err, ExtractError::Terminated(TerminalStatus::NumTablesZero));
        assert_eq!(report.get("num_tables"), Some(&serde_json::Value::from(0)));
    }

    #[test]
    fn test_dominance_ratio_boundary() {
        let config = ExtractorConfig::default();

        // 1.29x: too close to call
        let close = vec![candidate(0, 100), candidate(1, 129)];
        assert_eq!(
            select_table_of_interest(&close, &config).unwrap_err(),
            ExtractError::Terminated(TerminalStatus::MultipleTablesOfInterest)
        );

        // 1.31x: the stronger table wins
        let clear = vec![candidate(0, 100), candidate(1, 131)];
        assert_eq!(
            select_table_of_interest(&clear, &config).unwrap(),
            (1, Selection::Majority)
        );
    }

    #[test]
    fn test_no_qualifying_candidate() {
        let config = ExtractorConfig::default();
        let weak = vec![candidate(0, 7)];
        assert_eq!(
            select_table_of_interest(&weak, &config).unwrap_err(),
            ExtractError::Terminated(TerminalStatus::NoTableOfInterestFound)
        );
    }

    #[test]
    fn test_multiple_other_tables_before_selection_terminates() {
        let config = ExtractorConfig::default();
        let mut report = ExtractionReport::new();
        let candidates = vec![candidate(0, 2), candidate(1, 2), candidate(2, 12)];
        let err = select_other_significant(&candidates, 2, &config, &mut report).unwrap_err();
        assert_eq!(err, ExtractError::Terminated(TerminalStatus::MultipleOtherSigTables));

        let candidates = vec![candidate(0, 12), candidate(1, 2), candidate(2, 2)];
        let other = select_other_significant(&candidates, 0, &config, &mut report).unwrap();
        assert_eq!(other, Some(1));
    }

    #[test]
    fn test_parse_table_expands_colspan_and_rowspan() {
        let html = "<table>\
            <tr><td rowspan=\"2\">Period</td><td colspan=\"2\">Shares</td></tr>\
            <tr><td>A</td><td>B</td></tr></table>";
        let document = Html::parse_fragment(html);
        let table = document.select(&TABLE_SELECTOR).next().unwrap();
        let raw = parse_table(table);
        assert_eq!(raw.labels, None);
        assert_eq!(
            raw.body,
            CellMatrix::from_strs(&[&["Period", "Shares", "Shares"], &["Period", "A", "B"]])
        );
    }

    #[test]
    fn test_parse_table_reads_th_rows_as_labels() {
        let document = Html::parse_fragment(&repurchase_table());
        let table = document.select(&TABLE_SELECTOR).next().unwrap();
        let raw = parse_table(table);
        let labels = raw.labels.unwrap();
        assert_eq!(labels[0].as_deref(), Some("Period"));
        assert_eq!(raw.body.n_rows(), 4);
        assert_eq!(raw.body.get(0, 2), Some("$10.00"));
    }

    #[test]
    fn test_scan_splits_section_around_table() {
        let html = format!(
            "<p>(in thousands, except per share data)</p>{}<p>(1) Includes shares withheld.</p>\
             <table><tr><td>Exhibit</td><td>Description of the exhibit document</td>\
             <td>Filed herewith or incorporated by reference</td></tr></table>\
             <p>SIGNATURES</p>",
            repurchase_table()
        );
        let config = ExtractorConfig::default();
        let mut report = ExtractionReport::new();
        let scanned = TableScanner::new(&config).scan(&html, &mut report).unwrap();

        assert_eq!(scanned.table_index, 0);
        assert!(fragment_text(&scanned.before_html).contains("in thousands"));
        let after = block_texts(&scanned.after_html);
        assert!(after.iter().any(|b| b.starts_with("(1) Includes")));
        // The exhibit table and everything after it is cut away.
        assert!(!after.iter().any(|b| b.contains("SIGNATURES")));
        assert_eq!(report.get("num_other_sig_tables"), Some(&serde_json::Value::from(1)));
    }
}
