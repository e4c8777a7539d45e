// src/extractors/normalize.rs
//! Table normalizer: raw grid in, header-first matrix out.
//!
//! Row 0 of the normalized matrix is the header row and column 0 holds the
//! period labels. Every pass ends with fully-empty rows and columns dropped.

// --- Imports ---
use std::collections::HashSet;

use crate::extractors::matrix::{Cell, CellMatrix};
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::scanner::RawTable;
use crate::extractors::text;
use crate::utils::error::ExtractError;

const STAGE: &str = "normalizer";

// In-table footnote block: rows past this index with a long reduced value.
const FOOTNOTE_ROW_MIN_INDEX: usize = 4;
const FOOTNOTE_ROW_MIN_CHARS: usize = 80;

// Header scoring thresholds. The rescore after a split-header merge is
// stricter on the long-header count.
const HEADER_MIN_CHARS: usize = 16;
const HEADER_LONG_CHARS_FIRST: usize = 35;
const HEADER_LONG_CHARS_SECOND: usize = 40;
const HEADER_SCORE_REQUIRED: u8 = 3;

// --- Output ---

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    /// Header at row 0, period labels in column 0.
    pub matrix: CellMatrix,
    /// Rows found above the header row.
    pub top_leftovers: CellMatrix,
    /// Header-less columns carrying values no named column has.
    pub auxiliary: CellMatrix,
    /// Footnote block cut from the bottom of the table.
    pub notes: CellMatrix,
}

/// Runs every normalizer pass over a freshly scanned table.
pub fn normalize_table(
    raw: RawTable,
    report: &mut ExtractionReport,
) -> Result<NormalizedTable, ExtractError> {
    // 1. Column labels become row 0
    let mut matrix = promote_labels(raw);

    // 2. Per-cell rewrites
    clean_cells(&mut matrix);
    matrix.drop_empty();
    if matrix.is_empty() {
        return Err(ExtractError::stage(STAGE, "table is empty after cell cleanup"));
    }

    // 3. Footnote block inside the table
    let notes = cut_footnote_rows(&mut matrix);
    if notes.n_rows() > 0 {
        tracing::debug!("Cut {} footnote rows from the table bottom", notes.n_rows());
    }

    // 4. Header row
    let top_leftovers = assemble_header(&mut matrix, report)?;
    report.set("top_leftover_rows", top_leftovers.n_rows());

    // 5. Structural passes until nothing moves
    let mut matrix = normalize(matrix);

    // 6. One column per header name
    group_header_columns(&mut matrix)?;

    // 7. Nameless columns
    let auxiliary = split_nameless_columns(&mut matrix);
    report.set("aux_columns", auxiliary.n_cols());

    // 8. Parenthesis health
    check_parentheses(&matrix)?;

    tracing::info!(
        "Normalized table: {} rows x {} columns",
        matrix.n_rows(),
        matrix.n_cols()
    );
    Ok(NormalizedTable {
        matrix,
        top_leftovers,
        auxiliary,
        notes,
    })
}

/// Cell rewrites plus structural passes, repeated to a fixed point. Assumes
/// the header is row 0. Applying it to its own output changes nothing.
pub fn normalize(mut matrix: CellMatrix) -> CellMatrix {
    clean_cells(&mut matrix);
    matrix.drop_empty();
    loop {
        let before = matrix.clone();
        fold_footnote_columns(&mut matrix);
        merge_dollar_columns(&mut matrix);
        merge_scattered_columns(&mut matrix, Pairing::SameHeader);
        merge_scattered_columns(&mut matrix, Pairing::BothUnnamed);
        matrix.map_cells(|t| Some(text::tighten_parens(t)));
        drop_duplicate_columns(&mut matrix);
        matrix.drop_empty();
        if matrix == before {
            return matrix;
        }
    }
}

// --- Labels and cell rewrites ---

fn promote_labels(raw: RawTable) -> CellMatrix {
    let RawTable { labels, body } = raw;
    let Some(labels) = labels else {
        return body;
    };
    let labels: Vec<Cell> = labels
        .into_iter()
        .map(|label| label.map(|t| text::collapse_whitespace(&t)))
        .collect();

    let mut rows = Vec::with_capacity(body.n_rows() + 1);
    rows.push(labels);
    rows.extend(body.rows().iter().cloned());
    let mut matrix = CellMatrix::new(rows);

    // Same-named columns: empty duplicates go, one survivor if all are empty
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for c in 0..matrix.n_cols() {
        let Some(name) = matrix.get(0, c).map(str::to_string) else {
            continue;
        };
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, cols)) => cols.push(c),
            None => groups.push((name, vec![c])),
        }
    }
    let mut doomed = Vec::new();
    for (_, cols) in groups.iter().filter(|(_, cols)| cols.len() > 1) {
        let (empty, filled): (Vec<usize>, Vec<usize>) =
            cols.iter().partition(|&&c| data_empty(&matrix, c));
        if filled.is_empty() {
            doomed.extend(empty.into_iter().skip(1));
        } else {
            doomed.extend(empty);
        }
    }
    matrix.remove_columns(&doomed);
    matrix
}

/// The cell-level rewrites of the first pass.
pub fn clean_cells(matrix: &mut CellMatrix) {
    matrix.map_cells(|cell| {
        let t = text::clean_unicode(cell);
        let t = text::parenthesize_superscripts(&t);
        let t = text::brackets_to_parens(&t);
        let t = text::keep_issuer_parenthetical(&t)?;
        let t = text::tighten_parens(&t);
        let t = text::zeros_to_thousand(&t);
        Some(text::dollar_sign_to_word(&t))
    });
}

// --- Period column and header statistics ---

/// Last column identical to column 0 down to the last "total" row.
pub fn period_span_end(matrix: &CellMatrix) -> usize {
    let limit = (0..matrix.n_rows())
        .rev()
        .find(|&r| {
            matrix
                .get(r, 0)
                .map_or(false, |t| t.to_lowercase().contains("total"))
        })
        .map_or(matrix.n_rows(), |r| r + 1);
    (0..matrix.n_cols())
        .filter(|&c| (0..limit).all(|r| matrix.get(r, c) == matrix.get(r, 0)))
        .max()
        .unwrap_or(0)
}

/// Distinct non-empty reduced values of row `r`, from column `from` on.
fn reduced_uniques(matrix: &CellMatrix, r: usize, from: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in from..matrix.n_cols() {
        if let Some(cell) = matrix.get(r, c) {
            let reduced = text::reduce(cell);
            if !reduced.is_empty() && !out.contains(&reduced) {
                out.push(reduced);
            }
        }
    }
    out
}

fn cut_footnote_rows(matrix: &mut CellMatrix) -> CellMatrix {
    let from = period_span_end(matrix) + 1;
    let cut = (FOOTNOTE_ROW_MIN_INDEX + 1..matrix.n_rows()).find(|&r| {
        let uniques = reduced_uniques(matrix, r, from);
        uniques.len() <= 2
            && uniques
                .iter()
                .any(|u| u.chars().count() > FOOTNOTE_ROW_MIN_CHARS)
    });
    match cut {
        Some(r) => {
            let notes = matrix.slice_rows(r..matrix.n_rows());
            matrix.truncate_rows(r);
            matrix.drop_empty();
            notes
        }
        None => CellMatrix::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeaderStats {
    score: u8,
    header_row: Option<usize>,
}

fn score_header(matrix: &CellMatrix, long_chars: usize) -> HeaderStats {
    let from = period_span_end(matrix) + 1;
    let uniques: Vec<Vec<String>> = (0..matrix.n_rows())
        .map(|r| reduced_uniques(matrix, r, from))
        .collect();

    let mut score = 0;
    if uniques.iter().map(Vec::len).max() == Some(4) {
        score += 1;
    }
    let four: Vec<usize> = (0..uniques.len()).filter(|&r| uniques[r].len() == 4).collect();
    let mut header_row = None;
    if let [row] = four.as_slice() {
        score += 1;
        header_row = Some(*row);
        let lengths: Vec<usize> = uniques[*row].iter().map(|s| s.chars().count()).collect();
        let long = lengths.iter().filter(|&&l| l > long_chars).count();
        if lengths.iter().all(|&l| l > HEADER_MIN_CHARS) && long >= 2 {
            score += 1;
        }
    }
    HeaderStats { score, header_row }
}

/// Joins a header split across consecutive rows into the row just above
/// the first period label.
fn merge_split_header(matrix: &mut CellMatrix) {
    let period_end = period_span_end(matrix);
    let from = period_end + 1;
    let n = matrix.n_rows();
    let counts: Vec<usize> = (0..n).map(|r| reduced_uniques(matrix, r, from).len()).collect();

    let Some(first_nonempty) = counts.iter().position(|&u| u > 0) else {
        return;
    };
    let Some(first_empty) = (first_nonempty + 1..n).find(|&r| counts[r] == 0) else {
        return;
    };
    let last_nonempty = first_empty - 1;
    let Some(first_period) = (0..n).find(|&r| {
        matrix
            .get(r, period_end)
            .map_or(false, |t| !text::reduce(t).is_empty())
    }) else {
        return;
    };
    let last_index = first_period.min(last_nonempty);
    if last_index < first_nonempty || last_nonempty > last_index + 1 {
        return;
    }

    for c in from..matrix.n_cols() {
        let mut parts: Vec<String> = (first_nonempty..=last_index)
            .filter_map(|r| matrix.get(r, c).map(str::to_string))
            .collect();
        if last_nonempty > last_index {
            if let Some(extra) = matrix.get(last_nonempty, c) {
                parts.push(extra.to_string());
            }
            matrix.set(last_nonempty, c, None);
        }
        for r in first_nonempty..last_index {
            matrix.set(r, c, None);
        }
        matrix.set(last_index, c, Some(parts.join(" ")));
    }
    tracing::debug!(
        "Merged header rows {}..={} into row {}",
        first_nonempty,
        last_nonempty,
        last_index
    );
    matrix.drop_empty();
}

/// Finds the header row and moves it to row 0. Returns the rows that were
/// above it.
fn assemble_header(
    matrix: &mut CellMatrix,
    report: &mut ExtractionReport,
) -> Result<CellMatrix, ExtractError> {
    let mut stats = score_header(matrix, HEADER_LONG_CHARS_FIRST);
    report.set("first_reduced_stat", stats.score);
    tracing::debug!("First reduced stat: {:?}", stats);

    if stats.score < HEADER_SCORE_REQUIRED {
        merge_split_header(matrix);
        stats = score_header(matrix, HEADER_LONG_CHARS_SECOND);
        tracing::debug!("Second reduced stat: {:?}", stats);
    }
    report.set("second_reduced_stat", stats.score);

    let header_row = match stats.header_row {
        Some(r) if stats.score >= HEADER_SCORE_REQUIRED => r,
        _ => return Err(TerminalStatus::ReducedLessThan3.into()),
    };

    let mut start = header_row;
    if header_row > 0 {
        let above = header_row - 1;
        if matrix.row(above).iter().all(|c| text::is_footnote_only(c.as_deref())) {
            for c in 0..matrix.n_cols() {
                let merged = join_present([matrix.get(above, c), matrix.get(header_row, c)]);
                matrix.set(header_row, c, merged);
            }
            matrix.remove_rows(&[above]);
            start = above;
        }
    }
    let mut top = matrix.slice_rows(0..start);
    *matrix = matrix.slice_rows(start..matrix.n_rows());
    top.drop_empty();
    matrix.drop_empty();
    Ok(top)
}

// --- Structural passes ---

fn data_empty(matrix: &CellMatrix, c: usize) -> bool {
    (1..matrix.n_rows()).all(|r| matrix.get(r, c).is_none())
}

fn column_all(matrix: &CellMatrix, c: usize, pred: fn(Option<&str>) -> bool) -> bool {
    matrix.column(c).into_iter().all(pred)
}

fn join_present<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Cell {
    let joined: Vec<&str> = parts.into_iter().flatten().collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

/// Appends every value of column `left + 1` to column `left`.
fn fold_left(matrix: &mut CellMatrix, left: usize) {
    let right = left + 1;
    for r in 0..matrix.n_rows() {
        let Some(value) = matrix.get(r, right).map(str::to_string) else {
            continue;
        };
        let merged = join_present([matrix.get(r, left), Some(value.as_str())]);
        matrix.set(r, left, merged);
        matrix.set(r, right, None);
    }
}

fn fold_footnote_columns(matrix: &mut CellMatrix) {
    // Unnamed marker column right of a named one
    for i in 0..matrix.n_cols().saturating_sub(1) {
        if matrix.get(0, i + 1).is_none()
            && matrix.get(0, i).is_some()
            && column_all(matrix, i + 1, text::is_footnote_only)
        {
            fold_left(matrix, i);
        }
    }
    matrix.drop_empty();

    // Marker column whose header is itself a marker
    for i in 0..matrix.n_cols().saturating_sub(1) {
        if matrix.get(0, i + 1).is_some()
            && text::is_footnote_only(matrix.get(0, i + 1))
            && !text::is_footnote_only(matrix.get(0, i))
            && column_all(matrix, i + 1, text::is_footnote_only)
        {
            fold_left(matrix, i);
        }
    }
    matrix.drop_empty();
}

/// Moves bare `$` columns into the named column on their right.
fn merge_dollar_columns(matrix: &mut CellMatrix) {
    for i in 1..matrix.n_cols() {
        if matrix.get(0, i).is_none()
            || matrix.get(0, i - 1).is_some()
            || !column_all(matrix, i - 1, text::is_dollar_only)
        {
            continue;
        }
        for r in 0..matrix.n_rows() {
            if let Some(sign) = matrix.get(r, i - 1).map(|t| t.trim().to_string()) {
                let merged = join_present([Some(sign.as_str()), matrix.get(r, i)]);
                matrix.set(r, i, merged);
            }
            matrix.set(r, i - 1, None);
        }
    }
    matrix.drop_empty();
}

#[derive(Debug, Clone, Copy)]
enum Pairing {
    SameHeader,
    BothUnnamed,
}

/// Gathers values spread over two adjacent columns into the right one.
fn merge_scattered_columns(matrix: &mut CellMatrix, pairing: Pairing) {
    for i in 0..matrix.n_cols().saturating_sub(1) {
        let paired = match pairing {
            Pairing::SameHeader => {
                matrix.get(0, i).is_some() && matrix.get(0, i) == matrix.get(0, i + 1)
            }
            Pairing::BothUnnamed => matrix.get(0, i).is_none() && matrix.get(0, i + 1).is_none(),
        };
        if !paired {
            continue;
        }
        for r in 1..matrix.n_rows() {
            let Some(left) = matrix.get(r, i).map(|t| t.trim().to_string()) else {
                continue;
            };
            match matrix.get(r, i + 1).map(|t| t.trim().to_string()) {
                None => {
                    matrix.set(r, i, None);
                    matrix.set(r, i + 1, Some(left));
                }
                Some(right) if right.contains(&left) => matrix.set(r, i, None),
                Some(right) if !left.contains(&right) => {
                    matrix.set(r, i, None);
                    matrix.set(r, i + 1, Some(format!("{} {}", left, right)));
                }
                Some(_) => {}
            }
        }
    }
    matrix.drop_empty();
}

fn drop_duplicate_columns(matrix: &mut CellMatrix) {
    let mut seen: Vec<Vec<Cell>> = Vec::new();
    let mut doomed = Vec::new();
    for c in 0..matrix.n_cols() {
        let column = matrix.column_cells(c);
        if seen.contains(&column) {
            doomed.push(c);
        } else {
            seen.push(column);
        }
    }
    matrix.remove_columns(&doomed);
}

// --- Header grouping ---

/// Keeps one column per header name: the right-most one with data.
fn group_header_columns(matrix: &mut CellMatrix) -> Result<(), ExtractError> {
    let mut groups: Vec<(Option<String>, Vec<usize>)> = Vec::new();
    for c in 0..matrix.n_cols() {
        let name = matrix.get(0, c).map(str::to_string);
        match groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, cols)) => cols.push(c),
            None => groups.push((name, vec![c])),
        }
    }

    let mut keep = Vec::with_capacity(groups.len() + 1);
    for (name, cols) in &groups {
        let chosen = cols
            .iter()
            .rev()
            .find(|&&c| !data_empty(matrix, c))
            .or_else(|| cols.last());
        match chosen {
            Some(&c) => keep.push(c),
            None => {
                tracing::info!("No column kept for header {:?}", name);
                return Err(TerminalStatus::NotAllRolesFound.into());
            }
        }
    }
    if matrix.n_cols() > 0 && matrix.get(0, 0).is_none() && !keep.contains(&0) {
        keep.push(0);
    }
    matrix.retain_columns(&keep);
    matrix.drop_empty();
    Ok(())
}

/// Drops nameless columns whose values all appear in named columns; the
/// rest are moved out and returned.
fn split_nameless_columns(matrix: &mut CellMatrix) -> CellMatrix {
    let mut named_values: HashSet<String> = HashSet::new();
    let mut nameless = Vec::new();
    for c in 1..matrix.n_cols() {
        if matrix.get(0, c).is_none() {
            nameless.push(c);
            continue;
        }
        for r in 1..matrix.n_rows() {
            if let Some(v) = matrix.get(r, c) {
                named_values.insert(v.to_string());
            }
        }
    }

    let redundant: Vec<usize> = nameless
        .into_iter()
        .filter(|&c| {
            (1..matrix.n_rows())
                .filter_map(|r| matrix.get(r, c))
                .all(|v| named_values.contains(v))
        })
        .collect();
    matrix.remove_columns(&redundant);
    matrix.drop_empty();

    let exclusive: Vec<usize> = (1..matrix.n_cols())
        .filter(|&c| matrix.get(0, c).is_none())
        .collect();
    let mut auxiliary = CellMatrix::default();
    for &c in &exclusive {
        auxiliary.append_columns(&matrix.column_matrix(c));
    }
    if !exclusive.is_empty() {
        tracing::debug!("Set aside {} nameless columns", exclusive.len());
        matrix.remove_columns(&exclusive);
        matrix.drop_empty();
    }
    auxiliary
}

fn check_parentheses(matrix: &CellMatrix) -> Result<(), ExtractError> {
    for (r, row) in matrix.rows().iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Some(t) = cell {
                if !text::balanced_parens(t) {
                    tracing::info!("Unbalanced parentheses at ({}, {}): {:?}", r, c, t);
                    return Err(TerminalStatus::UnhealthyParenthesisFound.into());
                }
            }
        }
    }
    Ok(())
}

// --- Footnote markers ---

/// The marker a block of text starts with, if its first alphanumeric
/// character stands alone (`1.`, `(a)`, `B `).
pub fn lonely_marker(block: &str) -> Option<String> {
    let mut chars = block.chars().skip_while(|c| !c.is_ascii_alphanumeric());
    let first = chars.next()?;
    let next = chars.next();
    let lonely = if first.is_ascii_digit() {
        !next.map_or(false, |n| n.is_ascii_digit())
    } else if first.is_ascii_lowercase() {
        !next.map_or(false, char::is_lowercase)
    } else {
        !next.map_or(false, char::is_alphabetic)
    };
    lonely.then(|| first.to_string())
}

/// Wraps bare markers at either end of the header cells in parentheses:
/// `Purchased1` becomes `Purchased (1)`.
pub fn wrap_header_footnotes(matrix: &mut CellMatrix, markers: &[String]) {
    if markers.is_empty() || matrix.n_rows() == 0 {
        return;
    }
    for c in 1..matrix.n_cols() {
        let wrapped = matrix
            .get(0, c)
            .and_then(|cell| wrap_bare_markers(cell, markers));
        if let Some(wrapped) = wrapped {
            matrix.set(0, c, Some(wrapped));
        }
    }
}

fn header_tokens(cell: &str) -> Vec<String> {
    fn flush(word: &mut String, tokens: &mut Vec<String>) {
        if !word.is_empty() {
            tokens.push(std::mem::take(word));
        }
    }

    let mut tokens = Vec::new();
    for chunk in cell.split_whitespace() {
        let mut word = String::new();
        let mut prev: Option<char> = None;
        for ch in chunk.chars() {
            if matches!(ch, '(' | ')' | ',') {
                flush(&mut word, &mut tokens);
                tokens.push(ch.to_string());
            } else if ch.is_ascii_alphanumeric() {
                let boundary = prev.map_or(false, |p| {
                    (p.is_ascii_alphabetic() && ch.is_ascii_digit())
                        || (p.is_ascii_digit() && ch.is_ascii_alphabetic())
                });
                if boundary {
                    flush(&mut word, &mut tokens);
                }
                word.push(ch);
            } else {
                flush(&mut word, &mut tokens);
            }
            prev = Some(ch);
        }
        flush(&mut word, &mut tokens);
    }
    tokens
}

fn wrap_bare_markers(cell: &str, markers: &[String]) -> Option<String> {
    let mut tokens = header_tokens(cell);
    let mut changed = false;

    for i in 0..tokens.len() {
        if tokens[i] == "," {
            continue;
        }
        if !markers.contains(&tokens[i]) {
            break;
        }
        tokens[i] = format!("({})", tokens[i]);
        changed = true;
    }
    for i in (0..tokens.len()).rev() {
        if tokens[i] == "," {
            continue;
        }
        if !markers.contains(&tokens[i]) {
            break;
        }
        tokens[i] = format!("({})", tokens[i]);
        changed = true;
    }

    changed.then(|| tokens.join(" "))
}
