// src/extractors/roles.rs
//! Column role classifier and two-program disambiguation.

// --- Imports ---
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

use crate::extractors::matrix::CellMatrix;
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::spans::{RowTag, SpanKind, SpanTable};
use crate::extractors::text;
use crate::utils::error::ExtractError;

const PRICE_WORDS: [&str; 2] = ["price", "average"];
const REMAINING_WORDS: [&str; 5] = ["maximum", "yet", "approximate", "remained", "remaining"];
const PART_WORDS: [&str; 2] = ["part", "publicly"];

const POSITIVE_LABEL_WORDS: [&str; 3] = ["repurchase", "program", "open"];
const NEGATIVE_LABEL_WORDS: [&str; 7] = [
    "employe",
    "transaction",
    "retir",
    "asr",
    "accel",
    "compen",
    "opti",
];

// --- Column roles ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Period,
    Total,
    Price,
    PartOfProgram,
    Remaining,
    Unassigned,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Period => "period",
            ColumnRole::Total => "total",
            ColumnRole::Price => "price",
            ColumnRole::PartOfProgram => "part_of_program",
            ColumnRole::Remaining => "remaining",
            ColumnRole::Unassigned => "unassigned",
        }
    }

    /// Columns that receive scale codes.
    pub fn takes_scale(&self) -> bool {
        !matches!(self, ColumnRole::Period | ColumnRole::Price)
    }
}

/// One role per matrix column; column 0 is always the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColumnRoles(Vec<ColumnRole>);

impl ColumnRoles {
    pub fn get(&self, c: usize) -> ColumnRole {
        self.0.get(c).copied().unwrap_or(ColumnRole::Unassigned)
    }

    pub fn column_of(&self, role: ColumnRole) -> Option<usize> {
        self.0.iter().position(|r| *r == role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Assigns price, remaining, part-of-program and total roles from the words
/// found in each value column.
pub fn classify_columns(
    matrix: &CellMatrix,
    report: &mut ExtractionReport,
) -> Result<ColumnRoles, ExtractError> {
    let n_cols = matrix.n_cols();
    let mut roles = vec![ColumnRole::Unassigned; n_cols];
    if n_cols == 0 {
        return Err(TerminalStatus::NotAllRolesFound.into());
    }
    roles[0] = ColumnRole::Period;

    // 1. Word set per value column
    let words: Vec<HashSet<String>> = (0..n_cols)
        .map(|c| {
            matrix
                .column(c)
                .into_iter()
                .flatten()
                .flat_map(|cell| text::long_words(&text::reduce_spaced(cell)))
                .collect()
        })
        .collect();
    let hits = |c: usize, set: &[&str]| set.iter().any(|w| words[c].contains(*w));

    // 2. Keyword roles, each only when a single column qualifies
    let assign = |roles: &mut Vec<ColumnRole>, role: ColumnRole, set: &[&str]| {
        let candidates: Vec<usize> = (1..n_cols)
            .filter(|&c| roles[c] != ColumnRole::Remaining && hits(c, set))
            .collect();
        tracing::debug!("{} candidates for {}: {:?}", candidates.len(), role.as_str(), candidates);
        if let [only] = candidates.as_slice() {
            roles[*only] = role;
        }
    };
    assign(&mut roles, ColumnRole::Price, &PRICE_WORDS);
    assign(&mut roles, ColumnRole::Remaining, &REMAINING_WORDS);
    assign(&mut roles, ColumnRole::PartOfProgram, &PART_WORDS);

    // 3. Total takes the single column left
    let left: Vec<usize> = (1..n_cols)
        .filter(|&c| roles[c] == ColumnRole::Unassigned)
        .collect();
    if let [only] = left.as_slice() {
        roles[*only] = ColumnRole::Total;
    }

    let names: Vec<&str> = roles.iter().map(ColumnRole::as_str).collect();
    report.set("roles", serde_json::json!(names));

    let complete = n_cols == 5 && !roles.contains(&ColumnRole::Unassigned);
    if !complete {
        tracing::info!("Roles incomplete: {:?}", names);
        return Err(TerminalStatus::NotAllRolesFound.into());
    }
    Ok(ColumnRoles(roles))
}

// --- Programs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    /// The table reports one program.
    Single,
    Primary,
    Secondary,
    /// A row that belongs to neither program alone.
    Shared,
}

impl Program {
    pub fn id(&self) -> i8 {
        match self {
            Program::Single => 0,
            Program::Primary => 1,
            Program::Secondary => 2,
            Program::Shared => -1,
        }
    }
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.id())
    }
}

/// Program and label score for every tagged row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramAssignment {
    pub programs: Vec<Program>,
    pub scores: Vec<Option<i32>>,
    pub split: bool,
}

impl ProgramAssignment {
    fn single(rows: usize) -> Self {
        Self {
            programs: vec![Program::Single; rows],
            scores: vec![None; rows],
            split: false,
        }
    }

    fn shared(rows: usize) -> Self {
        Self {
            programs: vec![Program::Shared; rows],
            scores: vec![None; rows],
            split: true,
        }
    }

    fn mark(&mut self, rows: &[usize], program: Program, score: i32) {
        for &i in rows {
            self.programs[i] = program;
            self.scores[i] = Some(score);
        }
    }
}

/// Lexical score of a row label: program wording counts up, employee and
/// accelerated-repurchase wording counts down.
pub fn label_score(label: &str) -> i32 {
    let label = label.to_lowercase();
    let up = POSITIVE_LABEL_WORDS.iter().filter(|w| label.contains(*w)).count();
    let down = NEGATIVE_LABEL_WORDS.iter().filter(|w| label.contains(*w)).count();
    up as i32 - down as i32
}

/// Label used for grouping and scoring: markers and trailing punctuation
/// removed, lowercased.
fn program_label(label: Option<&str>) -> String {
    let key = text::label_key(label.unwrap_or_default());
    key.trim_end_matches([':', ',', '.', ';', '-'])
        .trim()
        .to_string()
}

/// Splits the tagged rows into programs when the spans repeat.
pub fn assign_programs(
    table: &SpanTable,
    score_gap: i32,
    report: &mut ExtractionReport,
) -> Result<ProgramAssignment, ExtractError> {
    let tags = &table.tags;
    let labels: Vec<String> = (0..tags.len())
        .map(|i| program_label(table.matrix.get(i + 1, 0)))
        .collect();

    let mut ranks: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for tag in tags {
        ranks.entry(tag.span.id()).or_default().push(tag.rank);
    }
    let spans: Vec<u8> = ranks.keys().copied().collect();
    let lens: Vec<usize> = ranks.values().map(Vec::len).collect();
    tracing::debug!("Span sizes {:?} for spans {:?}", lens, spans);

    let assignment = match (spans.as_slice(), lens.as_slice()) {
        ([1, 2, 3], [1, 1, 1]) => Some(ProgramAssignment::single(tags.len())),
        ([1, 2, 3, 4], [1, 1, 1, 1]) => single_rows(tags, &labels),
        ([1, 2, 3, 4], [2, 2, 2, 2] | [2, 2, 2, 1]) if paired_ranks(&ranks) => {
            paired(tags, &labels, score_gap)
        }
        ([1, 2, 3, 4], [a, b, c, 1]) if a.max(b).max(c) == &2 && a.min(b).min(c) == &1 => {
            partial(tags, &labels, score_gap)
        }
        _ => None,
    };

    let Some(assignment) = assignment else {
        tracing::info!("Could not settle programs for span sizes {:?}", lens);
        report.set("program_split", serde_json::Value::Null);
        return Err(TerminalStatus::DfOutputNotCreated.into());
    };
    report.set("program_split", assignment.split);
    Ok(assignment)
}

/// Month spans hold ranks {1, 2}; a single total row has rank 0.
fn paired_ranks(ranks: &BTreeMap<u8, Vec<usize>>) -> bool {
    ranks.iter().all(|(span, r)| {
        let set: HashSet<usize> = r.iter().copied().collect();
        match r.len() {
            2 => set == HashSet::from([1, 2]),
            _ => *span == SpanKind::Total.id() && set == HashSet::from([0]),
        }
    })
}

/// One row per span. Mixed 0/1 ranks mean one month carried a separate
/// sub-row, whose label sign decides its program.
fn single_rows(tags: &[RowTag], labels: &[String]) -> Option<ProgramAssignment> {
    let months: HashSet<usize> = tags
        .iter()
        .filter(|t| t.span.is_month())
        .map(|t| t.rank)
        .collect();
    let total_rank = tags.iter().find(|t| t.span == SpanKind::Total)?.rank;
    if total_rank != 0 {
        return None;
    }
    if months.len() == 1 && (months.contains(&0) || months.contains(&1)) {
        return Some(ProgramAssignment::single(tags.len()));
    }
    if months != HashSet::from([0, 1]) {
        return None;
    }

    let sub = tags.iter().position(|t| t.rank == 1)?;
    let score = label_score(&labels[sub]);
    let program = match score.signum() {
        1 => Program::Primary,
        -1 => Program::Secondary,
        _ => return None,
    };
    let mut assignment = ProgramAssignment::shared(tags.len());
    assignment.mark(&[sub], program, score);
    Some(assignment)
}

/// Every month repeats as rank 1 and rank 2 rows with one label each.
fn paired(tags: &[RowTag], labels: &[String], score_gap: i32) -> Option<ProgramAssignment> {
    let group = |rank: usize| -> (Vec<usize>, HashSet<&str>) {
        let rows: Vec<usize> = (0..tags.len()).filter(|&i| tags[i].rank == rank).collect();
        let names = rows.iter().map(|&i| labels[i].as_str()).collect();
        (rows, names)
    };
    let (rows1, names1) = group(1);
    let (rows2, names2) = group(2);
    if names1.len() != 1 || names2.len() != 1 {
        return None;
    }
    let score1 = label_score(names1.iter().next()?);
    let score2 = label_score(names2.iter().next()?);
    tracing::debug!("Program label scores {} and {}", score1, score2);

    let (primary, secondary) = ordered_by_score((rows1, score1), (rows2, score2), score_gap)?;
    let mut assignment = ProgramAssignment::shared(tags.len());
    assignment.mark(&primary.0, Program::Primary, primary.1);
    assignment.mark(&secondary.0, Program::Secondary, secondary.1);
    Some(assignment)
}

/// Some months repeat, others do not. The repeated sub-rows must carry
/// exactly two distinct labels.
fn partial(tags: &[RowTag], labels: &[String], score_gap: i32) -> Option<ProgramAssignment> {
    let mut by_label: Vec<(&str, Vec<usize>)> = Vec::new();
    for (i, tag) in tags.iter().enumerate() {
        if !tag.span.is_month() || tag.rank == 0 {
            continue;
        }
        match by_label.iter_mut().find(|(l, _)| *l == labels[i]) {
            Some((_, rows)) => rows.push(i),
            None => by_label.push((labels[i].as_str(), vec![i])),
        }
    }
    let [(label1, rows1), (label2, rows2)] = <[_; 2]>::try_from(by_label).ok()?;
    let score1 = label_score(label1);
    let score2 = label_score(label2);

    let (primary, secondary) = ordered_by_score((rows1, score1), (rows2, score2), score_gap)?;
    let mut assignment = ProgramAssignment::shared(tags.len());
    assignment.mark(&primary.0, Program::Primary, primary.1);
    assignment.mark(&secondary.0, Program::Secondary, secondary.1);
    Some(assignment)
}

type ScoredRows = (Vec<usize>, i32);

fn ordered_by_score(
    a: ScoredRows,
    b: ScoredRows,
    score_gap: i32,
) -> Option<(ScoredRows, ScoredRows)> {
    if a.1 - b.1 >= score_gap {
        Some((a, b))
    } else if b.1 - a.1 >= score_gap {
        Some((b, a))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::config::ExtractorConfig;
    use crate::extractors::spans::{PatternPass, SpanDetector};

    const HEADER: [&str; 5] = [
        "Period",
        "Total Number of Shares Purchased",
        "Average Price Paid per Share",
        "Total Number of Shares Purchased as Part of Publicly Announced Plans",
        "Approximate Dollar Value of Shares that May Yet Be Purchased",
    ];

    fn spans(rows: &[&[&str]]) -> SpanTable {
        let config = ExtractorConfig::default();
        let mut report = ExtractionReport::new();
        SpanDetector::new(&config)
            .detect(CellMatrix::from_strs(rows), &mut report)
            .unwrap()
    }

    #[test]
    fn test_classify_standard_header() {
        let matrix = CellMatrix::from_strs(&[&HEADER, &["April 2023", "1", "2", "3", "4"]]);
        let mut report = ExtractionReport::new();
        let roles = classify_columns(&matrix, &mut report).unwrap();

        assert_eq!(roles.get(0), ColumnRole::Period);
        assert_eq!(roles.get(1), ColumnRole::Total);
        assert_eq!(roles.get(2), ColumnRole::Price);
        assert_eq!(roles.get(3), ColumnRole::PartOfProgram);
        assert_eq!(roles.get(4), ColumnRole::Remaining);
        assert_eq!(
            report.get("roles"),
            Some(&serde_json::json!(["period", "total", "price", "part_of_program", "remaining"]))
        );
    }

    #[test]
    fn test_classify_ambiguous_price_fails() {
        let matrix = CellMatrix::from_strs(&[
            &["Period", "Average shares", "Average Price", "Part of plans", "Remaining"],
            &["April 2023", "1", "2", "3", "4"],
        ]);
        let mut report = ExtractionReport::new();
        assert_eq!(
            classify_columns(&matrix, &mut report).unwrap_err(),
            ExtractError::Terminated(TerminalStatus::NotAllRolesFound)
        );
    }

    #[test]
    fn test_label_score() {
        assert_eq!(label_score("open market repurchase program"), 3);
        assert_eq!(label_score("employee transaction"), -2);
        assert_eq!(label_score("shares withheld"), 0);
    }

    fn two_program_table(first: &str, second: &str) -> SpanTable {
        spans(&[
            &HEADER,
            &["April 2023", "", "", "", ""],
            &[first, "100", "10.00", "100", "900"],
            &[second, "5", "10.10", "", ""],
            &["May 2023", "", "", "", ""],
            &[first, "200", "11.00", "200", "700"],
            &[second, "6", "11.10", "", ""],
            &["June 2023", "", "", "", ""],
            &[first, "300", "12.00", "300", "400"],
            &[second, "7", "12.10", "", ""],
            &["Total", "", "", "", ""],
            &[first, "600", "11.00", "600", ""],
            &[second, "18", "11.10", "", ""],
        ])
    }

    #[test]
    fn test_programs_split_by_label_score() {
        let table = two_program_table("Open market repurchase program (1)", "Employee transactions");
        let mut report = ExtractionReport::new();
        let assignment = assign_programs(&table, 2, &mut report).unwrap();

        assert!(assignment.split);
        assert_eq!(assignment.programs[0], Program::Primary);
        assert_eq!(assignment.scores[0], Some(3));
        assert_eq!(assignment.programs[1], Program::Secondary);
        assert_eq!(assignment.programs[7], Program::Secondary);
        assert_eq!(report.get("program_split"), Some(&serde_json::Value::from(true)));
    }

    #[test]
    fn test_close_scores_abort() {
        let table = two_program_table("Repurchases", "Other purchases");
        let mut report = ExtractionReport::new();
        assert_eq!(
            assign_programs(&table, 2, &mut report).unwrap_err(),
            ExtractError::Terminated(TerminalStatus::DfOutputNotCreated)
        );
    }

    #[test]
    fn test_single_program_rows() {
        let table = spans(&[
            &HEADER,
            &["April 2023", "1", "2", "3", "4"],
            &["May 2023", "1", "2", "3", "4"],
            &["June 2023", "1", "2", "3", "4"],
            &["Total", "3", "2", "9", ""],
        ]);
        let mut report = ExtractionReport::new();
        let assignment = assign_programs(&table, 2, &mut report).unwrap();
        assert!(!assignment.split);
        assert!(assignment.programs.iter().all(|p| *p == Program::Single));
        assert_eq!(serde_json::to_string(&Program::Shared).unwrap(), "-1");
    }

    /// Tagged rows built directly, one value column.
    fn tagged(rows: &[(&str, SpanKind, usize)]) -> SpanTable {
        let mut cells: Vec<Vec<Option<String>>> =
            vec![vec![Some("Period".to_string()), Some("Shares".to_string())]];
        cells.extend(
            rows.iter()
                .map(|(label, _, _)| vec![Some(label.to_string()), Some("100".to_string())]),
        );
        SpanTable {
            matrix: CellMatrix::new(cells),
            tags: rows
                .iter()
                .map(|(_, span, rank)| RowTag { span: *span, rank: *rank })
                .collect(),
            openers: Default::default(),
            pass: PatternPass::WithPunctuation,
            total_found: true,
            mid_leftovers: CellMatrix::default(),
        }
    }

    fn programs_of(assignment: &ProgramAssignment) -> Vec<(Program, Option<i32>)> {
        assignment
            .programs
            .iter()
            .copied()
            .zip(assignment.scores.iter().copied())
            .collect()
    }

    #[test]
    fn test_partially_repeated_months() {
        let table = tagged(&[
            ("Open market repurchase program", SpanKind::Month1, 1),
            ("Employee transactions", SpanKind::Month1, 2),
            ("May 2023", SpanKind::Month2, 0),
            ("Open market repurchase program", SpanKind::Month3, 1),
            ("Employee transactions", SpanKind::Month3, 2),
            ("Total", SpanKind::Total, 0),
        ]);
        let mut report = ExtractionReport::new();
        let assignment = assign_programs(&table, 2, &mut report).unwrap();

        assert!(assignment.split);
        assert_eq!(
            programs_of(&assignment),
            vec![
                (Program::Primary, Some(3)),
                (Program::Secondary, Some(-2)),
                (Program::Shared, None),
                (Program::Primary, Some(3)),
                (Program::Secondary, Some(-2)),
                (Program::Shared, None),
            ]
        );
    }

    #[test]
    fn test_single_sub_row_takes_program_from_label_sign() {
        let rows = [
            ("April 2023", SpanKind::Month1, 0),
            ("May 2023", SpanKind::Month2, 0),
            ("Employee withholding", SpanKind::Month3, 1),
            ("Total", SpanKind::Total, 0),
        ];
        let mut report = ExtractionReport::new();
        let assignment = assign_programs(&tagged(&rows), 2, &mut report).unwrap();
        assert_eq!(
            programs_of(&assignment),
            vec![
                (Program::Shared, None),
                (Program::Shared, None),
                (Program::Secondary, Some(-1)),
                (Program::Shared, None),
            ]
        );
        assert_eq!(report.get("program_split"), Some(&serde_json::Value::from(true)));

        let mut neutral = rows;
        neutral[2].0 = "Other purchases";
        assert_eq!(
            assign_programs(&tagged(&neutral), 2, &mut report).unwrap_err(),
            ExtractError::Terminated(TerminalStatus::DfOutputNotCreated)
        );
    }
}

