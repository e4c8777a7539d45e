// src/extractors/dates.rs
//! Date resolver: turns the three month-opener labels into absolute
//! start/end date pairs.

// --- Imports ---
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::spans::{SpanKind, Token, TokenKind};
use crate::utils::error::ExtractError;

const STAGE: &str = "dates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Resolved ranges of the three reporting months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyDates {
    pub months: [DateRange; 3],
}

impl MonthlyDates {
    /// Month 1 start through month 3 end.
    pub fn quarter(&self) -> DateRange {
        DateRange {
            start: self.months[0].start,
            end: self.months[2].end,
        }
    }

    pub fn for_span(&self, span: SpanKind) -> DateRange {
        match span {
            SpanKind::Month1 => self.months[0],
            SpanKind::Month2 => self.months[1],
            SpanKind::Month3 => self.months[2],
            SpanKind::Total => self.quarter(),
        }
    }
}

// --- Shapes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    M,
    D,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    FullDates,
    MonthTwoDaysYear,
    Month,
    MonthDayMonthDay,
    MonthYear,
    MonthDayYear,
    MonthTwoDays,
    NumericShortYears,
    MonthDayMonthDayYear,
    NumericFullYears,
    MonthDayYearMonthDay,
    DayMonthDayMonthYear,
    DayMonthYearTwice,
    TwoDaysMonthYear,
}

use Part::{D, M, Y};

const SHAPES: [(&[Part], Shape); 14] = [
    (&[M, D, Y, M, D, Y], Shape::FullDates),
    (&[M, D, D, Y], Shape::MonthTwoDaysYear),
    (&[M], Shape::Month),
    (&[M, D, M, D], Shape::MonthDayMonthDay),
    (&[M, Y], Shape::MonthYear),
    (&[M, D, Y], Shape::MonthDayYear),
    (&[M, D, D], Shape::MonthTwoDays),
    (&[D, D, D, D, D, D], Shape::NumericShortYears),
    (&[M, D, M, D, Y], Shape::MonthDayMonthDayYear),
    (&[D, D, Y, D, D, Y], Shape::NumericFullYears),
    (&[M, D, Y, M, D], Shape::MonthDayYearMonthDay),
    (&[D, M, D, M, Y], Shape::DayMonthDayMonthYear),
    (&[D, M, Y, D, M, Y], Shape::DayMonthYearTwice),
    (&[D, D, M, Y], Shape::TwoDaysMonthYear),
];

fn shape_of(parts: &[Part]) -> Option<Shape> {
    SHAPES
        .iter()
        .find(|(pattern, _)| *pattern == parts)
        .map(|(_, shape)| *shape)
}

/// Which of two leading numbers is the month in all-numeric dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericOrder {
    MonthFirst,
    DayFirst,
}

fn part_of(token: &Token) -> Option<Part> {
    match token.kind {
        TokenKind::Month => Some(M),
        TokenKind::DayOrMonth => Some(D),
        TokenKind::Year => Some(Y),
        _ => None,
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// One opener row reduced to its date tokens.
#[derive(Debug, Clone)]
struct DateRow {
    parts: Vec<Part>,
    values: Vec<u32>,
}

impl DateRow {
    fn from_tokens(tokens: &[Token]) -> Result<Self, ExtractError> {
        let mut parts = Vec::new();
        let mut values = Vec::new();
        for token in tokens {
            let Some(part) = part_of(token) else {
                continue;
            };
            let value = match part {
                M => month_number(&token.text).ok_or_else(|| {
                    ExtractError::stage(STAGE, format!("unknown month name {:?}", token.text))
                })?,
                D | Y => token.text.parse::<u32>().map_err(|e| {
                    ExtractError::stage(STAGE, format!("bad number {:?}: {}", token.text, e))
                })?,
            };
            parts.push(part);
            values.push(value);
        }
        Ok(Self { parts, values })
    }

    fn skip(&self, bias: usize) -> (&[Part], &[u32]) {
        let bias = bias.min(self.parts.len());
        (&self.parts[bias..], &self.values[bias..])
    }
}

// --- Resolution ---

/// Resolves the three openers. With `per_row`, each row picks its own
/// shape; otherwise the first row's shape applies to all three.
pub fn resolve_months(
    openers: &[Vec<Token>; 3],
    per_row: bool,
    period_end: Option<NaiveDate>,
    report: &mut ExtractionReport,
) -> Result<MonthlyDates, ExtractError> {
    let rows: Vec<DateRow> = openers
        .iter()
        .map(|tokens| DateRow::from_tokens(tokens))
        .collect::<Result<_, _>>()?;
    let period_year = period_end.map(|d| d.year());

    let resolved = if per_row {
        let mut months = Vec::with_capacity(3);
        for row in &rows {
            match resolve_group(std::slice::from_ref(row), period_year) {
                Some(mut one) => months.append(&mut one),
                None => break,
            }
        }
        (months.len() == 3).then_some(months)
    } else {
        resolve_group(&rows, period_year)
    };

    let Some(months) = resolved else {
        tracing::info!("Could not resolve monthly dates from {:?}", openers);
        return Err(TerminalStatus::MonthlyIntervalDatesConvertedIssue.into());
    };
    let dates = MonthlyDates {
        months: [months[0], months[1], months[2]],
    };
    for (i, range) in dates.months.iter().enumerate() {
        tracing::info!("Month {}: {} to {}", i + 1, range.start, range.end);
    }
    report.set(
        "monthly_dates",
        serde_json::to_value(dates.months).unwrap_or(serde_json::Value::Null),
    );
    Ok(dates)
}

/// Shape taken from the first row, retried once without a leading day
/// number.
fn resolve_group(rows: &[DateRow], period_year: Option<i32>) -> Option<Vec<DateRange>> {
    let first = rows.first()?;
    for bias in 0..2 {
        let (parts, _) = first.skip(bias);
        if let Some(shape) = shape_of(parts) {
            let order = numeric_order(shape, rows, bias);
            let resolved: Option<Vec<DateRange>> = rows
                .iter()
                .map(|row| {
                    let (row_parts, values) = row.skip(bias);
                    if row_parts != parts {
                        return None;
                    }
                    resolve_row(shape, values, period_year, order)
                })
                .collect();
            if resolved.is_some() {
                return resolved;
            }
        }
        if parts.first() != Some(&D) {
            break;
        }
        tracing::debug!("Retrying date shape without the leading number");
    }
    None
}

/// Month/day order of the numeric shapes, decided across all rows.
fn numeric_order(shape: Shape, rows: &[DateRow], bias: usize) -> Option<NumericOrder> {
    if !matches!(shape, Shape::NumericShortYears | Shape::NumericFullYears) {
        return None;
    }
    let mut firsts = Vec::new();
    let mut seconds = Vec::new();
    for row in rows {
        let (_, v) = row.skip(bias);
        if v.len() < 6 {
            return None;
        }
        firsts.extend([v[0], v[3]]);
        seconds.extend([v[1], v[4]]);
    }
    let max_first = firsts.iter().copied().max()?;
    let max_second = seconds.iter().copied().max()?;
    match (max_first <= 12, max_second <= 12) {
        (true, false) => Some(NumericOrder::MonthFirst),
        (false, true) => Some(NumericOrder::DayFirst),
        _ => None,
    }
}

fn ymd(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

fn last_day(year: u32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    ymd(next_year, next_month, 1)?.pred_opt().map(|d| d.day())
}

fn range(start: (u32, u32, u32), end: (u32, u32, u32)) -> Option<DateRange> {
    Some(DateRange {
        start: ymd(start.0, start.1, start.2)?,
        end: ymd(end.0, end.1, end.2)?,
    })
}

fn whole_month(year: u32, month: u32) -> Option<DateRange> {
    range((year, month, 1), (year, month, last_day(year, month)?))
}

/// Maps one row's values onto (year, month, day) pairs. `None` when the
/// row does not describe real dates.
fn resolve_row(
    shape: Shape,
    v: &[u32],
    period_year: Option<i32>,
    order: Option<NumericOrder>,
) -> Option<DateRange> {
    let py = || period_year.and_then(|y| u32::try_from(y).ok());
    match shape {
        Shape::FullDates => range((v[2], v[0], v[1]), (v[5], v[3], v[4])),
        Shape::MonthTwoDaysYear => range((v[3], v[0], v[1]), (v[3], v[0], v[2])),
        Shape::Month => whole_month(py()?, v[0]),
        Shape::MonthDayMonthDay => {
            let year = py()?;
            range((year, v[0], v[1]), (year, v[2], v[3]))
        }
        Shape::MonthYear => whole_month(v[1], v[0]),
        Shape::MonthDayYear => range((v[2], v[0], 1), (v[2], v[0], v[1])),
        Shape::MonthTwoDays => {
            let year = py()?;
            range((year, v[0], v[1]), (year, v[0], v[2]))
        }
        Shape::NumericShortYears => {
            let (y1, y2) = (2000 + v[2], 2000 + v[5]);
            match order? {
                NumericOrder::MonthFirst => range((y1, v[0], v[1]), (y2, v[3], v[4])),
                NumericOrder::DayFirst => range((y1, v[1], v[0]), (y2, v[4], v[3])),
            }
        }
        Shape::MonthDayMonthDayYear => range((v[4], v[0], v[1]), (v[4], v[2], v[3])),
        Shape::NumericFullYears => match order? {
            NumericOrder::MonthFirst => range((v[2], v[0], v[1]), (v[5], v[3], v[4])),
            NumericOrder::DayFirst => range((v[2], v[1], v[0]), (v[5], v[4], v[3])),
        },
        Shape::MonthDayYearMonthDay => range((v[2], v[0], v[1]), (v[2], v[3], v[4])),
        Shape::DayMonthDayMonthYear => range((v[4], v[1], v[0]), (v[4], v[3], v[2])),
        Shape::DayMonthYearTwice => range((v[2], v[1], v[0]), (v[5], v[4], v[3])),
        Shape::TwoDaysMonthYear => range((v[3], v[2], v[0]), (v[3], v[2], v[1])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::spans::tokenize;

    fn openers(labels: [&str; 3]) -> [Vec<Token>; 3] {
        labels.map(|l| tokenize(&l.to_lowercase(), &(1990..=2025)))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn resolve(labels: [&str; 3], period_end: Option<NaiveDate>) -> Result<MonthlyDates, ExtractError> {
        let mut report = ExtractionReport::new();
        resolve_months(&openers(labels), false, period_end, &mut report)
    }

    #[test]
    fn test_full_dates() {
        let dates = resolve(
            ["April 1 2023 - April 30 2023", "May 1 2023 - May 31 2023", "June 1 2023 - June 30 2023"],
            None,
        )
        .unwrap();
        assert_eq!(
            dates.months[0],
            DateRange {
                start: date(2023, 4, 1),
                end: date(2023, 4, 30)
            }
        );
        assert_eq!(dates.quarter().end, date(2023, 6, 30));
    }

    #[test]
    fn test_bare_month_uses_period_year() {
        let dates = resolve(["May", "June", "July"], Some(date(2023, 7, 31))).unwrap();
        assert_eq!(
            dates.months[0],
            DateRange {
                start: date(2023, 5, 1),
                end: date(2023, 5, 31)
            }
        );

        let err = resolve(["May", "June", "July"], None).unwrap_err();
        assert_eq!(
            err,
            ExtractError::Terminated(TerminalStatus::MonthlyIntervalDatesConvertedIssue)
        );
    }

    #[test]
    fn test_month_with_two_days_uses_period_year() {
        let dates = resolve(["Oct 1 - 31", "Nov 1 - 30", "Dec 1 - 31"], Some(date(2022, 12, 31)))
            .unwrap();
        assert_eq!(dates.months[2].start, date(2022, 12, 1));
        assert_eq!(dates.months[2].end, date(2022, 12, 31));
    }

    #[test]
    fn test_numeric_dates_infer_month_first() {
        let dates = resolve(["4/1/23 - 4/30/23", "5/1/23 - 5/31/23", "6/1/23 - 6/30/23"], None)
            .unwrap();
        assert_eq!(dates.months[1].start, date(2023, 5, 1));
        assert_eq!(dates.months[1].end, date(2023, 5, 31));
    }

    #[test]
    fn test_numeric_dates_infer_day_first() {
        let dates = resolve(
            ["01/04/2023 - 30/04/2023", "01/05/2023 - 31/05/2023", "01/06/2023 - 30/06/2023"],
            None,
        )
        .unwrap();
        assert_eq!(dates.months[0].end, date(2023, 4, 30));
    }

    #[test]
    fn test_leading_number_is_dropped_on_retry() {
        let dates = resolve(["Month #1 April 2023", "Month #2 May 2023", "Month #3 June 2023"], None)
            .unwrap();
        assert_eq!(dates.months[0].start, date(2023, 4, 1));
        assert_eq!(dates.months[2].end, date(2023, 6, 30));
    }

    #[test]
    fn test_february_leap_year_and_day_month_shapes() {
        let dates = resolve(
            ["1 February - 29 February 2024", "1 March - 31 March 2024", "1 April - 30 April 2024"],
            None,
        )
        .unwrap();
        assert_eq!(dates.months[0].end, date(2024, 2, 29));
    }

    #[test]
    fn test_per_row_shapes() {
        let mut report = ExtractionReport::new();
        let dates = resolve_months(
            &openers(["January 2023", "February 1 - 28, 2023", "March 2023"]),
            true,
            None,
            &mut report,
        )
        .unwrap();
        assert_eq!(dates.months[1].end, date(2023, 2, 28));
        assert!(report.get("monthly_dates").is_some());
    }

    #[test]
    fn test_unknown_shape_aborts() {
        let err = resolve(["Q1", "Q2", "Q3"], None).unwrap_err();
        assert_eq!(
            err,
            ExtractError::Terminated(TerminalStatus::MonthlyIntervalDatesConvertedIssue)
        );
    }
}
