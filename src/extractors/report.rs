// src/extractors/report.rs

// --- Imports ---
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::utils::error::ExtractError;

// --- Terminal statuses ---

/// The fixed set of reasons a run may stop early. The string forms are
/// stable identifiers consumed by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    LenHtmlZero,
    NumTablesZero,
    NoTableOfInterestFound,
    MultipleTablesOfInterest,
    MultipleOtherSigTables,
    StartMatchOfSigWasntFound,
    FailedToLocateSigTable,
    StartMatchOfTableWasntFound,
    FailedToLocateTable,
    UnhealthyParenthesisFound,
    ReducedLessThan3,
    Not3MonthlyIntervals,
    MonthlyIntervalDatesConvertedIssue,
    NotAllRolesFound,
    DfOutputNotCreated,
    UnhealthyUnit,
    UnhealthyInnerCell,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::LenHtmlZero => "len_html_zero",
            TerminalStatus::NumTablesZero => "num_tables_zero",
            TerminalStatus::NoTableOfInterestFound => "no_table_of_interest_found",
            TerminalStatus::MultipleTablesOfInterest => "multiple_tables_of_interest",
            TerminalStatus::MultipleOtherSigTables => "multiple_other_sig_tables",
            TerminalStatus::StartMatchOfSigWasntFound => "start_match_of_sig_wasnt_found",
            TerminalStatus::FailedToLocateSigTable => "failed_to_locate_sig_table",
            TerminalStatus::StartMatchOfTableWasntFound => "start_match_of_table_wasnt_found",
            TerminalStatus::FailedToLocateTable => "failed_to_locate_table",
            TerminalStatus::UnhealthyParenthesisFound => "Unhealthy_parenthesis_found",
            TerminalStatus::ReducedLessThan3 => "reduced_less_than_3",
            TerminalStatus::Not3MonthlyIntervals => "not_3_monthly_intervals",
            TerminalStatus::MonthlyIntervalDatesConvertedIssue => {
                "monthly_interval_dates_converted_issue"
            }
            TerminalStatus::NotAllRolesFound => "not_all_roles_found",
            TerminalStatus::DfOutputNotCreated => "df_output_not_created",
            TerminalStatus::UnhealthyUnit => "unhealthy_unit",
            TerminalStatus::UnhealthyInnerCell => "unhealthy_inner_cell",
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TerminalStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// --- Report ---

/// How a run ended, as far as the report is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Running,
    Success,
    Terminated(TerminalStatus),
    StageFailure { stage: String, message: String },
}

/// Ordered key/value diagnostics for one run plus its outcome.
///
/// Keys keep their first-insertion position; setting an existing key
/// overwrites its value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    entries: Vec<(String, Value)>,
    outcome: Outcome,
}

impl Default for ExtractionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionReport {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            outcome: Outcome::Running,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn mark_stage(&mut self, stage: &str, passed: bool) {
        self.set(&format!("{}_passed", stage), passed);
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn status(&self) -> Option<TerminalStatus> {
        match self.outcome {
            Outcome::Terminated(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Short label for logs and the `status` key.
    pub fn status_label(&self) -> String {
        match &self.outcome {
            Outcome::Running => "running".to_string(),
            Outcome::Success => "success".to_string(),
            Outcome::Terminated(status) => status.to_string(),
            Outcome::StageFailure { stage, .. } => format!("stage_failure:{}", stage),
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.outcome = Outcome::Success;
        self.set("status", "success");
    }

    /// Records a stage error as the run's outcome.
    pub(crate) fn fail(&mut self, error: &ExtractError) {
        match error {
            ExtractError::Terminated(status) => {
                self.outcome = Outcome::Terminated(*status);
                self.set("status", status.as_str());
            }
            ExtractError::Stage { stage, message } => {
                self.outcome = Outcome::StageFailure {
                    stage: stage.to_string(),
                    message: message.clone(),
                };
                self.set("status", "stage_failure");
                self.set("error_stage", *stage);
                self.set("error_message", message.as_str());
            }
        }
    }
}

impl Serialize for ExtractionReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_in_place_and_keeps_order() {
        let mut report = ExtractionReport::new();
        report.set("num_tables", 3);
        report.set("table_of_interest_id", 1);
        report.set("num_tables", 4);

        let keys: Vec<&str> = report.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["num_tables", "table_of_interest_id"]);
        assert_eq!(report.get("num_tables"), Some(&Value::from(4)));
    }

    #[test]
    fn test_termination_is_recorded_as_status() {
        let mut report = ExtractionReport::new();
        report.fail(&ExtractError::Terminated(TerminalStatus::UnhealthyParenthesisFound));

        assert_eq!(report.status(), Some(TerminalStatus::UnhealthyParenthesisFound));
        assert_eq!(
            report.get("status"),
            Some(&Value::from("Unhealthy_parenthesis_found"))
        );
        assert!(!report.is_success());
    }

    #[test]
    fn test_stage_failure_records_stage_and_message() {
        let mut report = ExtractionReport::new();
        report.fail(&ExtractError::stage("scanner", "bad selector"));

        assert_eq!(report.status(), None);
        assert_eq!(report.get("error_stage"), Some(&Value::from("scanner")));
        assert_eq!(report.get("error_message"), Some(&Value::from("bad selector")));
        assert_eq!(report.status_label(), "stage_failure:scanner");
    }

    #[test]
    fn test_report_serializes_as_ordered_object() {
        let mut report = ExtractionReport::new();
        report.set("z_first", 1);
        report.set("a_second", "x");
        report.succeed();

        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, r#"{"z_first":1,"a_second":"x","status":"success"}"#);
    }
}
