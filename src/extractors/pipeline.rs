// src/extractors/pipeline.rs
//! Runs the extraction stages in order over one repurchase section.

// --- Imports ---
use chrono::NaiveDate;
use serde::Serialize;

use crate::edgar::client::DocumentProvider;
use crate::extractors::cells::{build_output, CellInputs, OutputTable};
use crate::extractors::config::ExtractorConfig;
use crate::extractors::dates::resolve_months;
use crate::extractors::normalize::{lonely_marker, normalize_table, wrap_header_footnotes};
use crate::extractors::report::{ExtractionReport, TerminalStatus};
use crate::extractors::roles::{assign_programs, classify_columns};
use crate::extractors::scanner::{block_texts, TableScanner};
use crate::extractors::spans::{PatternPass, SpanDetector};
use crate::extractors::units::{reconcile_units, UnitInputs};
use crate::utils::error::ExtractError;

/// A successful run.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub report: ExtractionReport,
    pub table: OutputTable,
}

/// A run that stopped early. The report says where.
#[derive(Debug, Clone)]
pub struct FailedExtraction {
    pub report: ExtractionReport,
    pub reason: ExtractError,
}

pub struct RepurchaseExtractor {
    config: ExtractorConfig,
}

impl Default for RepurchaseExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl RepurchaseExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts the repurchase table from one section. `period_end` resolves
    /// period labels that carry no year.
    pub fn extract(
        &self,
        section_html: &str,
        period_end: Option<NaiveDate>,
    ) -> Result<Extraction, FailedExtraction> {
        let mut report = ExtractionReport::new();
        report.set("section_length", section_html.len());
        report.set("period_end", period_end.map(|d| d.to_string()));

        match self.run(section_html, period_end, &mut report) {
            Ok(table) => {
                report.succeed();
                tracing::info!("Extraction succeeded with {} rows", table.rows.len());
                Ok(Extraction { report, table })
            }
            Err(reason) => {
                report.fail(&reason);
                tracing::info!("Extraction stopped: {}", report.status_label());
                Err(FailedExtraction { report, reason })
            }
        }
    }

    /// Fetches the filing's documents through `provider`, then extracts.
    pub async fn extract_filing<P: DocumentProvider + ?Sized>(
        &self,
        provider: &P,
        filing_url: &str,
    ) -> Result<Extraction, FailedExtraction> {
        let documents = fetch_documents(provider, filing_url).await;
        self.extract(&documents.section_html, documents.period_end)
    }

    fn run(
        &self,
        section_html: &str,
        period_end: Option<NaiveDate>,
        report: &mut ExtractionReport,
    ) -> Result<OutputTable, ExtractError> {
        if section_html.is_empty() {
            return Err(TerminalStatus::LenHtmlZero.into());
        }

        // 1. Table of interest
        let section = staged(report, "scanner", |report| {
            TableScanner::new(&self.config).scan(section_html, report)
        })?;

        // 2. Structural cleanup, then footnote markers from the text below
        let mut normalized = staged(report, "normalizer", |report| {
            normalize_table(section.table, report)
        })?;
        let markers: Vec<String> = block_texts(&section.after_html)
            .iter()
            .filter_map(|block| lonely_marker(block))
            .collect();
        report.set("footnote_markers", serde_json::json!(markers));
        wrap_header_footnotes(&mut normalized.matrix, &markers);

        // 3. Month and total spans
        let spans = staged(report, "spans", |report| {
            SpanDetector::new(&self.config).detect(normalized.matrix, report)
        })?;

        // 4. Absolute dates
        let per_row = spans.pass == PatternPass::WithoutYears;
        let dates = staged(report, "dates", |report| {
            resolve_months(&spans.openers, per_row, period_end, report)
        })?;

        // 5. Column roles and programs
        let (roles, programs) = staged(report, "roles", |report| {
            let roles = classify_columns(&spans.matrix, report)?;
            let programs = assign_programs(&spans, self.config.program_score_gap, report)?;
            Ok((roles, programs))
        })?;

        // 6. Scale per column
        let scales = staged(report, "units", |report| {
            let inputs = UnitInputs {
                matrix: &spans.matrix,
                roles: &roles,
                before_html: &section.before_html,
                after_html: &section.after_html,
                top_leftovers: &normalized.top_leftovers,
            };
            Ok(reconcile_units(&inputs, report))
        })?;

        // 7. Cells and output
        staged(report, "cells", |report| {
            let inputs = CellInputs {
                spans: &spans,
                dates: &dates,
                roles: &roles,
                programs: &programs,
                scales: &scales,
            };
            build_output(&inputs, report)
        })
    }
}

/// What an extraction reads for one filing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingDocuments {
    pub section_html: String,
    pub period_end: Option<NaiveDate>,
}

/// Fetches the section and period date once each. Fetch failures degrade
/// to an empty section or a missing date.
pub async fn fetch_documents<P: DocumentProvider + ?Sized>(
    provider: &P,
    filing_url: &str,
) -> FilingDocuments {
    let section_html = match provider.fetch_section_html(filing_url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("Section fetch failed for {}: {}", filing_url, e);
            String::new()
        }
    };
    let period_end = match provider.fetch_period_end_date(filing_url).await {
        Ok(date) => date,
        Err(e) => {
            tracing::warn!("Period date fetch failed for {}: {}", filing_url, e);
            None
        }
    };
    FilingDocuments {
        section_html,
        period_end,
    }
}

/// Runs one stage and records whether it passed.
fn staged<T, F>(report: &mut ExtractionReport, stage: &str, f: F) -> Result<T, ExtractError>
where
    F: FnOnce(&mut ExtractionReport) -> Result<T, ExtractError>,
{
    let result = f(report);
    report.mark_stage(stage, result.is_ok());
    if let Err(e) = &result {
        tracing::debug!("Stage {} failed: {}", stage, e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::roles::ColumnRole;
    use crate::extractors::spans::SpanKind;
    use crate::utils::error::EdgarError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECTION: &str = r#"
<p>ITEM 2. UNREGISTERED SALES OF EQUITY SECURITIES AND USE OF PROCEEDS</p>
<p>Issuer Purchases of Equity Securities (in thousands, except per share data)</p>
<table>
  <tr>
    <td>Period</td>
    <td>Total Number of Shares Purchased</td>
    <td>Average Price Paid per Share</td>
    <td>Total Number of Shares Purchased as Part of Publicly Announced Plans or Programs</td>
    <td>Approximate Dollar Value of Shares that May Yet Be Purchased Under the Plans or Programs</td>
  </tr>
  <tr><td>April 1, 2023 - April 30, 2023</td><td>1,200</td><td>$ 101.50</td><td>1,200</td><td>$ 48,800</td></tr>
  <tr><td>May 1, 2023 - May 31, 2023</td><td>1,100</td><td>$ 103.25</td><td>1,100</td><td>$ 47,700</td></tr>
  <tr><td>June 1, 2023 - June 30, 2023</td><td>900</td><td>$ 99.10</td><td>900</td><td>$ 46,800</td></tr>
  <tr><td>Total</td><td>3,200</td><td>$ 101.49</td><td>3,200</td><td></td></tr>
</table>
<p>All shares were purchased in open market transactions.</p>
"#;

    #[test]
    fn test_end_to_end_single_program() {
        let extractor = RepurchaseExtractor::default();
        let extraction = extractor
            .extract(SECTION, NaiveDate::from_ymd_opt(2023, 6, 30))
            .unwrap();
        let table = &extraction.table;

        let spans: Vec<u8> = table.rows.iter().map(|r| r.span.id()).collect();
        assert_eq!(spans, vec![1, 2, 3, 4]);
        assert_eq!(table.roles.len(), 5);
        assert_eq!(table.roles.column_of(ColumnRole::Price), Some(2));

        let april = table.rows_in(SpanKind::Month1).next().unwrap();
        assert_eq!(april.start_date, NaiveDate::from_ymd_opt(2023, 4, 1).unwrap());
        assert_eq!(april.end_date, NaiveDate::from_ymd_opt(2023, 4, 30).unwrap());
        assert_eq!(april.values[0].as_number(), Some(1200.0));

        let total = table.rows_in(SpanKind::Total).next().unwrap();
        assert_eq!(total.start_date, NaiveDate::from_ymd_opt(2023, 4, 1).unwrap());
        assert_eq!(total.end_date, NaiveDate::from_ymd_opt(2023, 6, 30).unwrap());

        assert_eq!(table.scales, vec![None, Some(1), None, Some(1), Some(1)]);
        assert_eq!(table.dollar_columns, vec![false, false, true, false, true]);
        assert!(extraction.report.is_success());
        assert_eq!(
            extraction.report.get("status"),
            Some(&serde_json::Value::from("success"))
        );
    }

    #[test]
    fn test_empty_section_terminates() {
        let failed = RepurchaseExtractor::default().extract("", None).unwrap_err();
        assert_eq!(failed.reason, ExtractError::Terminated(TerminalStatus::LenHtmlZero));
        assert_eq!(
            failed.report.get("status"),
            Some(&serde_json::Value::from("len_html_zero"))
        );
    }

    #[test]
    fn test_section_without_tables() {
        let failed = RepurchaseExtractor::default()
            .extract("<p>No repurchases were made during the quarter.</p>", None)
            .unwrap_err();
        assert_eq!(failed.report.status(), Some(TerminalStatus::NumTablesZero));
        assert_eq!(
            failed.report.get("scanner_passed"),
            Some(&serde_json::Value::from(false))
        );
    }

    #[test]
    fn test_unit_conflict_reported_before_bad_cells() {
        let section = SECTION
            .replace("<td>$ 47,700</td>", "<td>see note</td>")
            .replace(
                "<p>All shares were purchased in open market transactions.</p>",
                "<p>(in millions)</p>",
            );
        let failed = RepurchaseExtractor::default()
            .extract(&section, NaiveDate::from_ymd_opt(2023, 6, 30))
            .unwrap_err();
        assert_eq!(failed.report.status(), Some(TerminalStatus::UnhealthyUnit));
        assert_eq!(
            failed.report.get("unit_healthy"),
            Some(&serde_json::Value::from(false))
        );
        assert_eq!(
            failed.report.get("inner_cell_health"),
            Some(&serde_json::Value::from(0))
        );
        assert_eq!(
            failed.report.get("cells_passed"),
            Some(&serde_json::Value::from(false))
        );
    }

    struct StaticProvider {
        html: Option<&'static str>,
        section_fetches: AtomicUsize,
    }

    impl StaticProvider {
        fn new(html: Option<&'static str>) -> Self {
            Self {
                html,
                section_fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentProvider for StaticProvider {
        async fn fetch_section_html(&self, _url: &str) -> Result<String, EdgarError> {
            self.section_fetches.fetch_add(1, Ordering::SeqCst);
            self.html
                .map(str::to_string)
                .ok_or_else(|| EdgarError::FilingDocNotFound("section".to_string()))
        }

        async fn fetch_period_end_date(&self, _url: &str) -> Result<Option<NaiveDate>, EdgarError> {
            Ok(NaiveDate::from_ymd_opt(2023, 6, 30))
        }
    }

    #[test]
    fn test_extract_filing_through_provider() {
        let extractor = RepurchaseExtractor::default();
        let provider = StaticProvider::new(Some(SECTION));
        let extraction =
            tokio_test::block_on(extractor.extract_filing(&provider, "https://example.test/10q.htm"))
                .unwrap();
        assert_eq!(
            extraction.report.get("period_end"),
            Some(&serde_json::Value::from("2023-06-30"))
        );

        let missing = StaticProvider::new(None);
        let failed =
            tokio_test::block_on(extractor.extract_filing(&missing, "https://example.test/10q.htm"))
                .unwrap_err();
        assert_eq!(failed.report.status(), Some(TerminalStatus::LenHtmlZero));
    }

    #[test]
    fn test_documents_fetched_once_then_extracted() {
        let provider = StaticProvider::new(Some(SECTION));
        let documents =
            tokio_test::block_on(fetch_documents(&provider, "https://example.test/10q.htm"));
        assert_eq!(documents.period_end, NaiveDate::from_ymd_opt(2023, 6, 30));

        let extraction = RepurchaseExtractor::default()
            .extract(&documents.section_html, documents.period_end)
            .unwrap();
        assert!(extraction.report.is_success());
        assert_eq!(provider.section_fetches.load(Ordering::SeqCst), 1);
    }
}
