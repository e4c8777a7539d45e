// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};

use crate::extractors::cells::OutputTable;
use crate::extractors::report::ExtractionReport;
use crate::utils::error::StorageError;

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Directory holding everything written for `filing_url`.
    pub fn filing_dir(&self, filing_url: &str) -> PathBuf {
        self.base_dir.join(filing_slug(filing_url))
    }

    /// Saves the report and (on success) the table of one filing as JSON.
    pub fn save_extraction(
        &self,
        filing_url: &str,
        report: &ExtractionReport,
        table: Option<&OutputTable>,
    ) -> Result<PathBuf, StorageError> {
        let slug = filing_slug(filing_url);
        let target_dir = self.base_dir.join(&slug);
        if !target_dir.exists() {
            fs::create_dir_all(&target_dir).map_err(StorageError::IoError)?;
        }

        let file_path = target_dir.join(format!("{}_repurchases.json", slug));

        let document = serde_json::json!({
            "filing_url": filing_url,
            "report": report,
            "table": table,
            "extracted_at": chrono::Utc::now().to_rfc3339(),
        });
        let body = serde_json::to_string_pretty(&document)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        fs::write(&file_path, body).map_err(StorageError::IoError)?;

        tracing::info!("Saved extraction to {}", file_path.display());

        Ok(file_path)
    }
}

/// Filesystem-safe name for a filing URL: the last path segment without its
/// extension, prefixed by the accession folder when there is one.
pub fn filing_slug(filing_url: &str) -> String {
    let path = filing_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let mut segments = path.rsplit('/').filter(|s| !s.is_empty());
    let file = segments.next().unwrap_or("filing");
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
    let raw = match segments.next() {
        Some(parent) if parent.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}_{}", parent, stem)
        }
        _ => stem.to_string(),
    };
    let slug: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "filing".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filing_slug() {
        assert_eq!(
            filing_slug("https://www.sec.gov/Archives/edgar/data/320193/000032019323000077/aapl-20230701.htm"),
            "000032019323000077_aapl-20230701"
        );
        assert_eq!(filing_slug("https://example.test/docs/q2.html?x=1"), "q2");
        assert_eq!(filing_slug(""), "filing");
    }

    #[test]
    fn test_save_extraction_writes_json() {
        let dir = std::env::temp_dir().join(format!("repurchase_storage_{}", std::process::id()));
        let storage = StorageManager::new(&dir).unwrap();

        let mut report = ExtractionReport::new();
        report.set("section_length", 0);
        let path = storage
            .save_extraction("https://example.test/docs/q2.htm", &report, None)
            .unwrap();

        assert!(path.ends_with("q2/q2_repurchases.json"));
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["filing_url"], "https://example.test/docs/q2.htm");
        assert_eq!(written["report"]["section_length"], 0);
        assert!(written["table"].is_null());
        assert!(written["extracted_at"].is_string());

        fs::remove_dir_all(&dir).unwrap();
    }
}
