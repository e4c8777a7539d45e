// src/edgar/models.rs
use chrono::NaiveDate;
use serde::Deserialize;

use crate::utils::error::EdgarError;

/// The slice of the XBRL-to-JSON response we read.
/// Example: https://api.sec-api.io/xbrl-to-json?htm-url=...
#[derive(Debug, Default, Deserialize)]
pub struct XbrlResponse {
    #[serde(rename = "CoverPage", default)]
    pub cover_page: Option<CoverPage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverPage {
    #[serde(rename = "DocumentPeriodEndDate", default)]
    pub document_period_end_date: Option<String>,
    #[serde(rename = "DocumentType", default)]
    pub document_type: Option<String>,
    #[serde(rename = "EntityRegistrantName", default)]
    pub entity_registrant_name: Option<String>,
}

impl XbrlResponse {
    /// The filing's period end date, if the cover page reports one.
    pub fn period_end_date(&self) -> Result<Option<NaiveDate>, EdgarError> {
        let Some(raw) = self
            .cover_page
            .as_ref()
            .and_then(|cover| cover.document_period_end_date.as_deref())
        else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| EdgarError::Parse(format!("DocumentPeriodEndDate '{}': {}", raw, e)))
    }
}
