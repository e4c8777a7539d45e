// src/edgar/client.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header;
use std::time::Duration;

use crate::edgar::models::XbrlResponse;
use crate::utils::error::EdgarError;

const SEC_API_BASE: &str = "https://api.sec-api.io";
const USER_AGENT: &str = "repurchase_extractor/0.1 (share repurchase research)";
// Keep well under the provider's request rate.
const REQUEST_DELAY_MS: u64 = 150;
pub const API_KEY_VAR: &str = "SEC_API_KEY";
pub const DEFAULT_SECTION: &str = "part2item2";

/// Source of the two documents an extraction needs for one filing.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    /// HTML of the repurchase section of the filing at `filing_url`.
    async fn fetch_section_html(&self, filing_url: &str) -> Result<String, EdgarError>;

    /// The filing's period end date, if known.
    async fn fetch_period_end_date(&self, filing_url: &str)
        -> Result<Option<NaiveDate>, EdgarError>;
}

/// `DocumentProvider` backed by the sec-api.io extractor and XBRL-to-JSON
/// endpoints.
pub struct SecApiClient {
    http: reqwest::Client,
    api_key: String,
    section: String,
    base_url: String,
}

impl SecApiClient {
    pub fn new(api_key: impl Into<String>, section: impl Into<String>) -> Result<Self, EdgarError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            section: section.into(),
            base_url: SEC_API_BASE.to_string(),
        })
    }

    /// Reads the API key from `SEC_API_KEY`.
    pub fn from_env(section: impl Into<String>) -> Result<Self, EdgarError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EdgarError::MissingApiKey(API_KEY_VAR.to_string()))?;
        Self::new(api_key, section)
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    /// GETs `endpoint` with `query` plus the token, after the request delay.
    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, EdgarError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("Requesting {} with {:?}", url, query);

        tokio::time::sleep(Duration::from_millis(REQUEST_DELAY_MS)).await;

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json,text/html,*/*")
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for endpoint: {}", status, endpoint);
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::FORBIDDEN
            {
                tracing::warn!("Received {} - check the API key and request rate.", status);
                return Err(EdgarError::RateLimited);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(EdgarError::FilingDocNotFound(endpoint.to_string()));
            }
            return Err(EdgarError::Http(status));
        }
        Ok(response)
    }
}

#[async_trait]
impl DocumentProvider for SecApiClient {
    async fn fetch_section_html(&self, filing_url: &str) -> Result<String, EdgarError> {
        tracing::info!("Fetching section {} of {}", self.section, filing_url);
        let response = self
            .get(
                "extractor",
                &[("url", filing_url), ("item", self.section.as_str()), ("type", "html")],
            )
            .await?;
        let body = response.text().await?;
        tracing::debug!("Received {} bytes of section HTML", body.len());
        Ok(body)
    }

    async fn fetch_period_end_date(
        &self,
        filing_url: &str,
    ) -> Result<Option<NaiveDate>, EdgarError> {
        tracing::info!("Fetching XBRL cover page of {}", filing_url);
        let response = self.get("xbrl-to-json", &[("htm-url", filing_url)]).await?;
        let xbrl: XbrlResponse = response
            .json()
            .await
            .map_err(|e| EdgarError::Parse(format!("XBRL response: {}", e)))?;
        let date = xbrl.period_end_date()?;
        tracing::debug!("Period end date: {:?}", date);
        Ok(date)
    }
}
