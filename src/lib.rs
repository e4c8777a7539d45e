// src/lib.rs
//! Extracts the monthly share-repurchase table from the "Issuer Purchases of
//! Equity Securities" section of SEC periodic filings.

pub mod edgar;
pub mod extractors;
pub mod storage;
pub mod utils;

pub use extractors::{ExtractorConfig, RepurchaseExtractor};
