// src/extractors/mod.rs
pub mod cells;
pub mod config;
pub mod dates;
pub mod matrix;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod roles;
pub mod scanner;
pub mod spans;
pub mod text;
pub mod units;

// Re-export key extraction types for convenience
pub use cells::{CellValue, OutputRow, OutputTable};
pub use config::ExtractorConfig;
pub use pipeline::{fetch_documents, Extraction, FailedExtraction, FilingDocuments, RepurchaseExtractor};
pub use report::{ExtractionReport, TerminalStatus};
