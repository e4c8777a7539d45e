// src/main.rs
use clap::Parser;

use repurchase_extractor::edgar::client::DEFAULT_SECTION;
use repurchase_extractor::edgar::SecApiClient;
use repurchase_extractor::extractors::{fetch_documents, ExtractorConfig, RepurchaseExtractor};
use repurchase_extractor::storage::StorageManager;
use repurchase_extractor::utils::{self, AppError};

/// Command Line Interface for the SEC share repurchase table extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of a filing's primary document (repeatable)
    #[arg(short = 'u', long = "filing-url", required = true)]
    filing_urls: Vec<String>,

    /// Section item passed to the extractor endpoint
    #[arg(short, long, default_value = DEFAULT_SECTION)]
    section: String,

    /// Output directory for extraction results
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Debug mode - save raw and annotated section HTML
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Initialize storage, provider and extractor
    let storage = StorageManager::new(&args.output_dir)?;
    let provider = SecApiClient::from_env(args.section.as_str())?;
    let extractor = RepurchaseExtractor::new(ExtractorConfig::from_env());

    // 4. Process each filing
    let mut success_count = 0;
    let mut failure_count = 0;

    for filing_url in &args.filing_urls {
        tracing::info!("Processing filing: {}", filing_url);

        let documents = fetch_documents(&provider, filing_url).await;

        if args.debug {
            let debug_dir = storage.filing_dir(filing_url).join("debug");
            if let Err(e) = utils::html_debug::dump_section(&documents.section_html, &debug_dir) {
                tracing::warn!("Failed to create debug HTML: {}", e);
            }
        }

        let (report, table) = match extractor.extract(&documents.section_html, documents.period_end) {
            Ok(extraction) => {
                success_count += 1;
                (extraction.report, Some(extraction.table))
            }
            Err(failed) => {
                tracing::error!("Extraction failed for {}: {}", filing_url, failed.reason);
                failure_count += 1;
                (failed.report, None)
            }
        };

        match storage.save_extraction(filing_url, &report, table.as_ref()) {
            Ok(path) => tracing::info!("Saved extraction to: {}", path.display()),
            Err(e) => tracing::error!("Failed to save extraction: {}", e),
        }
    }

    tracing::info!(
        "Processing finished. Success: {}, Failures: {}",
        success_count,
        failure_count
    );

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!(
            "Failed to extract a repurchase table from any of {} filings",
            failure_count
        )));
    }

    Ok(())
}
