// src/utils/logging.rs
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber for the binary.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` for
/// this crate when `verbose` is requested (stage decisions, candidate
/// scores and unit codes are logged at debug).
pub fn setup_logging(verbose: bool) {
    let fallback = if verbose {
        "info,repurchase_extractor=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second install (tests, embedding) is not an error worth failing on.
    if fmt().with_env_filter(filter).with_target(false).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
        return;
    }

    tracing::debug!("Logging setup complete.");
}
