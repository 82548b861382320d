pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod report;
pub mod session;
pub mod upload;

pub use client::{analyze, Analyzer, AzureClient};
pub use config::{load_config, Config};
pub use error::{AnalysisError, AnalysisErrorKind, ConfigError, ExportError, SessionError, UploadError};
pub use export::{to_json, to_workbook};
pub use model::{AnalysisResult, ConfidenceStats, KeyValueRecord, LineRecord, TableCell, TableRecord};
pub use normalize::{normalize, normalize_with_warnings, NormalizationWarning, RawResult};
pub use session::Session;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,docintel_demo=info,docintel=info";

/// Install the stderr log subscriber; `RUST_LOG` overrides the default filter.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,docintel_demo=debug,docintel=debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
