use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Document Intelligence not configured, missing: {}", .missing.join(", "))]
    MissingCredentials { missing: Vec<&'static str> },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Could not read secrets file {path}: {reason}")]
    Secrets { path: String, reason: String },
}

/// What went wrong with the remote call, as far as the user needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    Unauthorized,
    QuotaExceeded,
    UnsupportedFormat,
    NetworkFailure,
    Timeout,
}

impl AnalysisErrorKind {
    /// Short hint shown next to the service message.
    pub fn hint(self) -> &'static str {
        match self {
            AnalysisErrorKind::Unauthorized => "Invalid key or endpoint?",
            AnalysisErrorKind::QuotaExceeded => "Call quota exceeded. Wait and try again.",
            AnalysisErrorKind::UnsupportedFormat => "The service could not read this document.",
            AnalysisErrorKind::NetworkFailure => "Check your internet connection and try again.",
            AnalysisErrorKind::Timeout => "Analysis timed out. Try again.",
        }
    }
}

impl fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisErrorKind::Unauthorized => "unauthorized",
            AnalysisErrorKind::QuotaExceeded => "quota exceeded",
            AnalysisErrorKind::UnsupportedFormat => "unsupported format",
            AnalysisErrorKind::NetworkFailure => "network failure",
            AnalysisErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Analysis failed ({kind}): {message}")]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub message: String,
}

impl AnalysisError {
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel export failed: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Cannot write to file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unsupported file type '{0}'. Supported formats: PDF, PNG, JPG, JPEG, BMP, TIFF")]
    UnsupportedExtension(String),

    #[error("File too large ({size} bytes, max 50MB).")]
    TooLarge { size: usize },

    #[error("File is empty.")]
    Empty,

    #[error("Not a valid {0} file.")]
    ContentMismatch(&'static str),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
