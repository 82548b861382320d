use crate::client::Analyzer;
use crate::error::SessionError;
use crate::model::AnalysisResult;
use crate::normalize::{normalize_with_warnings, NormalizationWarning};
use crate::upload::{validate_upload, DocumentFormat, Upload};

/// The current document and what was extracted from it.
#[derive(Debug, Clone)]
pub struct AnalyzedDocument {
    pub name: String,
    pub size: usize,
    pub format: DocumentFormat,
    pub result: AnalysisResult,
    pub warnings: Vec<NormalizationWarning>,
}

/// Holds at most one analysis; every new upload replaces it.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<AnalyzedDocument>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&AnalyzedDocument> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Validate, analyze and normalize `upload`. The previous result is gone even if this fails.
    pub fn process(
        &mut self,
        upload: &Upload,
        analyzer: &dyn Analyzer,
    ) -> Result<&AnalyzedDocument, SessionError> {
        self.current = None;
        let format = validate_upload(&upload.name, &upload.bytes)?;
        tracing::info!(name = %upload.name, size = upload.size(), format = format.name(), "analyzing upload");

        let raw = analyzer.analyze(&upload.bytes)?;
        let (result, warnings) = normalize_with_warnings(&raw);
        for warning in &warnings {
            tracing::warn!(name = %upload.name, warning = %warning, "normalization substituted a default");
        }
        tracing::info!(
            key_values = result.key_values.len(),
            tables = result.tables.len(),
            lines = result.lines.len(),
            "analysis normalized"
        );

        Ok(self.current.insert(AnalyzedDocument {
            name: upload.name.clone(),
            size: upload.size(),
            format,
            result,
            warnings,
        }))
    }
}
