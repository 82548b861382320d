use std::fmt;

use crate::model::{AnalysisResult, TableRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Excellent,
    Good,
    Low,
}

impl ConfidenceBand {
    pub fn of(mean: f64) -> Self {
        if mean >= 0.9 {
            ConfidenceBand::Excellent
        } else if mean >= 0.7 {
            ConfidenceBand::Good
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ConfidenceBand::Excellent => "Excellent OCR confidence - text is clearly readable",
            ConfidenceBand::Good => "Good OCR confidence - most text is readable",
            ConfidenceBand::Low => "Low OCR confidence - document may be blurry or low quality",
        }
    }
}

/// Per-line marker: high above 0.8, medium above 0.6.
fn line_marker(confidence: Option<f64>) -> &'static str {
    match confidence {
        Some(c) if c > 0.8 => "[high]",
        Some(c) if c > 0.6 => "[mid] ",
        Some(_) => "[low] ",
        None => "[n/a] ",
    }
}

pub fn format_confidence(confidence: Option<f64>) -> String {
    match confidence {
        Some(c) => format!("{:.1}%", c * 100.0),
        None => "N/A".to_string(),
    }
}

/// Text rendering of an analysis: summary, key-values, tables, lines, confidence.
pub struct Report<'a>(pub &'a AnalysisResult);

pub fn render_report(result: &AnalysisResult) -> String {
    Report(result).to_string()
}

fn write_table(f: &mut fmt::Formatter<'_>, table: &TableRecord) -> fmt::Result {
    let mut widths = vec![0usize; table.column_count];
    for cell in &table.cells {
        if let Some(w) = widths.get_mut(cell.column_index) {
            *w = (*w).max(cell.text.chars().count());
        }
    }
    for row in table.rows() {
        let rendered: Vec<String> = row
            .iter()
            .map(|c| {
                let text = c.text.replace('\n', " ");
                let width = widths.get(c.column_index).copied().unwrap_or(0);
                format!("{text:<width$}")
            })
            .collect();
        writeln!(f, "  | {} |", rendered.join(" | "))?;
    }
    Ok(())
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        let stats = result.overall_confidence_stats;

        writeln!(f, "Analysis Summary")?;
        writeln!(f, "  Pages:           {}", result.page_count)?;
        writeln!(f, "  Key-Value Pairs: {}", result.key_values.len())?;
        writeln!(f, "  Tables:          {}", result.tables.len())?;
        writeln!(f, "  Avg Confidence:  {}", format_confidence(stats.map(|s| s.mean)))?;

        writeln!(f)?;
        writeln!(f, "Key-Value Pairs")?;
        if result.key_values.is_empty() {
            writeln!(f, "  No key-value pairs found in the document.")?;
        }
        for kv in &result.key_values {
            writeln!(f, "  {}: {}", kv.key, kv.value)?;
        }

        writeln!(f)?;
        writeln!(f, "Tables")?;
        if result.tables.is_empty() {
            writeln!(f, "  No tables found in the document.")?;
        }
        for (i, table) in result.tables.iter().enumerate() {
            writeln!(
                f,
                "  Table {} ({} rows x {} columns)",
                i + 1,
                table.row_count,
                table.column_count
            )?;
            write_table(f, table)?;
        }

        writeln!(f)?;
        writeln!(f, "Text Content")?;
        let pages = result.line_pages();
        if pages.is_empty() {
            writeln!(f, "  No text content found.")?;
        }
        for page in pages {
            let lines: Vec<_> = result.lines_on_page(page).collect();
            writeln!(f, "  Page {} ({} lines)", page, lines.len())?;
            for line in lines {
                writeln!(
                    f,
                    "    {} {} (Confidence: {})",
                    line_marker(line.confidence),
                    line.text,
                    format_confidence(line.confidence)
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Confidence Details")?;
        match stats {
            None => writeln!(f, "  Confidence scores are not available for this document.")?,
            Some(s) => {
                writeln!(f, "  Average: {}", format_confidence(Some(s.mean)))?;
                writeln!(f, "  Minimum: {}", format_confidence(Some(s.min)))?;
                writeln!(f, "  Maximum: {}", format_confidence(Some(s.max)))?;
                writeln!(f, "  Scored elements: {}", s.count)?;
                writeln!(f, "  {}", ConfidenceBand::of(s.mean).describe())?;
            }
        }
        Ok(())
    }
}
