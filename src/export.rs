use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet, XlsxError};

use crate::error::ExportError;
use crate::model::{AnalysisResult, TableRecord};

pub const KEY_VALUE_SHEET: &str = "Key_Value_Pairs";
pub const LINES_SHEET: &str = "Text_Lines";
pub const SUMMARY_SHEET: &str = "Confidence_Summary";

/// Excel rejects strings longer than this in a single cell.
const MAX_CELL_CHARS: usize = 32_767;
const CONFIDENCE_FORMAT: &str = "0.000";
const MAX_SHEET_ROWS: u32 = 1_048_576;
const MAX_SHEET_COLUMNS: u16 = 16_384;

/// Pretty-printed UTF-8 JSON with stable snake_case field names.
pub fn to_json(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    Ok(serde_json::to_vec_pretty(result)?)
}

pub fn table_sheet_name(index: usize) -> String {
    format!("Table_{}", index + 1)
}

/// Drop characters that XML cannot carry and cap the length at Excel's cell limit.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .take(MAX_CELL_CHARS)
        .collect()
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF))
}

fn confidence_format() -> Format {
    Format::new()
        .set_num_format(CONFIDENCE_FORMAT)
        .set_align(FormatAlign::Right)
}

/// Widest text per column, seeded with the header widths.
struct ColumnWidths(Vec<f64>);

impl ColumnWidths {
    fn new(headers: &[&str]) -> Self {
        ColumnWidths(headers.iter().map(|h| estimate_text_width(h)).collect())
    }

    fn fit(&mut self, col: usize, text: &str) {
        if col >= self.0.len() {
            self.0.resize(col + 1, 10.0);
        }
        let w = estimate_text_width(text);
        if w > self.0[col] {
            self.0[col] = w;
        }
    }

    fn apply(&self, worksheet: &mut Worksheet) -> Result<(), XlsxError> {
        for (col, &w) in self.0.iter().enumerate() {
            let Ok(col) = u16::try_from(col) else {
                break;
            };
            worksheet.set_column_width(col, w)?;
        }
        Ok(())
    }
}

/// Sheet position of a cell, if it fits on a worksheet.
fn cell_position(row: usize, column: usize) -> Option<(u32, u16)> {
    let row = u32::try_from(row).ok().filter(|&r| r < MAX_SHEET_ROWS)?;
    let column = u16::try_from(column).ok().filter(|&c| c < MAX_SHEET_COLUMNS)?;
    Some((row, column))
}

/// Sheet row of record `index` below the header row.
fn data_row(index: usize) -> Option<u32> {
    cell_position(index.checked_add(1)?, 0).map(|(row, _)| row)
}

fn warn_truncated(sheet: &str, skipped: usize) {
    if skipped > 0 {
        tracing::warn!(sheet, skipped, "records beyond the worksheet limits were not written");
    }
}

fn write_headers(worksheet: &mut Worksheet, headers: &[&str]) -> Result<(), XlsxError> {
    let format = header_format();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &format)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Empty text leaves the cell blank.
fn write_text(worksheet: &mut Worksheet, row: u32, col: u16, text: &str) -> Result<(), XlsxError> {
    let cleaned = sanitize_cell(text);
    if !cleaned.is_empty() {
        worksheet.write_string(row, col, cleaned)?;
    }
    Ok(())
}

/// Absent confidence leaves the cell blank.
fn write_confidence(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    confidence: Option<f64>,
    format: &Format,
) -> Result<(), XlsxError> {
    if let Some(c) = confidence {
        worksheet.write_number_with_format(row, col, c, format)?;
    }
    Ok(())
}

fn write_key_values(worksheet: &mut Worksheet, result: &AnalysisResult) -> Result<(), XlsxError> {
    const HEADERS: [&str; 3] = ["Key", "Value", "Confidence"];
    worksheet.set_name(KEY_VALUE_SHEET)?;
    write_headers(worksheet, &HEADERS)?;
    let number = confidence_format();
    let mut widths = ColumnWidths::new(&HEADERS);
    for (i, kv) in result.key_values.iter().enumerate() {
        let Some(row) = data_row(i) else {
            warn_truncated(KEY_VALUE_SHEET, result.key_values.len() - i);
            break;
        };
        write_text(worksheet, row, 0, &kv.key)?;
        write_text(worksheet, row, 1, &kv.value)?;
        write_confidence(worksheet, row, 2, kv.confidence, &number)?;
        widths.fit(0, &kv.key);
        widths.fit(1, &kv.value);
    }
    widths.apply(worksheet)
}

fn write_table(worksheet: &mut Worksheet, index: usize, table: &TableRecord) -> Result<(), XlsxError> {
    let name = table_sheet_name(index);
    worksheet.set_name(name.as_str())?;
    let mut widths = ColumnWidths::new(&[]);
    let mut skipped = 0;
    for cell in &table.cells {
        let Some((row, col)) = cell_position(cell.row_index, cell.column_index) else {
            skipped += 1;
            continue;
        };
        write_text(worksheet, row, col, &cell.text)?;
        widths.fit(usize::from(col), &cell.text);
    }
    warn_truncated(&name, skipped);
    widths.apply(worksheet)
}

fn write_lines(worksheet: &mut Worksheet, result: &AnalysisResult) -> Result<(), XlsxError> {
    const HEADERS: [&str; 3] = ["Page", "Content", "Confidence"];
    worksheet.set_name(LINES_SHEET)?;
    write_headers(worksheet, &HEADERS)?;
    let number = confidence_format();
    let mut widths = ColumnWidths::new(&HEADERS);
    for (i, line) in result.lines.iter().enumerate() {
        let Some(row) = data_row(i) else {
            warn_truncated(LINES_SHEET, result.lines.len() - i);
            break;
        };
        worksheet.write_number(row, 0, line.page_number)?;
        write_text(worksheet, row, 1, &line.text)?;
        write_confidence(worksheet, row, 2, line.confidence, &number)?;
        widths.fit(1, &line.text);
    }
    widths.apply(worksheet)
}

fn write_summary(worksheet: &mut Worksheet, result: &AnalysisResult) -> Result<(), XlsxError> {
    const HEADERS: [&str; 5] = ["Pages", "Mean", "Minimum", "Maximum", "Count"];
    worksheet.set_name(SUMMARY_SHEET)?;
    write_headers(worksheet, &HEADERS)?;
    let number = confidence_format();
    worksheet.write_number(1, 0, result.page_count as f64)?;
    let stats = result.overall_confidence_stats;
    write_confidence(worksheet, 1, 1, stats.map(|s| s.mean), &number)?;
    write_confidence(worksheet, 1, 2, stats.map(|s| s.min), &number)?;
    write_confidence(worksheet, 1, 3, stats.map(|s| s.max), &number)?;
    worksheet.write_number(1, 4, stats.map(|s| s.count).unwrap_or(0) as f64)?;
    ColumnWidths::new(&HEADERS).apply(worksheet)
}

/// Workbook bytes: key-values, one sheet per table, text lines, confidence summary.
pub fn to_workbook(result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    write_key_values(workbook.add_worksheet(), result)?;
    for (i, table) in result.tables.iter().enumerate() {
        write_table(workbook.add_worksheet(), i, table)?;
    }
    write_lines(workbook.add_worksheet(), result)?;
    write_summary(workbook.add_worksheet(), result)?;
    Ok(workbook.save_to_buffer()?)
}

/// `document_analysis_YYYYmmdd_HHMMSS.<ext>`
pub fn export_file_name(ext: &str, now: NaiveDateTime) -> String {
    format!("document_analysis_{}.{}", now.format("%Y%m%d_%H%M%S"), ext)
}

/// Next free path for `ext` in `dir`, adding `_2`, `_3`, ... on collision.
fn unique_path(dir: &Path, ext: &str, now: NaiveDateTime) -> PathBuf {
    let mut p = dir.join(export_file_name(ext, now));
    let mut counter = 2u32;
    while p.exists() {
        p = dir.join(format!(
            "document_analysis_{}_{}.{}",
            now.format("%Y%m%d_%H%M%S"),
            counter,
            ext
        ));
        counter += 1;
    }
    p
}

/// Downloads folder, falling back to the desktop, then the working directory.
pub fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::desktop_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Workbook,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Workbook => "xlsx",
        }
    }

    pub fn render(self, result: &AnalysisResult) -> Result<Vec<u8>, ExportError> {
        match self {
            ExportFormat::Json => to_json(result),
            ExportFormat::Workbook => to_workbook(result),
        }
    }
}

/// Write each requested format into `dir` and return the saved paths in the same order.
pub fn write_exports(
    result: &AnalysisResult,
    dir: &Path,
    formats: &[ExportFormat],
    now: NaiveDateTime,
) -> Result<Vec<PathBuf>, ExportError> {
    let mut saved = Vec::with_capacity(formats.len());
    for &format in formats {
        let bytes = format.render(result)?;
        let path = unique_path(dir, format.extension(), now);
        std::fs::write(&path, bytes).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "export written");
        saved.push(path);
    }
    Ok(saved)
}
