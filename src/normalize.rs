use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{
    AnalysisResult, ConfidenceStats, KeyValueRecord, LineRecord, TableCell, TableRecord,
};

/// Largest grid a single table may expand to.
pub const MAX_TABLE_CELLS: usize = 1_000_000;
/// A table must fit on one worksheet.
pub const MAX_TABLE_ROWS: usize = 1_048_576;
pub const MAX_TABLE_COLUMNS: usize = 16_384;

const KEY_VALUE_LISTS: &[&str] = &["keyValuePairs", "keyValues", "key_values", "key_value_pairs"];
const TEXT_FIELDS: &[&str] = &["content", "text", "valueString"];
const ROW_COUNT: &[&str] = &["rowCount", "row_count"];
const COLUMN_COUNT: &[&str] = &["columnCount", "column_count"];
const ROW_INDEX: &[&str] = &["rowIndex", "row_index"];
const COLUMN_INDEX: &[&str] = &["columnIndex", "column_index"];
const PAGE_NUMBER: &[&str] = &["pageNumber", "page_number", "page"];
const PAGE_COUNT: &[&str] = &["page_count", "pageCount", "pages"];

/// Analysis output as the service (or a saved export) returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult(Value);

impl RawResult {
    pub fn new(value: Value) -> Self {
        RawResult(value)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(RawResult)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Which producer a raw result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawShape {
    /// Azure `analyzeResult` (pages with lines and words).
    Service,
    /// Flattened camelCase records (`keyValues`, `lines`).
    Flat,
    /// This crate's JSON export, or the snake_case export of the original demo.
    Exported,
}

/// Something in the raw result was missing or malformed and got a default instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationWarning {
    #[error("result is not a JSON object, treated as empty")]
    NotAnObject,

    #[error("'{section}' is not an array, treated as empty")]
    NotAnArray { section: &'static str },

    #[error("key-value pair {index} has no key, dropped")]
    MissingKey { index: usize },

    #[error("key-value pair {index} ('{key}') has no value, dropped")]
    MissingValue { index: usize, key: String },

    #[error("table {table} is not an object, treated as empty")]
    MalformedTable { table: usize },

    #[error("table {table} cell {cell} has no usable row/column index, dropped")]
    CellWithoutIndex { table: usize, cell: usize },

    #[error("table {table} cell ({row}, {column}) is outside the {row_count}x{column_count} grid, dropped")]
    CellOutOfRange {
        table: usize,
        row: usize,
        column: usize,
        row_count: usize,
        column_count: usize,
    },

    #[error("table {table} cell ({row}, {column}) appears more than once, later copy dropped")]
    DuplicateCell {
        table: usize,
        row: usize,
        column: usize,
    },

    #[error("table {table} declares {row_count}x{column_count} cells, shrunk to {kept_rows}x{kept_columns}")]
    TableTooLarge {
        table: usize,
        row_count: usize,
        column_count: usize,
        kept_rows: usize,
        kept_columns: usize,
    },

    #[error("{field} confidence is not a finite number, treated as absent")]
    NonFiniteConfidence { field: String },

    #[error("{field} confidence {value} is outside [0, 1], clamped")]
    ConfidenceClamped { field: String, value: f64 },
}

/// Normalize a raw result, logging every substituted default.
pub fn normalize(raw: &RawResult) -> AnalysisResult {
    let (result, warnings) = normalize_with_warnings(raw);
    for warning in &warnings {
        tracing::warn!(warning = %warning, "normalization substituted a default");
    }
    result
}

pub fn normalize_with_warnings(raw: &RawResult) -> (AnalysisResult, Vec<NormalizationWarning>) {
    let mut normalizer = Normalizer::default();
    let result = normalizer.run(raw.as_value());
    (result, normalizer.warnings)
}

/// Peel the poll envelope (`{status, analyzeResult}`) if present.
fn unwrap_envelope(value: &Value) -> &Value {
    match value.get("analyzeResult") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

pub fn detect_shape(root: &Map<String, Value>) -> RawShape {
    let service = root.contains_key("keyValuePairs")
        || root.contains_key("apiVersion")
        || root.contains_key("modelId")
        || root.get("pages").map(Value::is_array).unwrap_or(false);
    if service {
        return RawShape::Service;
    }
    let exported = ["key_values", "key_value_pairs", "text_content", "page_count"]
        .iter()
        .any(|k| root.contains_key(*k));
    if exported {
        RawShape::Exported
    } else {
        RawShape::Flat
    }
}

/// First present, non-null field among `names`.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()))
}

/// Text of a value: plain strings, numbers, or an element object with `content`.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => field(obj, TEXT_FIELDS).and_then(text_of),
        _ => None,
    }
}

/// Non-negative integer index, tolerating integral floats and numeric strings.
fn index_of(value: &Value) -> Option<usize> {
    let n = value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u64)
        })
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<u64>().ok()))?;
    usize::try_from(n).ok()
}

fn number_of(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

/// `(offset, length)` pairs from either a single span object or an array of them.
fn spans_of(value: Option<&Value>) -> Vec<(u64, u64)> {
    fn one(v: &Value) -> Option<(u64, u64)> {
        Some((v.get("offset")?.as_u64()?, v.get("length")?.as_u64()?))
    }
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(one).collect(),
        Some(v @ Value::Object(_)) => one(v).into_iter().collect(),
        _ => Vec::new(),
    }
}

#[derive(Default)]
struct Normalizer {
    warnings: Vec<NormalizationWarning>,
}

impl Normalizer {
    fn run(&mut self, value: &Value) -> AnalysisResult {
        let root = match unwrap_envelope(value).as_object() {
            Some(root) => root,
            None => {
                self.warnings.push(NormalizationWarning::NotAnObject);
                return AnalysisResult::default();
            }
        };
        let shape = detect_shape(root);
        tracing::debug!(?shape, "normalizing analysis result");

        let key_values = self.key_values(root);
        let tables = self
            .array(root, &["tables"], "tables")
            .iter()
            .enumerate()
            .map(|(i, t)| self.table(i, t))
            .collect();
        let (lines, page_count) = match shape {
            RawShape::Service => {
                let pages = self.array(root, &["pages"], "pages");
                (self.lines_from_pages(pages), pages.len())
            }
            RawShape::Flat | RawShape::Exported => self.flat_lines(root),
        };

        let mut result = AnalysisResult {
            page_count,
            key_values,
            tables,
            lines,
            overall_confidence_stats: None,
        };
        result.overall_confidence_stats = ConfidenceStats::from_scores(result.confidences());
        result
    }

    /// Absent or null becomes empty silently; any other non-array becomes empty with a warning.
    fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        names: &[&str],
        section: &'static str,
    ) -> &'a [Value] {
        match field(obj, names) {
            None => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.warnings.push(NormalizationWarning::NotAnArray { section });
                &[]
            }
        }
    }

    fn confidence(&mut self, value: Option<&Value>, field: impl FnOnce() -> String) -> Option<f64> {
        let value = value.filter(|v| !v.is_null())?;
        match number_of(value) {
            Some(c) if c.is_finite() => {
                if (0.0..=1.0).contains(&c) {
                    Some(c)
                } else {
                    self.warnings.push(NormalizationWarning::ConfidenceClamped {
                        field: field(),
                        value: c,
                    });
                    Some(c.clamp(0.0, 1.0))
                }
            }
            _ => {
                self.warnings
                    .push(NormalizationWarning::NonFiniteConfidence { field: field() });
                None
            }
        }
    }

    fn key_values(&mut self, root: &Map<String, Value>) -> Vec<KeyValueRecord> {
        let list_name = KEY_VALUE_LISTS
            .iter()
            .copied()
            .find(|name| root.get(*name).map(|v| !v.is_null()).unwrap_or(false));
        let pairs = match list_name {
            Some(name) => self.array(root, &[name], "key_values"),
            None => &[],
        };

        let mut out = Vec::with_capacity(pairs.len());
        for (index, pair) in pairs.iter().enumerate() {
            let Some(obj) = pair.as_object() else {
                self.warnings.push(NormalizationWarning::MissingKey { index });
                continue;
            };
            let Some(key) = obj.get("key").and_then(text_of) else {
                self.warnings.push(NormalizationWarning::MissingKey { index });
                continue;
            };
            let Some(value) = obj.get("value").and_then(text_of) else {
                self.warnings
                    .push(NormalizationWarning::MissingValue { index, key });
                continue;
            };
            // Pair score first, then the value element's, then the key element's.
            let raw_confidence = field(obj, &["confidence"])
                .or_else(|| obj.get("value").and_then(|v| v.get("confidence")))
                .or_else(|| field(obj, &["value_confidence"]))
                .or_else(|| obj.get("key").and_then(|k| k.get("confidence")))
                .or_else(|| field(obj, &["key_confidence"]));
            let confidence = self.confidence(raw_confidence, || format!("key-value pair {index}"));
            out.push(KeyValueRecord {
                key,
                value,
                confidence,
            });
        }
        out
    }

    fn table(&mut self, table: usize, raw: &Value) -> TableRecord {
        let Some(obj) = raw.as_object() else {
            self.warnings
                .push(NormalizationWarning::MalformedTable { table });
            return TableRecord {
                row_count: 0,
                column_count: 0,
                cells: Vec::new(),
            };
        };

        let declared_rows = field(obj, ROW_COUNT).and_then(index_of);
        let declared_columns = field(obj, COLUMN_COUNT).and_then(index_of);

        let mut placed: Vec<(usize, usize, String, Option<f64>)> = Vec::new();
        for (cell, raw_cell) in self.array(obj, &["cells"], "cells").iter().enumerate() {
            let indices = raw_cell.as_object().and_then(|c| {
                Some((
                    field(c, ROW_INDEX).and_then(index_of)?,
                    field(c, COLUMN_INDEX).and_then(index_of)?,
                    c,
                ))
            });
            let Some((row, column, c)) = indices else {
                self.warnings
                    .push(NormalizationWarning::CellWithoutIndex { table, cell });
                continue;
            };
            if row >= MAX_TABLE_ROWS || column >= MAX_TABLE_COLUMNS {
                self.warnings.push(NormalizationWarning::CellOutOfRange {
                    table,
                    row,
                    column,
                    row_count: declared_rows.unwrap_or(MAX_TABLE_ROWS).min(MAX_TABLE_ROWS),
                    column_count: declared_columns
                        .unwrap_or(MAX_TABLE_COLUMNS)
                        .min(MAX_TABLE_COLUMNS),
                });
                continue;
            }
            let text = field(c, TEXT_FIELDS).and_then(text_of).unwrap_or_default();
            let confidence = self.confidence(c.get("confidence"), || {
                format!("table {table} cell ({row}, {column})")
            });
            placed.push((row, column, text, confidence));
        }

        // Indices are below the sheet limits here.
        let extent_rows = placed.iter().map(|p| p.0.saturating_add(1)).max().unwrap_or(0);
        let extent_columns = placed.iter().map(|p| p.1.saturating_add(1)).max().unwrap_or(0);
        let declared_row_count = declared_rows.unwrap_or(extent_rows);
        let declared_column_count = declared_columns.unwrap_or(extent_columns);

        let mut row_count = declared_row_count.min(MAX_TABLE_ROWS);
        let mut column_count = declared_column_count.min(MAX_TABLE_COLUMNS);
        if row_count.saturating_mul(column_count) > MAX_TABLE_CELLS {
            row_count = row_count.min(extent_rows);
            column_count = column_count.min(extent_columns);
            if row_count.saturating_mul(column_count) > MAX_TABLE_CELLS {
                row_count = MAX_TABLE_CELLS / column_count.max(1);
            }
        }
        if (row_count, column_count) != (declared_row_count, declared_column_count) {
            self.warnings.push(NormalizationWarning::TableTooLarge {
                table,
                row_count: declared_row_count,
                column_count: declared_column_count,
                kept_rows: row_count,
                kept_columns: column_count,
            });
        }

        let mut grid: Vec<Option<TableCell>> = vec![None; row_count * column_count];
        for (row, column, text, confidence) in placed {
            if row >= row_count || column >= column_count {
                self.warnings.push(NormalizationWarning::CellOutOfRange {
                    table,
                    row,
                    column,
                    row_count,
                    column_count,
                });
                continue;
            }
            let slot = &mut grid[row * column_count + column];
            if slot.is_some() {
                self.warnings.push(NormalizationWarning::DuplicateCell {
                    table,
                    row,
                    column,
                });
                continue;
            }
            *slot = Some(TableCell {
                row_index: row,
                column_index: column,
                text,
                confidence,
            });
        }

        let cells = grid
            .into_iter()
            .enumerate()
            .map(|(i, cell)| {
                cell.unwrap_or_else(|| TableCell {
                    row_index: i / column_count,
                    column_index: i % column_count,
                    text: String::new(),
                    confidence: None,
                })
            })
            .collect();

        TableRecord {
            row_count,
            column_count,
            cells,
        }
    }

    /// Lines grouped under pages, as both the service and the original export lay them out.
    fn lines_from_pages(&mut self, pages: &[Value]) -> Vec<LineRecord> {
        let mut out = Vec::new();
        for (position, page) in pages.iter().enumerate() {
            let Some(page) = page.as_object() else {
                continue;
            };
            let page_number = field(page, PAGE_NUMBER)
                .and_then(index_of)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX));

            let words: Vec<(Vec<(u64, u64)>, f64)> = self
                .array(page, &["words"], "words")
                .iter()
                .filter_map(|w| {
                    let confidence = w.get("confidence").and_then(number_of)?;
                    let span = spans_of(w.get("span").or_else(|| w.get("spans")));
                    (!span.is_empty() && confidence.is_finite()).then_some((span, confidence))
                })
                .collect();

            for (index, line) in self.array(page, &["lines"], "lines").iter().enumerate() {
                let Some(line) = line.as_object() else {
                    continue;
                };
                let text = field(line, TEXT_FIELDS).and_then(text_of).unwrap_or_default();
                let confidence = match line.get("confidence").filter(|v| !v.is_null()) {
                    Some(raw) => self.confidence(Some(raw), || {
                        format!("page {page_number} line {index}")
                    }),
                    None => word_confidence(&spans_of(line.get("spans")), &words),
                };
                out.push(LineRecord {
                    text,
                    confidence,
                    page_number,
                });
            }
        }
        out
    }

    fn flat_lines(&mut self, root: &Map<String, Value>) -> (Vec<LineRecord>, usize) {
        let declared_pages = field(root, PAGE_COUNT).and_then(index_of);

        if !root.contains_key("lines") {
            if let Some(pages) = root
                .get("text_content")
                .and_then(|t| t.as_object())
                .map(|t| self.array(t, &["pages"], "pages"))
            {
                let lines = self.lines_from_pages(pages);
                return (lines, declared_pages.unwrap_or(pages.len()));
            }
        }

        let mut out = Vec::new();
        for (index, line) in self.array(root, &["lines"], "lines").iter().enumerate() {
            let Some(line) = line.as_object() else {
                continue;
            };
            let text = field(line, &["text", "content"])
                .and_then(text_of)
                .unwrap_or_default();
            let page_number = field(line, PAGE_NUMBER)
                .and_then(index_of)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(1);
            let confidence = self.confidence(line.get("confidence"), || format!("line {index}"));
            out.push(LineRecord {
                text,
                confidence,
                page_number,
            });
        }
        let page_count = declared_pages
            .unwrap_or_else(|| out.iter().map(|l| l.page_number as usize).max().unwrap_or(0));
        (out, page_count)
    }
}

/// Mean confidence of the words whose spans lie inside the line's spans.
fn word_confidence(line_spans: &[(u64, u64)], words: &[(Vec<(u64, u64)>, f64)]) -> Option<f64> {
    if line_spans.is_empty() {
        return None;
    }
    // A span whose end overflows is never inside anything.
    let inside = |(offset, length): (u64, u64)| {
        let Some(end) = offset.checked_add(length) else {
            return false;
        };
        line_spans.iter().any(|&(lo, ll)| {
            lo.checked_add(ll)
                .is_some_and(|line_end| offset >= lo && end <= line_end)
        })
    };
    let scores: Vec<f64> = words
        .iter()
        .filter(|(spans, _)| spans.iter().all(|s| inside(*s)))
        .map(|(_, c)| c.clamp(0.0, 1.0))
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}
