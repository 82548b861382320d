use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use pretty_assertions::assert_eq;
use serde_json::json;

use docintel_demo::export::{
    table_sheet_name, to_json, to_workbook, write_exports, ExportFormat, KEY_VALUE_SHEET,
    LINES_SHEET, SUMMARY_SHEET,
};
use docintel_demo::normalize::{normalize, normalize_with_warnings, NormalizationWarning, RawResult};
use docintel_demo::AnalysisResult;

const FIXTURE: &str = include_str!("fixtures/layout_invoice.json");

fn fixture() -> RawResult {
    RawResult::from_slice(FIXTURE.as_bytes()).expect("fixture is valid JSON")
}

fn reparse(result: &AnalysisResult) -> AnalysisResult {
    let bytes = to_json(result).expect("json export");
    normalize(&RawResult::from_slice(&bytes).expect("export is valid JSON"))
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        Some(Data::String(s)) => s.clone(),
        Some(Data::Float(f)) => f.to_string(),
        Some(Data::Int(i)) => i.to_string(),
        _ => String::new(),
    }
}

fn cell_number(cell: Option<&Data>) -> Option<f64> {
    match cell {
        Some(Data::Float(f)) => Some(*f),
        Some(Data::Int(i)) => Some(*i as f64),
        _ => None,
    }
}

#[test]
fn fixture_normalizes_with_documented_policies() {
    let (result, warnings) = normalize_with_warnings(&fixture());

    assert_eq!(result.page_count, 2);
    let keys: Vec<_> = result.key_values.iter().map(|kv| kv.key.as_str()).collect();
    assert_eq!(keys, ["Invoice Number:", "Date:"]);

    let table = &result.tables[0];
    assert_eq!((table.row_count, table.column_count), (3, 3));
    assert_eq!(table.cells.len(), 9);
    assert_eq!(table.cell(2, 1).map(|c| c.text.as_str()), Some(""));
    assert_eq!(table.cell(1, 0).and_then(|c| c.confidence), Some(0.88));

    let lines: Vec<_> = result
        .lines
        .iter()
        .map(|l| (l.page_number, l.text.as_str()))
        .collect();
    assert_eq!(
        lines,
        [
            (1, "INVOICE"),
            (1, "Invoice Number: INV-1001"),
            (1, "Date: 2026-10-01"),
            (2, "Thank you"),
        ]
    );
    assert_eq!(result.lines[0].confidence, Some(0.995));
    assert!((result.lines[1].confidence.unwrap() - 0.96).abs() < 1e-9);
    assert!((result.lines[2].confidence.unwrap() - 0.95).abs() < 1e-9);
    assert_eq!(result.lines[3].confidence, None);

    assert_eq!(result.overall_confidence_stats.map(|s| s.count), Some(6));
    assert_eq!(
        warnings,
        vec![
            NormalizationWarning::MissingValue {
                index: 2,
                key: "Signature:".to_string()
            },
            NormalizationWarning::CellOutOfRange {
                table: 0,
                row: 4,
                column: 0,
                row_count: 3,
                column_count: 3
            },
        ]
    );
}

#[test]
fn json_round_trip_is_idempotent() {
    let first = normalize(&fixture());
    let second = reparse(&first);
    assert_eq!(first, second);
    assert_eq!(second, reparse(&second));
}

#[test]
fn scenario_round_trip() {
    let raw = RawResult::new(json!({
        "keyValues": [{"key": "Invoice Number", "value": "INV-1001", "confidence": 0.97}],
        "tables": [],
        "lines": []
    }));
    let result = normalize(&raw);
    assert_eq!(reparse(&result), result);
}

#[test]
fn json_uses_stable_field_names() {
    let result = normalize(&fixture());
    let value: serde_json::Value = serde_json::from_slice(&to_json(&result).unwrap()).unwrap();
    let obj = value.as_object().unwrap();
    for key in ["page_count", "key_values", "tables", "lines", "overall_confidence_stats"] {
        assert!(obj.contains_key(key), "missing {key}");
    }
    let cell = &value["tables"][0]["cells"][0];
    assert_eq!(cell["row_index"], json!(0));
    assert_eq!(cell["text"], json!("Item"));
    assert_eq!(cell["confidence"], serde_json::Value::Null);
    assert_eq!(value["overall_confidence_stats"]["count"], json!(6));
}

#[test]
fn json_keeps_non_ascii_text() {
    let raw = RawResult::new(json!({"keyValues": [{"key": "Продавач", "value": "Ада ДООЕЛ"}]}));
    let result = normalize(&raw);
    let text = String::from_utf8(to_json(&result).unwrap()).unwrap();
    assert!(text.contains("Ада ДООЕЛ"));
    assert_eq!(reparse(&result), result);
}

#[test]
fn workbook_has_one_sheet_per_category() {
    let result = normalize(&fixture());
    let bytes = to_workbook(&result).expect("workbook export");
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).expect("readable xlsx");

    assert_eq!(
        workbook.sheet_names(),
        vec![
            KEY_VALUE_SHEET.to_string(),
            table_sheet_name(0),
            LINES_SHEET.to_string(),
            SUMMARY_SHEET.to_string(),
        ]
    );

    let kv = workbook.worksheet_range(KEY_VALUE_SHEET).unwrap();
    assert_eq!(cell_text(kv.get_value((0, 0))), "Key");
    assert_eq!(cell_text(kv.get_value((1, 0))), "Invoice Number:");
    assert_eq!(cell_text(kv.get_value((1, 1))), "INV-1001");
    assert_eq!(cell_number(kv.get_value((1, 2))), Some(0.94));

    let table = workbook.worksheet_range(&table_sheet_name(0)).unwrap();
    assert_eq!(cell_text(table.get_value((0, 2))), "Price");
    assert_eq!(cell_text(table.get_value((2, 2))), "39.99");
    assert_eq!(cell_text(table.get_value((2, 1))), "");

    let lines = workbook.worksheet_range(LINES_SHEET).unwrap();
    assert_eq!(cell_number(lines.get_value((4, 0))), Some(2.0));
    assert_eq!(cell_text(lines.get_value((4, 1))), "Thank you");
    assert_eq!(cell_number(lines.get_value((4, 2))), None);
    assert_eq!(cell_number(lines.get_value((1, 2))), Some(0.995));

    let summary = workbook.worksheet_range(SUMMARY_SHEET).unwrap();
    assert_eq!(cell_number(summary.get_value((1, 0))), Some(2.0));
    assert_eq!(cell_number(summary.get_value((1, 4))), Some(6.0));
    let mean = cell_number(summary.get_value((1, 1))).unwrap();
    assert!((0.0..=1.0).contains(&mean));
}

#[test]
fn empty_result_still_produces_a_workbook() {
    let bytes = to_workbook(&AnalysisResult::default()).unwrap();
    let workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec![
            KEY_VALUE_SHEET.to_string(),
            LINES_SHEET.to_string(),
            SUMMARY_SHEET.to_string(),
        ]
    );
}

#[test]
fn write_exports_saves_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::NaiveDate::from_ymd_opt(2026, 10, 14)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap();
    let result = normalize(&fixture());
    let paths = write_exports(
        &result,
        dir.path(),
        &[ExportFormat::Json, ExportFormat::Workbook],
        now,
    )
    .unwrap();

    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("document_analysis_20261014_093000.json"));
    assert!(paths[1].ends_with("document_analysis_20261014_093000.xlsx"));
    let saved = std::fs::read(&paths[0]).unwrap();
    assert_eq!(normalize(&RawResult::from_slice(&saved).unwrap()), result);
}

/// Raw inputs that exercise every substitution the normalizer makes.
fn edge_cases() -> Vec<(&'static str, serde_json::Value)> {
    vec![
        (
            "clamped and non-finite confidence",
            json!({"keyValues": [
                {"key": "a", "value": "1", "confidence": 1.5},
                {"key": "b", "value": "2", "confidence": -0.25},
                {"key": "c", "value": "3", "confidence": "NaN"}
            ]}),
        ),
        (
            "dropped, duplicate and unindexed cells",
            json!({"tables": [{"rowCount": 2, "columnCount": 2, "cells": [
                {"rowIndex": 0, "columnIndex": 0, "content": "a", "confidence": 0.5},
                {"rowIndex": 0, "columnIndex": 0, "content": "dup"},
                {"rowIndex": 9, "columnIndex": 0, "content": "far"},
                {"rowIndex": 18446744073709551615u64, "columnIndex": 1, "content": "huge"},
                {"content": "nowhere"}
            ]}]}),
        ),
        (
            "declared grid shrunk",
            json!({"tables": [{"rowCount": 5_000_000, "columnCount": 10, "cells": [
                {"rowIndex": 1, "columnIndex": 2, "content": "x", "confidence": 0.3}
            ]}]}),
        ),
        (
            "wider than a worksheet",
            json!({"tables": [{"rowCount": 1, "columnCount": 20_000, "cells": [
                {"rowIndex": 0, "columnIndex": 0, "content": "first"},
                {"rowIndex": 0, "columnIndex": 19_999, "content": "last"}
            ]}]}),
        ),
        (
            "zero rows, some columns",
            json!({"tables": [{"rowCount": 0, "columnCount": 3, "cells": []}]}),
        ),
        (
            "counts inferred from cells",
            json!({"tables": [{"cells": [{"rowIndex": 2, "columnIndex": 1, "content": "x"}]}]}),
        ),
        (
            "malformed sections",
            json!({"tables": [42, {"cells": "nope"}], "lines": {"text": "not a list"}}),
        ),
        (
            "line confidence from word means",
            json!({"pages": [{"pageNumber": 3, "words": [
                {"confidence": 0.1, "span": {"offset": 0, "length": 1}},
                {"confidence": 0.2, "span": {"offset": 2, "length": 1}},
                {"confidence": 0.4, "span": {"offset": 4, "length": 1}}
            ], "lines": [{"content": "a b c", "spans": [{"offset": 0, "length": 5}]}]}]}),
        ),
        (
            "original demo export",
            json!({
                "key_value_pairs": [{"key": "Name", "value": "Ada", "key_confidence": 0.6}],
                "text_content": {"pages": [{"page_number": 2, "lines": [{"content": "Ada"}]}]}
            }),
        ),
    ]
}

#[test]
fn round_trip_holds_for_edge_cases() {
    for (name, raw) in edge_cases() {
        let first = normalize(&RawResult::new(raw));
        let second = reparse(&first);
        assert_eq!(first, second, "{name}");
        assert_eq!(reparse(&second), second, "{name}");
        let (_, warnings) = normalize_with_warnings(
            &RawResult::from_slice(&to_json(&first).unwrap()).unwrap(),
        );
        assert!(warnings.is_empty(), "{name}: {warnings:?}");
        assert!(to_workbook(&first).is_ok(), "{name}: workbook export failed");
    }
}
