use serde::{Deserialize, Serialize};

/// One key-value pair as reported by the service, duplicates included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueRecord {
    pub key: String,
    pub value: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub row_index: usize,
    pub column_index: usize,
    pub text: String,
    pub confidence: Option<f64>,
}

/// A table with a dense, row-major grid of `row_count * column_count` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub row_count: usize,
    pub column_count: usize,
    pub cells: Vec<TableCell>,
}

impl TableRecord {
    pub fn cell(&self, row: usize, column: usize) -> Option<&TableCell> {
        if row >= self.row_count || column >= self.column_count {
            return None;
        }
        self.cells
            .get(row.checked_mul(self.column_count)?.checked_add(column)?)
    }

    /// Rows of the grid, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[TableCell]> {
        self.cells.chunks(self.column_count.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub text: String,
    pub confidence: Option<f64>,
    pub page_number: u32,
}

/// Summary over every field that carries a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl ConfidenceStats {
    /// `None` when there is nothing to summarize.
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for score in scores {
            count += 1;
            sum += score;
            min = min.min(score);
            max = max.max(score);
        }
        if count == 0 {
            return None;
        }
        Some(ConfidenceStats {
            mean: sum / count as f64,
            min,
            max,
            count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub page_count: usize,
    pub key_values: Vec<KeyValueRecord>,
    pub tables: Vec<TableRecord>,
    pub lines: Vec<LineRecord>,
    pub overall_confidence_stats: Option<ConfidenceStats>,
}

impl AnalysisResult {
    /// Confidences of key-values, then table cells, then lines.
    pub fn confidences(&self) -> impl Iterator<Item = f64> + '_ {
        let kv = self.key_values.iter().filter_map(|kv| kv.confidence);
        let cells = self
            .tables
            .iter()
            .flat_map(|t| t.cells.iter())
            .filter_map(|c| c.confidence);
        let lines = self.lines.iter().filter_map(|l| l.confidence);
        kv.chain(cells).chain(lines)
    }

    /// Page numbers that have at least one line, ascending.
    pub fn line_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.lines.iter().map(|l| l.page_number).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    pub fn lines_on_page(&self, page_number: u32) -> impl Iterator<Item = &LineRecord> {
        self.lines
            .iter()
            .filter(move |l| l.page_number == page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_of_nothing_is_none() {
        assert_eq!(ConfidenceStats::from_scores(Vec::<f64>::new()), None);
    }

    #[test]
    fn stats_cover_mean_min_max() {
        let stats = ConfidenceStats::from_scores([0.5, 1.0, 0.75]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 0.5);
        assert_eq!(stats.max, 1.0);
        assert!((stats.mean - 0.75).abs() < 1e-12);
    }

    #[test]
    fn table_cell_lookup_is_row_major() {
        let cells = (0..2)
            .flat_map(|r| {
                (0..3).map(move |c| TableCell {
                    row_index: r,
                    column_index: c,
                    text: format!("{r}{c}"),
                    confidence: None,
                })
            })
            .collect();
        let table = TableRecord {
            row_count: 2,
            column_count: 3,
            cells,
        };
        assert_eq!(table.cell(1, 2).map(|c| c.text.as_str()), Some("12"));
        assert_eq!(table.cell(2, 0), None);
        assert_eq!(table.rows().count(), 2);
    }

    #[test]
    fn empty_table_has_no_rows() {
        let table = TableRecord {
            row_count: 0,
            column_count: 0,
            cells: vec![],
        };
        assert_eq!(table.rows().count(), 0);
    }
}
