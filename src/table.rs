// Raw tabular input - one sheet, one CSV file, or one remote dataset
// Transient: consumed by the column mapper, never stored

use serde::{Deserialize, Serialize};

/// Scalar value of one raw cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Declared-empty: null, or text with nothing but whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => false,
        }
    }

    /// Text rendering used for identity fields and headers.
    ///
    /// Integral numbers render without a fractional part so numeric cost-center
    /// codes read "4100", not "4100.0".
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One raw row: ordered (label, value) pairs as the source delivered them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub fields: Vec<(String, CellValue)>,
}

impl RawRecord {
    pub fn new() -> Self {
        RawRecord { fields: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>, value: CellValue) {
        self.fields.push((label.into(), value));
    }

    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value)
    }
}

/// A two-dimensional raw table, title rows included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Source identifier (sheet name, file name, dataset name)
    pub source: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(source: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        RawTable {
            source: source.into(),
            rows,
        }
    }

    /// Build from string cells; blank strings become `CellValue::Empty`
    pub fn from_strings(source: impl Into<String>, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| {
                        if cell.trim().is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::text(cell)
                        }
                    })
                    .collect()
            })
            .collect();
        RawTable::new(source, rows)
    }

    /// Widest row in the table
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(CellValue::is_blank))
    }

    /// Cell at (row, col); missing cells read as Empty
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&EMPTY)
    }

    /// Header labels of the given row, padded to the table width
    pub fn header(&self, row: usize) -> Vec<String> {
        (0..self.width()).map(|col| self.cell(row, col).as_text()).collect()
    }

    /// Data rows following the header row, as labelled records
    pub fn records(&self, header_row: usize) -> Vec<RawRecord> {
        let header = self.header(header_row);
        self.rows
            .iter()
            .skip(header_row + 1)
            .map(|row| {
                let mut record = RawRecord::new();
                for (col, label) in header.iter().enumerate() {
                    let value = row.get(col).cloned().unwrap_or(CellValue::Empty);
                    record.push(label.clone(), value);
                }
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_detection() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::text("   ").is_blank());
        assert!(!CellValue::text("0").is_blank());
        assert!(!CellValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_integral_numbers_render_as_codes() {
        assert_eq!(CellValue::Number(4100.0).as_text(), "4100");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::text("  Growth ").as_text(), "Growth");
    }

    #[test]
    fn test_cell_out_of_range_is_empty() {
        let table = RawTable::from_strings("t", vec![vec!["a", "b"], vec!["c"]]);
        assert_eq!(table.width(), 2);
        assert_eq!(table.cell(1, 1), &CellValue::Empty);
        assert_eq!(table.cell(9, 9), &CellValue::Empty);
    }

    #[test]
    fn test_records_use_header_row_offset() {
        let table = RawTable::from_strings(
            "t",
            vec![
                vec!["Orçamento 2025", ""],
                vec!["Tipo", "Valor"],
                vec!["Mídia", "100"],
            ],
        );
        let records = table.records(1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Tipo"), Some(&CellValue::text("Mídia")));
        assert_eq!(records[0].get("Valor"), Some(&CellValue::text("100")));
        assert_eq!(records[0].get("Missing"), None);
    }
}
