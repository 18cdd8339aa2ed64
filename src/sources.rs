// Tabular Sources - thin adapters that turn files into RawTables
//
// Trait-based so the pipeline never cares where a sheet came from:
//   - CsvSource:      a directory of `<sheet>.csv` files, or one CSV file
//   - WorkbookSource: xlsx / xlsm / xlsb / xls / ods via calamine
//   - MemorySource:   tables already in memory
//
// Positions are absolute: a sheet whose first rows or columns are empty still
// yields a table where column N is the N-th spreadsheet column.

use crate::error::{PipelineError, Result};
use crate::table::{CellValue, RawTable};
use calamine::{open_workbook_auto, Data, Reader};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// SOURCE TRAIT
// ============================================================================

pub trait TabularSource: Send + Sync {
    /// Stable identifier used in diagnostics and cache keys
    fn source_id(&self) -> &str;

    /// Read one sheet as a raw table, title rows included
    fn read_sheet(&self, sheet: &str) -> Result<RawTable>;

    fn sheet_names(&self) -> Result<Vec<String>>;

    /// Content hash; `None` when the source cannot be fingerprinted
    fn fingerprint(&self) -> Option<String>;
}

/// Hex sha256 of some bytes
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn fingerprint_file(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| fingerprint_bytes(&bytes))
}

// Sheet names in real workbooks carry stray spaces (" 2025 - Growth ")
fn resolve_sheet_name<'a>(names: &'a [String], wanted: &str) -> Option<&'a String> {
    names
        .iter()
        .find(|n| n.as_str() == wanted)
        .or_else(|| names.iter().find(|n| n.trim() == wanted.trim()))
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvSource {
    id: String,
    path: PathBuf,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        CsvSource {
            id: path.display().to_string(),
            path,
            delimiter: b',',
        }
    }

    /// Brazilian exports are often `;`-separated
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn sheet_path(&self, sheet: &str) -> Result<PathBuf> {
        if !self.is_directory() {
            return Ok(self.path.clone());
        }
        let names = self.sheet_names()?;
        let name = resolve_sheet_name(&names, sheet).ok_or_else(|| {
            PipelineError::source_read(&self.id, format!("sheet '{}' not found", sheet))
        })?;
        Ok(self.path.join(format!("{}.csv", name)))
    }

    fn csv_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl TabularSource for CsvSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn read_sheet(&self, sheet: &str) -> Result<RawTable> {
        let path = self.sheet_path(sheet)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_path(&path)
            .map_err(|e| PipelineError::source_read(&self.id, format!("{}: {}", path.display(), e)))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| PipelineError::source_read(&self.id, e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|cell| {
                        if cell.trim().is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::text(cell)
                        }
                    })
                    .collect(),
            );
        }

        tracing::debug!(source = %self.id, sheet, rows = rows.len(), "csv sheet read");
        Ok(RawTable::new(sheet.trim(), rows))
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        if !self.is_directory() {
            let stem = self
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sheet")
                .to_string();
            return Ok(vec![stem]);
        }
        Ok(self
            .csv_files()?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect())
    }

    fn fingerprint(&self) -> Option<String> {
        if !self.is_directory() {
            return fingerprint_file(&self.path);
        }
        let mut hasher = Sha256::new();
        for file in self.csv_files().ok()? {
            hasher.update(file.file_name()?.to_string_lossy().as_bytes());
            hasher.update(fs::read(&file).ok()?);
        }
        Some(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// WORKBOOK (calamine)
// ============================================================================

pub struct WorkbookSource {
    id: String,
    path: PathBuf,
}

impl WorkbookSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        WorkbookSource {
            id: path.display().to_string(),
            path,
        }
    }
}

/// Excel serial day number → ISO date text, so date headers resolve to months
fn serial_to_date_text(serial: f64) -> Option<String> {
    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(serial.floor() as i64))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => serial_to_date_text(dt.as_f64())
            .map(CellValue::Text)
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

impl TabularSource for WorkbookSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn read_sheet(&self, sheet: &str) -> Result<RawTable> {
        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| PipelineError::source_read(&self.id, e.to_string()))?;
        let names = workbook.sheet_names().to_vec();
        let name = resolve_sheet_name(&names, sheet).ok_or_else(|| {
            PipelineError::source_read(&self.id, format!("sheet '{}' not found", sheet))
        })?;
        let range = workbook
            .worksheet_range(name)
            .map_err(|e| PipelineError::source_read(&self.id, format!("{}: {}", name, e)))?;

        // calamine ranges start at the first used cell
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; col_offset];
            cells.extend(row.iter().map(convert_cell));
            rows.push(cells);
        }

        tracing::debug!(source = %self.id, sheet = %name, rows = rows.len(), "workbook sheet read");
        Ok(RawTable::new(name.trim(), rows))
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        let workbook = open_workbook_auto(&self.path)
            .map_err(|e| PipelineError::source_read(&self.id, e.to_string()))?;
        Ok(workbook.sheet_names().to_vec())
    }

    fn fingerprint(&self) -> Option<String> {
        fingerprint_file(&self.path)
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Tables already in memory (uploads, tests)
pub struct MemorySource {
    id: String,
    sheets: HashMap<String, RawTable>,
    order: Vec<String>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>) -> Self {
        MemorySource {
            id: id.into(),
            sheets: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn with_sheet(mut self, name: &str, table: RawTable) -> Self {
        if !self.sheets.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sheets.insert(name.to_string(), table);
        self
    }
}

impl TabularSource for MemorySource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn read_sheet(&self, sheet: &str) -> Result<RawTable> {
        let name = resolve_sheet_name(&self.order, sheet).ok_or_else(|| {
            PipelineError::source_read(&self.id, format!("sheet '{}' not found", sheet))
        })?;
        Ok(self.sheets[name].clone())
    }

    fn sheet_names(&self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    fn fingerprint(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        for name in &self.order {
            hasher.update(name.as_bytes());
            let json = serde_json::to_vec(&self.sheets[name]).ok()?;
            hasher.update(json);
        }
        Some(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// FACTORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    CsvDirectory,
    CsvFile,
    Workbook,
}

impl SourceKind {
    pub fn name(&self) -> &str {
        match self {
            SourceKind::CsvDirectory => "CSV directory",
            SourceKind::CsvFile => "CSV file",
            SourceKind::Workbook => "Spreadsheet workbook",
        }
    }
}

/// Detect the adapter from the path: directory, `.csv`, or a workbook extension
pub fn detect_source(path: &Path) -> Result<SourceKind> {
    if path.is_dir() {
        return Ok(SourceKind::CsvDirectory);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => Ok(SourceKind::CsvFile),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Workbook),
        _ => Err(PipelineError::source_read(
            path.display().to_string(),
            "unsupported source type (expected a directory, .csv, .xlsx, .xls or .ods)",
        )),
    }
}

pub fn open_source(path: &Path) -> Result<Box<dyn TabularSource>> {
    let source: Box<dyn TabularSource> = match detect_source(path)? {
        SourceKind::CsvDirectory | SourceKind::CsvFile => Box::new(CsvSource::new(path)),
        SourceKind::Workbook => Box::new(WorkbookSource::new(path)),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_source() {
        assert_eq!(detect_source(Path::new("orcamento.xlsx")).unwrap(), SourceKind::Workbook);
        assert_eq!(detect_source(Path::new("ORCAMENTO.ODS")).unwrap(), SourceKind::Workbook);
        assert_eq!(detect_source(Path::new("growth.csv")).unwrap(), SourceKind::CsvFile);
        assert!(detect_source(Path::new("notes.pdf")).is_err());

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_source(dir.path()).unwrap(), SourceKind::CsvDirectory);
    }

    #[test]
    fn test_csv_directory_reads_sheet_by_trimmed_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("2025 - CX.csv")).unwrap();
        writeln!(file, "Orçamento,,").unwrap();
        writeln!(file, "ID,Projeto,Jan").unwrap();
        writeln!(file, "1,Podcast,100").unwrap();
        writeln!(file, "2,,").unwrap();

        let source = CsvSource::new(dir.path());
        assert_eq!(source.sheet_names().unwrap(), vec!["2025 - CX".to_string()]);

        let table = source.read_sheet(" 2025 - CX ").unwrap();
        assert_eq!(table.source, "2025 - CX");
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.cell(2, 1), &CellValue::text("Podcast"));
        assert_eq!(table.cell(3, 1), &CellValue::Empty);

        assert!(source.read_sheet("Growth").is_err());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.csv");
        fs::write(&path, "Tipo,Valor\nMídia,10\n").unwrap();

        let source = CsvSource::new(&path);
        let first = source.fingerprint().unwrap();
        assert_eq!(source.fingerprint().unwrap(), first);

        fs::write(&path, "Tipo,Valor\nMídia,20\n").unwrap();
        assert_ne!(source.fingerprint().unwrap(), first);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "Tipo;Valor\nMídia;1.234,56\n").unwrap();

        let table = CsvSource::new(&path).with_delimiter(b';').read_sheet("export").unwrap();
        assert_eq!(table.cell(1, 1), &CellValue::text("1.234,56"));
    }

    #[test]
    fn test_memory_source() {
        let table = RawTable::from_strings("CX", vec![vec!["a"]]);
        let source = MemorySource::new("mem").with_sheet("CX", table.clone());
        assert_eq!(source.read_sheet("CX").unwrap(), table);
        assert!(source.read_sheet("Growth").is_err());
        assert!(source.fingerprint().is_some());
    }

    #[test]
    fn test_serial_dates_become_iso_text() {
        assert_eq!(serial_to_date_text(45658.0).as_deref(), Some("2025-01-01"));
    }
}
