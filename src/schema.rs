// 📐 Column Mapper - Shape Layer
// Renames raw columns into the canonical schema strictly by POSITION.
//
// Source headers are free text and drift between sheets ("Centro de Custo",
// "CENTRO DE CUSTOS", blank...), so column position is the only stable contract.

use crate::entry::{CanonicalField, CanonicalRow, Identity, MonthCell};
use crate::error::{Diagnostic, PipelineError, Result};
use crate::month::MonthToken;
use crate::numeric::{parse_amount, NumberFormat};
use crate::table::RawTable;
use serde::{Deserialize, Serialize};

// ============================================================================
// SOURCE SCHEMA DESCRIPTOR
// ============================================================================

/// Layout of one source table.
///
/// Columns: `[id_column] [fields...] [month columns...]`, headers on `header_row`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Area the facts are attributed to (usually the trimmed sheet name)
    pub source_area: String,

    /// Row holding the real headers; rows above it are titles
    #[serde(default = "default_header_row")]
    pub header_row: usize,

    /// Entity identifier column; canonical fields start right after it
    #[serde(default)]
    pub id_column: usize,

    /// Canonical fields in the order they appear after the id column
    #[serde(default = "default_fields")]
    pub fields: Vec<CanonicalField>,

    #[serde(default)]
    pub number_format: NumberFormat,
}

fn default_header_row() -> usize {
    1
}

fn default_fields() -> Vec<CanonicalField> {
    CanonicalField::ALL.to_vec()
}

impl SourceSchema {
    /// Standard planning sheet: title row, id column, seven canonical fields
    pub fn planning_sheet(source_area: &str) -> Self {
        SourceSchema {
            source_area: source_area.trim().to_string(),
            header_row: default_header_row(),
            id_column: 0,
            fields: default_fields(),
            number_format: NumberFormat::Auto,
        }
    }

    pub fn first_field_column(&self) -> usize {
        self.id_column + 1
    }

    /// First column that may hold months
    pub fn first_month_column(&self) -> usize {
        self.first_field_column() + self.fields.len()
    }

    /// Columns needed before any month column
    pub fn required_columns(&self) -> usize {
        self.first_month_column()
    }
}

// ============================================================================
// MAPPED OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthColumn {
    pub index: usize,
    pub label: String,
    pub month: MonthToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedTable {
    pub source: String,
    pub rows: Vec<CanonicalRow>,
    pub month_columns: Vec<MonthColumn>,
    /// Canonical fields no retained row populated
    pub absent_fields: Vec<CanonicalField>,
    /// Trailing headers that are neither months nor rollups
    pub ignored_columns: Vec<String>,
    pub dropped_blank_rows: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// "TOTAL", "Total Anual", "total_projeto"... are derived rollups, never months
pub fn is_rollup_column(label: &str) -> bool {
    label.to_uppercase().contains("TOTAL")
}

// Numeric cost-center codes lose their spreadsheet ".0"
fn normalize_code(text: String) -> String {
    match parse_amount(&text) {
        Some(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", n as i64),
        _ => text,
    }
}

// ============================================================================
// COLUMN MAPPER
// ============================================================================

/// Map a raw table onto the canonical schema.
///
/// Fails with `SchemaMismatch` (naming the source) when the header row is
/// missing, the table is narrower than the schema, or no month column exists.
/// Everything else is a warning in `MappedTable::diagnostics`.
pub fn map_columns(table: &RawTable, schema: &SourceSchema) -> Result<MappedTable> {
    let source = table.source.clone();

    if table.rows.len() <= schema.header_row {
        return Err(PipelineError::schema_mismatch(
            &source,
            format!(
                "header row {} not present ({} rows in table)",
                schema.header_row + 1,
                table.rows.len()
            ),
        ));
    }

    let width = table.width();
    if width < schema.required_columns() {
        return Err(PipelineError::schema_mismatch(
            &source,
            format!(
                "expected at least {} columns, found {}",
                schema.required_columns(),
                width
            ),
        ));
    }

    let header = table.header(schema.header_row);
    let mut month_columns = Vec::new();
    let mut ignored_columns = Vec::new();

    for (index, label) in header.iter().enumerate().skip(schema.first_month_column()) {
        if label.is_empty() || is_rollup_column(label) {
            continue;
        }
        match MonthToken::from_column_label(label) {
            Some(month) => month_columns.push(MonthColumn {
                index,
                label: label.clone(),
                month,
            }),
            None => ignored_columns.push(label.clone()),
        }
    }

    if month_columns.is_empty() {
        return Err(PipelineError::schema_mismatch(
            &source,
            "no month column found after the canonical fields",
        ));
    }

    let mut rows = Vec::new();
    let mut dropped_blank_rows = 0;

    for (row_idx, _) in table.rows.iter().enumerate().skip(schema.header_row + 1) {
        let mut identity = Identity::default();
        for (offset, field) in schema.fields.iter().enumerate() {
            let value = table.cell(row_idx, schema.first_field_column() + offset).as_text();
            let value = if *field == CanonicalField::CostCenter {
                normalize_code(value)
            } else {
                value
            };
            identity.set(*field, value);
        }

        if identity.is_blank() {
            dropped_blank_rows += 1;
            continue;
        }

        let months = month_columns
            .iter()
            .map(|col| MonthCell {
                label: col.label.clone(),
                month: col.month,
                value: table.cell(row_idx, col.index).clone(),
            })
            .collect();

        rows.push(CanonicalRow {
            source_area: schema.source_area.clone(),
            identity,
            months,
            line_number: row_idx + 1,
        });
    }

    let absent_fields: Vec<CanonicalField> = CanonicalField::ALL
        .iter()
        .copied()
        .filter(|field| rows.iter().all(|row| row.identity.get(*field).is_empty()))
        .collect();

    let mut diagnostics = Vec::new();
    if !absent_fields.is_empty() {
        let names: Vec<&str> = absent_fields.iter().map(|f| f.name()).collect();
        tracing::warn!(source = %source, fields = ?names, "canonical fields absent");
        diagnostics.push(Diagnostic::warning(
            &source,
            format!("fields absent from every row: {}", names.join(", ")),
        ));
    }
    if !ignored_columns.is_empty() {
        tracing::debug!(source = %source, columns = ?ignored_columns, "ignoring non-month columns");
        diagnostics.push(Diagnostic::info(
            &source,
            format!("ignored non-month columns: {}", ignored_columns.join(", ")),
        ));
    }

    Ok(MappedTable {
        source,
        rows,
        month_columns,
        absent_fields,
        ignored_columns,
        dropped_blank_rows,
        diagnostics,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;

    fn planning_table() -> RawTable {
        RawTable::from_strings(
            " 2025 - Growth",
            vec![
                vec!["PLANEJAMENTO 2025", "", "", "", "", "", "", "", "", "", ""],
                vec![
                    "#", "Projeto", "Categoria", "Tipo", "Centro de Custo", "Marca", "Pilares",
                    "Fixo/Variável", "Jan/25", "Fev/25", "TOTAL",
                ],
                vec![
                    "1", "Lançamento", "Mídia", "Ads", "4100", "Marca A", "Aquisição", "Variável",
                    "1.000,00", "500", "1500",
                ],
                vec!["", "", "", "", "", "", "", "", "", "", ""],
                vec!["3", "Evento", "", "", "", "", "", "", "200", "", "200"],
            ],
        )
    }

    #[test]
    fn test_positional_rename() {
        let schema = SourceSchema::planning_sheet(" 2025 - Growth");
        let mapped = map_columns(&planning_table(), &schema).unwrap();

        assert_eq!(mapped.rows.len(), 2);
        let first = &mapped.rows[0];
        assert_eq!(first.source_area, "2025 - Growth");
        assert_eq!(first.identity.project, "Lançamento");
        assert_eq!(first.identity.kind, "Ads");
        assert_eq!(first.identity.cost_center, "4100");
        assert_eq!(first.identity.cost_kind, "Variável");
        assert_eq!(first.line_number, 3);
    }

    #[test]
    fn test_total_column_is_not_a_month() {
        let schema = SourceSchema::planning_sheet("Growth");
        let mapped = map_columns(&planning_table(), &schema).unwrap();

        let months: Vec<MonthToken> = mapped.month_columns.iter().map(|c| c.month).collect();
        assert_eq!(months, vec![MonthToken::Jan, MonthToken::Feb]);
        assert!(mapped.ignored_columns.is_empty());
        assert_eq!(mapped.rows[0].months.len(), 2);
    }

    #[test]
    fn test_blank_rows_dropped_partial_rows_kept() {
        let schema = SourceSchema::planning_sheet("Growth");
        let mapped = map_columns(&planning_table(), &schema).unwrap();

        assert_eq!(mapped.dropped_blank_rows, 1);
        let partial = &mapped.rows[1];
        assert_eq!(partial.identity.project, "Evento");
        assert_eq!(partial.identity.category, "");
    }

    #[test]
    fn test_too_few_columns_is_schema_mismatch() {
        let table = RawTable::from_strings(
            "CX",
            vec![vec!["title"], vec!["#", "Projeto", "Categoria"], vec!["1", "A", "B"]],
        );
        let schema = SourceSchema::planning_sheet("CX");
        let err = map_columns(&table, &schema).unwrap_err();

        match err {
            PipelineError::SchemaMismatch { source_id, detail } => {
                assert_eq!(source_id, "CX");
                assert!(detail.contains("expected at least 8 columns, found 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_header_row_is_schema_mismatch() {
        let table = RawTable::from_strings("Vazia", vec![vec!["só título"]]);
        let err = map_columns(&table, &SourceSchema::planning_sheet("Vazia")).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_no_month_columns_is_schema_mismatch() {
        let table = RawTable::from_strings(
            "Sem meses",
            vec![
                vec![""],
                vec!["#", "P", "C", "T", "CC", "M", "Pi", "F/V", "TOTAL", "Obs"],
                vec!["1", "a", "b", "c", "1", "m", "p", "Fixo", "10", "x"],
            ],
        );
        let err = map_columns(&table, &SourceSchema::planning_sheet("Sem meses")).unwrap_err();
        assert!(err.to_string().contains("no month column"));
    }

    #[test]
    fn test_absent_fields_are_reported_not_raised() {
        let table = RawTable::from_strings(
            "Conteúdo",
            vec![
                vec![""],
                vec!["#", "P", "C", "T", "CC", "M", "Pi", "F/V", "Jan", "Observações"],
                vec!["1", "a", "b", "c", "10", "", "p", "Fixo", "10", "nota"],
            ],
        );
        let mapped = map_columns(&table, &SourceSchema::planning_sheet("Conteúdo")).unwrap();

        assert_eq!(mapped.absent_fields, vec![CanonicalField::Brand]);
        assert_eq!(mapped.ignored_columns, vec!["Observações".to_string()]);
        assert_eq!(mapped.diagnostics.len(), 2);
        assert!(mapped.diagnostics[0].message.contains("brand"));
    }

    #[test]
    fn test_numeric_cost_center_loses_decimals() {
        let mut table = planning_table();
        table.rows[2][4] = CellValue::Number(4100.0);
        table.rows[4][4] = CellValue::text("5200.0");
        let mapped = map_columns(&table, &SourceSchema::planning_sheet("Growth")).unwrap();
        assert_eq!(mapped.rows[0].identity.cost_center, "4100");
        assert_eq!(mapped.rows[1].identity.cost_center, "5200");
    }

    #[test]
    fn test_schema_offsets() {
        let schema = SourceSchema {
            source_area: "x".to_string(),
            header_row: 0,
            id_column: 2,
            fields: vec![CanonicalField::Project, CanonicalField::Type],
            number_format: NumberFormat::Brazilian,
        };
        assert_eq!(schema.first_field_column(), 3);
        assert_eq!(schema.first_month_column(), 5);
        assert_eq!(schema.required_columns(), 5);
    }
}
