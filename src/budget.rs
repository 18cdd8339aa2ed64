// 🎯 Budget Sheets - planned ceilings per type
//
// Two layouts in practice:
//   fixed-cost sheet:    category | type | Jan | Fev | ... | TOTAL
//   variable-cost sheet: type | value
// Both are described by a BudgetSchema and load into BudgetLines grouped by
// normalized type.

use crate::entry::CostKind;
use crate::error::{PipelineError, Result};
use crate::month::MonthToken;
use crate::numeric::{to_number_with, NumberFormat};
use crate::reconciliation::normalize_key;
use crate::schema::is_rollup_column;
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSchema {
    pub sheet: String,
    pub cost_kind: CostKind,
    #[serde(default = "default_header_row")]
    pub header_row: usize,
    pub type_column: usize,
    #[serde(default)]
    pub category_column: Option<usize>,
    /// First value column; every non-rollup column from here on is a value
    pub value_start: usize,
    #[serde(default)]
    pub number_format: NumberFormat,
}

fn default_header_row() -> usize {
    1
}

impl BudgetSchema {
    /// Category, type, then one column per month
    pub fn fixed_costs(sheet: &str) -> Self {
        BudgetSchema {
            sheet: sheet.to_string(),
            cost_kind: CostKind::Fixed,
            header_row: default_header_row(),
            type_column: 1,
            category_column: Some(0),
            value_start: 2,
            number_format: NumberFormat::Auto,
        }
    }

    /// Type, then a single annual value
    pub fn variable_costs(sheet: &str) -> Self {
        BudgetSchema {
            sheet: sheet.to_string(),
            cost_kind: CostKind::Variable,
            header_row: default_header_row(),
            type_column: 0,
            category_column: None,
            value_start: 1,
            number_format: NumberFormat::Auto,
        }
    }

    fn required_columns(&self) -> usize {
        let mut last = self.type_column.max(self.value_start);
        if let Some(col) = self.category_column {
            last = last.max(col);
        }
        last + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "period", content = "values", rename_all = "snake_case")]
pub enum BudgetAmounts {
    Annual(f64),
    /// JAN..DEC
    Monthly([f64; 12]),
}

impl BudgetAmounts {
    pub fn annual_total(&self) -> f64 {
        match self {
            BudgetAmounts::Annual(total) => *total,
            BudgetAmounts::Monthly(values) => values.iter().sum(),
        }
    }

    /// Ceiling for a set of months; an empty set means the whole year.
    /// Annual figures cannot be split and are returned whole.
    pub fn total_for(&self, months: &[MonthToken]) -> f64 {
        match self {
            BudgetAmounts::Annual(total) => *total,
            BudgetAmounts::Monthly(values) if months.is_empty() => values.iter().sum(),
            BudgetAmounts::Monthly(values) => months
                .iter()
                .filter(|m| m.is_recognized())
                .map(|m| values[m.index()])
                .sum(),
        }
    }

    pub fn for_month(&self, month: MonthToken) -> Option<f64> {
        match self {
            BudgetAmounts::Monthly(values) if month.is_recognized() => Some(values[month.index()]),
            _ => None,
        }
    }

    fn add(&mut self, other: &BudgetAmounts) {
        match (self, other) {
            (BudgetAmounts::Annual(a), BudgetAmounts::Annual(b)) => *a += b,
            (BudgetAmounts::Monthly(a), BudgetAmounts::Monthly(b)) => {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
            }
            (this, other) => {
                let total = this.annual_total() + other.annual_total();
                *this = BudgetAmounts::Annual(total);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub cost_kind: CostKind,
    pub amounts: BudgetAmounts,
}

/// Load a budget sheet, one line per normalized type (first spelling kept).
///
/// When any value header names a month the sheet is read as monthly and
/// non-month value columns are ignored; otherwise all value columns are
/// summed into an annual figure.
pub fn load_budget_lines(table: &RawTable, schema: &BudgetSchema) -> Result<Vec<BudgetLine>> {
    if table.rows.len() <= schema.header_row {
        return Err(PipelineError::schema_mismatch(
            &table.source,
            format!("budget header row {} not present", schema.header_row + 1),
        ));
    }
    let width = table.width();
    if width < schema.required_columns() {
        return Err(PipelineError::schema_mismatch(
            &table.source,
            format!(
                "budget sheet needs at least {} columns, found {}",
                schema.required_columns(),
                width
            ),
        ));
    }

    let header = table.header(schema.header_row);
    let value_columns: Vec<(usize, Option<MonthToken>)> = header
        .iter()
        .enumerate()
        .skip(schema.value_start)
        .filter(|(_, label)| !is_rollup_column(label))
        .map(|(idx, label)| (idx, MonthToken::from_column_label(label)))
        .collect();
    let monthly = value_columns.iter().any(|(_, month)| month.is_some());

    let mut lines: Vec<BudgetLine> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row_idx in (schema.header_row + 1)..table.rows.len() {
        let kind = table.cell(row_idx, schema.type_column).as_text();
        if kind.is_empty() {
            continue;
        }
        let category = schema
            .category_column
            .map(|col| table.cell(row_idx, col).as_text())
            .filter(|c| !c.is_empty());

        let amounts = if monthly {
            let mut values = [0.0; 12];
            for (col, month) in &value_columns {
                if let Some(month) = month {
                    values[month.index()] +=
                        to_number_with(table.cell(row_idx, *col), schema.number_format);
                }
            }
            BudgetAmounts::Monthly(values)
        } else {
            BudgetAmounts::Annual(
                value_columns
                    .iter()
                    .map(|(col, _)| to_number_with(table.cell(row_idx, *col), schema.number_format))
                    .sum(),
            )
        };

        let key = normalize_key(&kind);
        match index.get(&key) {
            Some(&pos) => lines[pos].amounts.add(&amounts),
            None => {
                index.insert(key, lines.len());
                lines.push(BudgetLine {
                    category,
                    kind,
                    cost_kind: schema.cost_kind,
                    amounts,
                });
            }
        }
    }

    tracing::debug!(source = %table.source, lines = lines.len(), monthly, "budget sheet loaded");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_sheet_sums_annual_by_type() {
        let table = RawTable::from_strings(
            "BUDGET VARIÁVEIS",
            vec![
                vec!["Budget 2025", ""],
                vec!["Tipo", "Valor"],
                vec!["Mídia", "1.000,00"],
                vec!["mídia ", "500"],
                vec!["", "999"],
                vec!["Eventos", "a definir"],
            ],
        );

        let lines = load_budget_lines(&table, &BudgetSchema::variable_costs("BUDGET VARIÁVEIS")).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, "Mídia");
        assert_eq!(lines[0].cost_kind, CostKind::Variable);
        assert_eq!(lines[0].amounts, BudgetAmounts::Annual(1500.0));
        assert_eq!(lines[1].amounts, BudgetAmounts::Annual(0.0));
    }

    #[test]
    fn test_fixed_sheet_reads_months_and_skips_total() {
        let table = RawTable::from_strings(
            "BUDGET FIXOS",
            vec![
                vec!["", "", "", "", ""],
                vec!["Categoria", "Tipo", "Jan", "Fev", "TOTAL"],
                vec!["Pessoas", "Salários", "100", "100", "200"],
                vec!["Pessoas", "Salários", "50", "", "50"],
                vec!["Ferramentas", "Software", "10", "20", "30"],
            ],
        );

        let lines = load_budget_lines(&table, &BudgetSchema::fixed_costs("BUDGET FIXOS")).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].category.as_deref(), Some("Pessoas"));
        assert_eq!(lines[0].amounts.for_month(MonthToken::Jan), Some(150.0));
        assert_eq!(lines[0].amounts.for_month(MonthToken::Feb), Some(100.0));
        assert_eq!(lines[0].amounts.annual_total(), 250.0);
        assert_eq!(lines[1].amounts.total_for(&[MonthToken::Feb]), 20.0);
    }

    #[test]
    fn test_narrow_sheet_is_schema_mismatch() {
        let table = RawTable::from_strings("BUDGET FIXOS", vec![vec![""], vec!["Categoria"]]);
        let err = load_budget_lines(&table, &BudgetSchema::fixed_costs("BUDGET FIXOS")).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
        assert_eq!(err.source_id(), Some("BUDGET FIXOS"));
    }

    #[test]
    fn test_annual_amounts_ignore_month_selection() {
        let annual = BudgetAmounts::Annual(1200.0);
        assert_eq!(annual.total_for(&[MonthToken::Jan]), 1200.0);
        assert_eq!(annual.for_month(MonthToken::Jan), None);
    }
}
