// Long-Format Transformer (melt)
// Wide rows (one column per month) → one CanonicalEntry per (entity, month)
//
// Rule applied uniformly to every source:
//   declared-empty cell        → no entry
//   non-empty, unparseable     → entry with amount 0
//   incomplete identity        → no entry (counted, never zero-filled)

use crate::entry::{validate_identity, CanonicalEntry, CanonicalRow, RowIssue};
use crate::error::Diagnostic;
use crate::numeric::{parse_amount_with, to_number_with, NumberFormat};
use crate::schema::is_rollup_column;
use crate::table::CellValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeltOutput {
    pub entries: Vec<CanonicalEntry>,
    /// Cells skipped because they were empty
    pub dropped_missing: usize,
    /// Cells skipped because their row failed validation
    pub dropped_incomplete: usize,
    /// Non-empty cells that failed strict parsing and were counted as zero
    pub coerced_to_zero: usize,
    pub issues: Vec<(usize, RowIssue)>,
}

impl MeltOutput {
    /// Warnings worth surfacing for one source
    pub fn diagnostics(&self, source: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if !self.issues.is_empty() {
            let sample: Vec<String> = self
                .issues
                .iter()
                .take(3)
                .map(|(line, issue)| format!("line {}: {}", line, issue))
                .collect();
            diagnostics.push(Diagnostic::warning(
                source,
                format!(
                    "{} row(s) dropped for incomplete identity ({})",
                    self.issues.len(),
                    sample.join("; ")
                ),
            ));
        }
        if self.coerced_to_zero > 0 {
            diagnostics.push(Diagnostic::warning(
                source,
                format!("{} unparseable amount(s) counted as zero", self.coerced_to_zero),
            ));
        }

        diagnostics
    }
}

/// Melt wide rows into facts.
///
/// Month cells whose label is a rollup ("TOTAL") are never melted, even if a
/// caller passes them in.
pub fn melt(rows: &[CanonicalRow], format: NumberFormat) -> MeltOutput {
    let mut output = MeltOutput::default();

    for row in rows {
        let month_cells: Vec<_> = row
            .months
            .iter()
            .filter(|cell| cell.month.is_recognized() && !is_rollup_column(&cell.label))
            .collect();

        if let Err(issue) = validate_identity(&row.identity) {
            output.dropped_incomplete += month_cells.iter().filter(|c| !c.value.is_blank()).count();
            output.issues.push((row.line_number, issue));
            continue;
        }

        for cell in month_cells {
            if cell.value.is_blank() {
                output.dropped_missing += 1;
                continue;
            }

            let amount = to_number_with(&cell.value, format);
            let coerced = match &cell.value {
                CellValue::Text(text) => !parse_amount_with(text, format).is_some_and(f64::is_finite),
                CellValue::Number(n) => !n.is_finite(),
                CellValue::Bool(_) => true,
                CellValue::Empty => false,
            };
            if coerced {
                output.coerced_to_zero += 1;
            }

            if let Some(entry) = CanonicalEntry::from_identity(
                &row.identity,
                &row.source_area,
                cell.month,
                &cell.label,
                amount,
            ) {
                output.entries.push(entry);
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CostKind, Identity, MonthCell};
    use crate::month::MonthToken;

    fn identity() -> Identity {
        Identity {
            project: "Podcast".to_string(),
            category: "Conteúdo".to_string(),
            kind: "Produção".to_string(),
            cost_center: "3300".to_string(),
            brand: "Marca A".to_string(),
            pillar: "Marca".to_string(),
            cost_kind: "Fixo".to_string(),
        }
    }

    fn cell(label: &str, month: MonthToken, value: CellValue) -> MonthCell {
        MonthCell {
            label: label.to_string(),
            month,
            value,
        }
    }

    fn row(months: Vec<MonthCell>) -> CanonicalRow {
        CanonicalRow {
            source_area: "CONTEÚDO".to_string(),
            identity: identity(),
            months,
            line_number: 3,
        }
    }

    #[test]
    fn test_three_months_and_total_yield_three_entries() {
        let rows = vec![row(vec![
            cell("Jan/25", MonthToken::Jan, CellValue::text("100")),
            cell("Fev/25", MonthToken::Feb, CellValue::text("200")),
            cell("Mar/25", MonthToken::Mar, CellValue::Number(300.0)),
            cell("TOTAL", MonthToken::Jan, CellValue::Number(600.0)),
        ])];

        let output = melt(&rows, NumberFormat::Auto);
        assert_eq!(output.entries.len(), 3);
        let total: f64 = output.entries.iter().map(|e| e.amount).sum();
        assert_eq!(total, 600.0);
        assert_eq!(output.entries[0].cost_kind, CostKind::Fixed);
        assert_eq!(output.entries[1].month_label, "Fev/25");
    }

    #[test]
    fn test_empty_cells_disappear_unparseable_become_zero() {
        let rows = vec![row(vec![
            cell("Jan", MonthToken::Jan, CellValue::Empty),
            cell("Fev", MonthToken::Feb, CellValue::text("  ")),
            cell("Mar", MonthToken::Mar, CellValue::text("a definir")),
            cell("Abr", MonthToken::Apr, CellValue::text("1.234,56")),
        ])];

        let output = melt(&rows, NumberFormat::Auto);
        assert_eq!(output.entries.len(), 2);
        assert_eq!(output.dropped_missing, 2);
        assert_eq!(output.coerced_to_zero, 1);
        assert_eq!(output.entries[0].month, MonthToken::Mar);
        assert_eq!(output.entries[0].amount, 0.0);
        assert_eq!(output.entries[1].amount, 1234.56);
    }

    #[test]
    fn test_bool_and_non_finite_cells_count_as_zero_filled() {
        let rows = vec![row(vec![
            cell("Jan", MonthToken::Jan, CellValue::Bool(true)),
            cell("Fev", MonthToken::Feb, CellValue::Number(f64::NAN)),
            cell("Mar", MonthToken::Mar, CellValue::Number(10.0)),
        ])];

        let output = melt(&rows, NumberFormat::Auto);
        assert_eq!(output.entries.len(), 3);
        assert_eq!(output.entries[0].amount, 0.0);
        assert_eq!(output.entries[1].amount, 0.0);
        assert_eq!(output.coerced_to_zero, 2);
        assert!(output.diagnostics("CX")[0].message.contains("2 unparseable"));
    }

    #[test]
    fn test_incomplete_rows_are_dropped_not_zero_filled() {
        let mut incomplete = row(vec![
            cell("Jan", MonthToken::Jan, CellValue::text("50")),
            cell("Fev", MonthToken::Feb, CellValue::Empty),
        ]);
        incomplete.identity.brand = String::new();
        incomplete.line_number = 7;

        let output = melt(&[incomplete], NumberFormat::Auto);
        assert!(output.entries.is_empty());
        assert_eq!(output.dropped_incomplete, 1);
        assert_eq!(output.issues.len(), 1);
        assert_eq!(output.issues[0].0, 7);

        let diagnostics = output.diagnostics("CONTEÚDO");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("line 7: missing brand"));
    }

    #[test]
    fn test_unknown_cost_kind_drops_row() {
        let mut odd = row(vec![cell("Jan", MonthToken::Jan, CellValue::text("50"))]);
        odd.identity.cost_kind = "Misto".to_string();

        let output = melt(&[odd], NumberFormat::Auto);
        assert!(output.entries.is_empty());
        assert!(matches!(output.issues[0].1, RowIssue::UnknownCostKind(_)));
    }

    #[test]
    fn test_brazilian_source_format() {
        let rows = vec![row(vec![cell("Jan", MonthToken::Jan, CellValue::text("1.500"))])];
        assert_eq!(melt(&rows, NumberFormat::Brazilian).entries[0].amount, 1500.0);
        assert_eq!(melt(&rows, NumberFormat::Auto).entries[0].amount, 1.5);
    }
}
