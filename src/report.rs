// 📋 Text Reports + CSV Export
// Plain-text tables for the CLI; CSV for anything that wants the raw facts.

use crate::aggregate::{
    aggregate, grand_total, monthly_series, split_by_cost_kind, top_n, AggregateRow, GroupField,
};
use crate::calendar::CalendarRow;
use crate::entry::CanonicalEntry;
use crate::error::Diagnostic;
use crate::month::ALL_MONTHS;
use crate::numeric::format_brl;
use crate::reconciliation::{ComparisonRecord, ReconciliationReport};
use serde::Serialize;
use std::io::Write;

/// Left-aligned text columns, right-aligned when every cell looks like money
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let columns = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    let numeric: Vec<bool> = (0..columns)
        .map(|i| !rows.is_empty() && rows.iter().all(|r| r.get(i).is_some_and(|c| c.contains("R$"))))
        .collect();

    let pad = |text: &str, i: usize| {
        let fill = widths[i].saturating_sub(text.chars().count());
        if numeric[i] {
            format!("{}{}", " ".repeat(fill), text)
        } else {
            format!("{}{}", text, " ".repeat(fill))
        }
    };

    let mut out = String::new();
    let header: Vec<String> = headers.iter().enumerate().map(|(i, h)| pad(h, i)).collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = (0..columns)
            .map(|i| pad(row.get(i).map(String::as_str).unwrap_or(""), i))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn aggregate_rows(rows: &[AggregateRow]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            let mut cells = row.key.clone();
            cells.push(format_brl(row.total));
            cells
        })
        .collect()
}

/// Big numbers plus totals per source area
pub fn overview(entries: &[CanonicalEntry], area: Option<&str>) -> String {
    let split = split_by_cost_kind(entries, area);
    let mut out = String::new();
    out.push_str(&format!("Total planned:  {}\n", format_brl(split.total)));
    out.push_str(&format!("Fixed:          {}\n", format_brl(split.fixed)));
    out.push_str(&format!("Variable:       {}\n\n", format_brl(split.variable)));

    let by_area = aggregate(entries, &[GroupField::SourceArea]);
    out.push_str(&render_table(&["Area", "Total"], &aggregate_rows(&by_area)));
    out
}

pub fn ranking(entries: &[CanonicalEntry], n: usize) -> String {
    let rows = top_n(aggregate(entries, &[GroupField::Project, GroupField::SourceArea]), n);
    let mut cells = aggregate_rows(&rows);
    for (i, row) in cells.iter_mut().enumerate() {
        row.insert(0, format!("{}", i + 1));
    }
    render_table(&["#", "Project", "Area", "Total"], &cells)
}

pub fn monthly(entries: &[CanonicalEntry]) -> String {
    let rows: Vec<Vec<String>> = monthly_series(entries)
        .into_iter()
        .map(|(month, total)| vec![month.code().to_string(), format_brl(total)])
        .collect();
    let mut out = render_table(&["Month", "Total"], &rows);
    out.push_str(&format!("Total: {}\n", format_brl(grand_total(entries))));
    out
}

pub fn comparison(report: &ReconciliationReport) -> String {
    let rows: Vec<Vec<String>> = report
        .records
        .iter()
        .map(|r: &ComparisonRecord| {
            vec![
                r.kind.clone(),
                format_brl(r.planned_total),
                format_brl(r.budget_ceiling),
                format_brl(r.variance),
                r.status.to_string(),
            ]
        })
        .collect();
    let mut out = render_table(&["Type", "Planned", "Budget", "Variance", "Status"], &rows);
    out.push_str(&report.summary());
    out.push('\n');
    out
}

pub fn calendar(rows: &[CalendarRow]) -> String {
    let mut headers = vec!["Project", "Area"];
    headers.extend(ALL_MONTHS.iter().map(|m| m.code()));
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.project.clone(), row.area.clone()];
            cells.extend(row.marks().into_iter().map(String::from));
            cells
        })
        .collect();
    render_table(&headers, &cells)
}

pub fn diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "No diagnostics.\n".to_string();
    }
    diagnostics.iter().map(|d| format!("{}\n", d)).collect()
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Write any serializable rows as CSV with a header line
pub fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> csv::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_facts_csv<W: Write>(writer: W, entries: &[CanonicalEntry]) -> csv::Result<()> {
    write_csv(writer, entries)
}

pub fn write_comparison_csv<W: Write>(writer: W, records: &[ComparisonRecord]) -> csv::Result<()> {
    write_csv(writer, records)
}
