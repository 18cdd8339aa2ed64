// 📅 Project Calendar
// Calendar sheet (month text | campaign | area) → one row per project with the
// months it runs in. Month text may span several months ("Jan/Fev").

use crate::error::{PipelineError, Result};
use crate::month::{recognized_months, MonthToken, ALL_MONTHS};
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSchema {
    pub sheet: String,
    #[serde(default)]
    pub header_row: usize,
    #[serde(default)]
    pub month_column: usize,
    #[serde(default = "default_project_column")]
    pub project_column: usize,
    #[serde(default = "default_area_column")]
    pub area_column: usize,
}

fn default_project_column() -> usize {
    1
}

fn default_area_column() -> usize {
    2
}

impl CalendarSchema {
    pub fn new(sheet: &str) -> Self {
        CalendarSchema {
            sheet: sheet.to_string(),
            header_row: 0,
            month_column: 0,
            project_column: default_project_column(),
            area_column: default_area_column(),
        }
    }
}

/// One line of the calendar sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub month_text: String,
    pub project: String,
    pub area: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRow {
    pub project: String,
    pub area: String,
    /// Chronological, no duplicates
    pub months: Vec<MonthToken>,
}

impl CalendarRow {
    pub fn runs_in(&self, month: MonthToken) -> bool {
        self.months.contains(&month)
    }

    /// One mark per month JAN..DEC, "✔" where the project runs
    pub fn marks(&self) -> Vec<&'static str> {
        ALL_MONTHS
            .iter()
            .map(|m| if self.runs_in(*m) { "✔" } else { "" })
            .collect()
    }
}

/// Read calendar lines; rows without month text or project are dropped
pub fn calendar_entries(table: &RawTable, schema: &CalendarSchema) -> Result<Vec<CalendarEntry>> {
    let needed = schema
        .month_column
        .max(schema.project_column)
        .max(schema.area_column)
        + 1;
    if table.width() < needed {
        return Err(PipelineError::schema_mismatch(
            &table.source,
            format!("calendar needs {} columns, found {}", needed, table.width()),
        ));
    }

    Ok(((schema.header_row + 1)..table.rows.len())
        .map(|row| CalendarEntry {
            month_text: table.cell(row, schema.month_column).as_text(),
            project: table.cell(row, schema.project_column).as_text(),
            area: table.cell(row, schema.area_column).as_text(),
        })
        .filter(|entry| !entry.month_text.is_empty() && !entry.project.is_empty())
        .collect())
}

/// Merge calendar lines per project, first-seen order.
///
/// `month_filter` limits the months reported; empty means all twelve.
/// Unrecognized month fragments are discarded.
pub fn build_calendar(entries: &[CalendarEntry], month_filter: &[MonthToken]) -> Vec<CalendarRow> {
    let mut order: Vec<(String, String, BTreeSet<MonthToken>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if entry.month_text.trim().is_empty() || entry.project.trim().is_empty() {
            continue;
        }
        let months = recognized_months(&entry.month_text);
        let project = entry.project.trim().to_string();

        let pos = match index.get(&project) {
            Some(&pos) => pos,
            None => {
                index.insert(project.clone(), order.len());
                order.push((project, entry.area.trim().to_string(), BTreeSet::new()));
                order.len() - 1
            }
        };
        if order[pos].1.is_empty() {
            order[pos].1 = entry.area.trim().to_string();
        }
        order[pos].2.extend(
            months
                .into_iter()
                .filter(|m| month_filter.is_empty() || month_filter.contains(m)),
        );
    }

    order
        .into_iter()
        .map(|(project, area, months)| CalendarRow {
            project,
            area,
            months: months.into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(month_text: &str, project: &str, area: &str) -> CalendarEntry {
        CalendarEntry {
            month_text: month_text.to_string(),
            project: project.to_string(),
            area: area.to_string(),
        }
    }

    #[test]
    fn test_multi_month_rows_merge() {
        let entries = vec![
            line("Jan/Fev", "Campanha Verão", "Growth"),
            line("Mar", "Campanha Verão", "Growth"),
            line("Dezembro", "Natal", "CX"),
        ];

        let calendar = build_calendar(&entries, &[]);
        assert_eq!(calendar.len(), 2);
        assert_eq!(calendar[0].project, "Campanha Verão");
        assert_eq!(
            calendar[0].months,
            vec![MonthToken::Jan, MonthToken::Feb, MonthToken::Mar]
        );
        assert_eq!(calendar[1].months, vec![MonthToken::Dec]);
        assert_eq!(calendar[1].marks()[11], "✔");
        assert_eq!(calendar[1].marks()[0], "");
    }

    #[test]
    fn test_unknown_tokens_and_missing_fields_are_dropped() {
        let entries = vec![
            line("Jan/Q3", "Lançamento", "Produto"),
            line("", "Sem mês", "Produto"),
            line("Abr", "", "Produto"),
        ];

        let calendar = build_calendar(&entries, &[]);
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar[0].months, vec![MonthToken::Jan]);
    }

    #[test]
    fn test_month_filter() {
        let entries = vec![line("Jan/Fev/Mar", "Podcast", "Conteúdo")];
        let calendar = build_calendar(&entries, &[MonthToken::Feb]);
        assert_eq!(calendar[0].months, vec![MonthToken::Feb]);
        assert!(!calendar[0].runs_in(MonthToken::Jan));
    }

    #[test]
    fn test_calendar_entries_from_sheet() {
        let table = RawTable::from_strings(
            "Calendario",
            vec![
                vec!["Mês", "Campanha", "Área"],
                vec!["Jan", "Podcast", "Conteúdo"],
                vec!["", "Órfã", "CX"],
                vec!["Fev", "Webinar", ""],
            ],
        );

        let entries = calendar_entries(&table, &CalendarSchema::new("Calendario")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].project, "Webinar");
        assert_eq!(entries[1].area, "");
    }
}
