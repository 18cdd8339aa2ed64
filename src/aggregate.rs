// 📊 Aggregator - grouped sums over the canonical fact table
//
// Everything here is a pure function of the entries: the presentation layer
// recomputes on every filter change instead of caching aggregates.

use crate::entry::{CanonicalEntry, CanonicalField, CostKind};
use crate::month::MonthToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default size of the "top projects" ranking
pub const DEFAULT_TOP_N: usize = 10;

// ============================================================================
// GROUP KEYS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Project,
    Category,
    Type,
    CostCenter,
    Brand,
    Pillar,
    CostKind,
    SourceArea,
    Month,
}

impl GroupField {
    /// Key text of an entry for this field; months use their canonical code
    pub fn value_of<'a>(&self, entry: &'a CanonicalEntry) -> &'a str {
        match self {
            GroupField::Project => &entry.project,
            GroupField::Category => &entry.category,
            GroupField::Type => &entry.kind,
            GroupField::CostCenter => &entry.cost_center,
            GroupField::Brand => &entry.brand,
            GroupField::Pillar => &entry.pillar,
            GroupField::CostKind => entry.cost_kind.as_str(),
            GroupField::SourceArea => &entry.source_area,
            GroupField::Month => entry.month.code(),
        }
    }

    pub fn parse(name: &str) -> Option<GroupField> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "project" => Some(GroupField::Project),
            "category" => Some(GroupField::Category),
            "type" => Some(GroupField::Type),
            "cost_center" => Some(GroupField::CostCenter),
            "brand" => Some(GroupField::Brand),
            "pillar" => Some(GroupField::Pillar),
            "cost_kind" => Some(GroupField::CostKind),
            "source_area" | "area" => Some(GroupField::SourceArea),
            "month" => Some(GroupField::Month),
            _ => None,
        }
    }
}

impl From<CanonicalField> for GroupField {
    fn from(field: CanonicalField) -> Self {
        match field {
            CanonicalField::Project => GroupField::Project,
            CanonicalField::Category => GroupField::Category,
            CanonicalField::Type => GroupField::Type,
            CanonicalField::CostCenter => GroupField::CostCenter,
            CanonicalField::Brand => GroupField::Brand,
            CanonicalField::Pillar => GroupField::Pillar,
            CanonicalField::CostKind => GroupField::CostKind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// One value per group field, same order as requested
    pub key: Vec<String>,
    pub total: f64,
    pub count: usize,
}

// ============================================================================
// GROUPING
// ============================================================================

/// Sum `amount` per distinct key; groups come out in first-encountered order.
pub fn aggregate(entries: &[CanonicalEntry], group_by: &[GroupField]) -> Vec<AggregateRow> {
    let mut rows: Vec<AggregateRow> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();

    for entry in entries {
        let key: Vec<String> = group_by
            .iter()
            .map(|field| field.value_of(entry).to_string())
            .collect();

        match index.get(&key) {
            Some(&pos) => {
                rows[pos].total += entry.amount;
                rows[pos].count += 1;
            }
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(AggregateRow {
                    key,
                    total: entry.amount,
                    count: 1,
                });
            }
        }
    }

    rows
}

pub fn grand_total(entries: &[CanonicalEntry]) -> f64 {
    entries.iter().map(|e| e.amount).sum()
}

/// Largest `n` groups by total. Stable: equal totals keep their input order.
pub fn top_n(mut rows: Vec<AggregateRow>, n: usize) -> Vec<AggregateRow> {
    rows.sort_by(|a, b| b.total.total_cmp(&a.total));
    rows.truncate(n);
    rows
}

/// Order rows chronologically by the month component of their key.
///
/// `month_position` is the index of `GroupField::Month` inside the key;
/// keys that do not resolve to a month sort last.
pub fn sort_by_month(rows: &mut [AggregateRow], month_position: usize) {
    rows.sort_by_key(|row| {
        row.key
            .get(month_position)
            .map(|code| MonthToken::lookup(code))
            .filter(|m| m.is_recognized())
            .map(|m| m.index())
            .unwrap_or(usize::MAX)
    });
}

/// Monthly totals, chronological, only months that have entries
pub fn monthly_series(entries: &[CanonicalEntry]) -> Vec<(MonthToken, f64)> {
    let mut totals = [0.0f64; 12];
    let mut seen = [false; 12];
    for entry in entries.iter().filter(|e| e.month.is_recognized()) {
        let idx = entry.month.index();
        totals[idx] += entry.amount;
        seen[idx] = true;
    }

    crate::month::ALL_MONTHS
        .iter()
        .filter(|m| seen[m.index()])
        .map(|m| (*m, totals[m.index()]))
        .collect()
}

// ============================================================================
// FIXED / VARIABLE SPLIT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSplit {
    pub total: f64,
    pub fixed: f64,
    pub variable: f64,
}

/// Totals by cost kind, optionally restricted to one source area first
pub fn split_by_cost_kind(entries: &[CanonicalEntry], area: Option<&str>) -> CostSplit {
    let mut split = CostSplit::default();

    for entry in entries {
        if let Some(area) = area {
            if entry.source_area != area {
                continue;
            }
        }
        split.total += entry.amount;
        match entry.cost_kind {
            CostKind::Fixed => split.fixed += entry.amount,
            CostKind::Variable => split.variable += entry.amount,
        }
    }

    split
}

// ============================================================================
// FILTERS
// ============================================================================

/// The presentation layer's filter selection.
///
/// Empty constraint lists mean "everything"; several values for one field
/// are alternatives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub equals: Vec<(GroupField, Vec<String>)>,
    #[serde(default)]
    pub months: Vec<MonthToken>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(mut self, field: GroupField, values: Vec<String>) -> Self {
        if !values.is_empty() {
            self.equals.push((field, values));
        }
        self
    }

    pub fn with_value(self, field: GroupField, value: impl Into<String>) -> Self {
        self.with_values(field, vec![value.into()])
    }

    pub fn with_months(mut self, months: Vec<MonthToken>) -> Self {
        self.months = months;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.months.is_empty()
    }

    pub fn matches(&self, entry: &CanonicalEntry) -> bool {
        if !self.months.is_empty() && !self.months.contains(&entry.month) {
            return false;
        }
        self.equals.iter().all(|(field, values)| {
            let actual = field.value_of(entry);
            values.iter().any(|v| v == actual)
        })
    }

    pub fn apply(&self, entries: &[CanonicalEntry]) -> Vec<CanonicalEntry> {
        entries.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// Sorted distinct values of one field, for filter options
pub fn distinct_values(entries: &[CanonicalEntry], field: GroupField) -> Vec<String> {
    if field == GroupField::Month {
        let months: BTreeSet<MonthToken> = entries.iter().map(|e| e.month).collect();
        return months.into_iter().map(|m| m.code().to_string()).collect();
    }

    entries
        .iter()
        .map(|e| field.value_of(e).to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
