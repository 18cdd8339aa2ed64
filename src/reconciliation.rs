// ⚖️ Reconciliation Engine - planned spend vs. budget ceilings
//
// Following the formula:
//   variance = planned_total - budget_ceiling
//
// Outer join on the normalized type name: a type present on only one side is
// compared against zero, never dropped.

use crate::budget::BudgetLine;
use crate::entry::{CanonicalEntry, CostKind};
use crate::month::MonthToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Burn rate above this is Critical
pub const BURN_CRITICAL_ABOVE: f64 = 100.0;
/// Burn rate at or above this (and not Critical) is Warning
pub const BURN_WARNING_FROM: f64 = 90.0;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Planned spend exceeds the ceiling
    AboveBudget,
    BelowBudget,
    OnBudget,
}

impl BudgetStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BudgetStatus::AboveBudget => "Above budget",
            BudgetStatus::BelowBudget => "Below budget",
            BudgetStatus::OnBudget => "On budget",
        }
    }
}

impl std::fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub planned_total: f64,
    pub budget_ceiling: f64,
    pub variance: f64,
    pub status: BudgetStatus,
}

// ============================================================================
// BURN RATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BurnBand {
    Healthy,
    Warning,
    Critical,
}

impl BurnBand {
    pub fn from_rate(rate: f64) -> BurnBand {
        if rate > BURN_CRITICAL_ABOVE {
            BurnBand::Critical
        } else if rate >= BURN_WARNING_FROM {
            BurnBand::Warning
        } else {
            BurnBand::Healthy
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            BurnBand::Healthy => "🟢",
            BurnBand::Warning => "🟡",
            BurnBand::Critical => "🔴",
        }
    }
}

/// Percentage of the budget consumed; 0 when there is no budget
pub fn burn_rate(realized: f64, budgeted: f64) -> f64 {
    if budgeted > 0.0 {
        realized / budgeted * 100.0
    } else {
        0.0
    }
}

/// How far above (+) or below (-) budget, in percent; 0 when there is no budget
pub fn variance_percent(realized: f64, budgeted: f64) -> f64 {
    if budgeted > 0.0 {
        (realized - budgeted) / budgeted * 100.0
    } else {
        0.0
    }
}

/// Burn figures for one period (usually the current month)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBurn {
    pub month: MonthToken,
    pub realized: f64,
    pub budgeted: f64,
    pub rate: f64,
    pub band: BurnBand,
    pub variance_percent: f64,
}

impl PeriodBurn {
    pub fn summary(&self) -> String {
        let direction = if self.variance_percent > 0.0 {
            "above"
        } else if self.variance_percent < 0.0 {
            "below"
        } else {
            "on"
        };
        format!(
            "{} {}: {:.1}% of budget consumed, {:.1}% {} budget",
            self.band.icon(),
            self.month,
            self.rate,
            self.variance_percent.abs(),
            direction
        )
    }
}

pub fn period_burn(realized: f64, budgeted: f64, month: MonthToken) -> PeriodBurn {
    let rate = burn_rate(realized, budgeted);
    PeriodBurn {
        month,
        realized,
        budgeted,
        rate,
        band: BurnBand::from_rate(rate),
        variance_percent: variance_percent(realized, budgeted),
    }
}

// ============================================================================
// JOIN INPUTS
// ============================================================================

/// Trim, collapse internal whitespace, case-fold
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Planned totals per type, first-seen spelling kept for display
pub fn planned_totals_by_type(
    entries: &[CanonicalEntry],
    cost_kind: Option<CostKind>,
) -> Vec<(String, f64)> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if cost_kind.is_some_and(|kind| entry.cost_kind != kind) {
            continue;
        }
        let key = normalize_key(&entry.kind);
        match index.get(&key) {
            Some(&pos) => totals[pos].1 += entry.amount,
            None => {
                index.insert(key, totals.len());
                totals.push((entry.kind.trim().to_string(), entry.amount));
            }
        }
    }

    totals
}

/// Budget ceilings per type. `months` restricts monthly budgets to a period;
/// annual budgets are always taken whole.
pub fn budget_totals_by_type(
    lines: &[BudgetLine],
    cost_kind: Option<CostKind>,
    months: &[MonthToken],
) -> Vec<(String, f64)> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for line in lines {
        if cost_kind.is_some_and(|kind| line.cost_kind != kind) {
            continue;
        }
        let amount = line.amounts.total_for(months);
        let key = normalize_key(&line.kind);
        match index.get(&key) {
            Some(&pos) => totals[pos].1 += amount,
            None => {
                index.insert(key, totals.len());
                totals.push((line.kind.trim().to_string(), amount));
            }
        }
    }

    totals
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub records: Vec<ComparisonRecord>,
    pub total_planned: f64,
    pub total_budget: f64,
    pub above_count: usize,
    pub below_count: usize,
    pub on_budget_count: usize,
    pub reconciled_at: chrono::DateTime<chrono::Utc>,
}

impl ReconciliationReport {
    pub fn total_variance(&self) -> f64 {
        self.total_planned - self.total_budget
    }

    pub fn over_budget(&self) -> Vec<&ComparisonRecord> {
        self.records
            .iter()
            .filter(|r| r.status == BudgetStatus::AboveBudget)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} types, planned {:.2}, budget {:.2}, variance {:.2} ({} above, {} below, {} on budget)",
            self.records.len(),
            self.total_planned,
            self.total_budget,
            self.total_variance(),
            self.above_count,
            self.below_count,
            self.on_budget_count
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// |variance| at or below this counts as OnBudget (default: half a cent)
    pub tolerance: f64,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine { tolerance: 0.005 }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        ReconciliationEngine {
            tolerance: tolerance.abs(),
        }
    }

    pub fn status_of(&self, variance: f64) -> BudgetStatus {
        if variance.abs() <= self.tolerance {
            BudgetStatus::OnBudget
        } else if variance > 0.0 {
            BudgetStatus::AboveBudget
        } else {
            BudgetStatus::BelowBudget
        }
    }

    /// Full outer join of planned totals against budget ceilings.
    ///
    /// Output order: planned types in input order, then budget-only types in
    /// input order. Duplicate spellings of one type on the same side are summed.
    pub fn reconcile(
        &self,
        planned_by_type: &[(String, f64)],
        budget_by_type: &[(String, f64)],
    ) -> Vec<ComparisonRecord> {
        // (display name, planned, budget)
        let mut joined: Vec<(String, f64, f64)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (name, amount) in planned_by_type {
            let key = normalize_key(name);
            match index.get(&key) {
                Some(&pos) => joined[pos].1 += amount,
                None => {
                    index.insert(key, joined.len());
                    joined.push((name.trim().to_string(), *amount, 0.0));
                }
            }
        }

        for (name, amount) in budget_by_type {
            let key = normalize_key(name);
            match index.get(&key) {
                Some(&pos) => joined[pos].2 += amount,
                None => {
                    index.insert(key, joined.len());
                    joined.push((name.trim().to_string(), 0.0, *amount));
                }
            }
        }

        joined
            .into_iter()
            .map(|(kind, planned_total, budget_ceiling)| {
                let variance = planned_total - budget_ceiling;
                ComparisonRecord {
                    kind,
                    planned_total,
                    budget_ceiling,
                    variance,
                    status: self.status_of(variance),
                }
            })
            .collect()
    }

    /// Reconcile and wrap the result with totals and status counts
    pub fn report(
        &self,
        planned_by_type: &[(String, f64)],
        budget_by_type: &[(String, f64)],
    ) -> ReconciliationReport {
        let records = self.reconcile(planned_by_type, budget_by_type);
        let count = |status: BudgetStatus| records.iter().filter(|r| r.status == status).count();

        ReconciliationReport {
            total_planned: records.iter().map(|r| r.planned_total).sum(),
            total_budget: records.iter().map(|r| r.budget_ceiling).sum(),
            above_count: count(BudgetStatus::AboveBudget),
            below_count: count(BudgetStatus::BelowBudget),
            on_budget_count: count(BudgetStatus::OnBudget),
            records,
            reconciled_at: chrono::Utc::now(),
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact reconcile: any amount over the ceiling is AboveBudget.
/// Use a `ReconciliationEngine` for a cent tolerance.
pub fn reconcile(
    planned_by_type: &[(String, f64)],
    budget_by_type: &[(String, f64)],
) -> Vec<ComparisonRecord> {
    ReconciliationEngine::with_tolerance(0.0).reconcile(planned_by_type, budget_by_type)
}

// ============================================================================
// TESTS
// ============================================================================
