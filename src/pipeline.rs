// 🔄 Pipeline - one configurable run over every source
//
//   raw tables → map_columns → melt → canonical facts
//   budget sheets → BudgetLines
//   calendar sheets → CalendarRows
//
// A failing source (unreadable, schema mismatch, remote error) contributes
// nothing and leaves a Critical diagnostic; its siblings keep loading.

use crate::aggregate::{grand_total, EntryFilter};
use crate::budget::{load_budget_lines, BudgetLine};
use crate::cache::TableCache;
use crate::calendar::{build_calendar, calendar_entries, CalendarEntry, CalendarRow};
use crate::config::{PipelineConfig, SheetSourceConfig, SourceRole};
use crate::entry::{CanonicalEntry, CostKind};
use crate::error::{Diagnostic, Result, Severity};
use crate::melt::melt;
use crate::month::MonthToken;
use crate::reconciliation::{
    budget_totals_by_type, period_burn, planned_totals_by_type, PeriodBurn, ReconciliationEngine,
    ReconciliationReport,
};
use crate::remote::{records_to_table, JsonPagesSource};
use crate::schema::{map_columns, SourceSchema};
use crate::sources::{open_source, CsvSource, SourceKind, TabularSource};
use crate::table::RawTable;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub sources_loaded: usize,
    pub sources_failed: usize,
    pub rows_mapped: usize,
    pub dropped_missing: usize,
    pub dropped_incomplete: usize,
    pub coerced_to_zero: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Planned spend
    pub facts: Vec<CanonicalEntry>,
    /// Realized spend, from sources configured with `role = "realized"`
    pub realized: Vec<CanonicalEntry>,
    pub budget_lines: Vec<BudgetLine>,
    pub calendar: Vec<CalendarRow>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RunStats,
}

impl PipelineOutcome {
    pub fn has_critical(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Critical)
    }

    /// Planned spend per type against budget ceilings for one cost kind.
    /// `months` empty = the whole year.
    pub fn compare_budget(
        &self,
        engine: &ReconciliationEngine,
        cost_kind: Option<CostKind>,
        months: &[MonthToken],
        filter: &EntryFilter,
    ) -> ReconciliationReport {
        let facts = filter
            .clone()
            .with_months(months.to_vec())
            .apply(&self.facts);
        let planned = planned_totals_by_type(&facts, cost_kind);
        let budget = budget_totals_by_type(&self.budget_lines, cost_kind, months);
        engine.report(&planned, &budget)
    }

    /// Realized spend of one month against what was planned for it
    pub fn realized_burn(&self, month: MonthToken) -> PeriodBurn {
        let in_month = EntryFilter::new().with_months(vec![month]);
        period_burn(
            grand_total(&in_month.apply(&self.realized)),
            grand_total(&in_month.apply(&self.facts)),
            month,
        )
    }

    /// Planned spend of one month against the budget ceiling for it.
    /// Annual budget figures are spread evenly over twelve months.
    pub fn budget_burn(&self, month: MonthToken) -> PeriodBurn {
        let planned = grand_total(&EntryFilter::new().with_months(vec![month]).apply(&self.facts));
        let budgeted: f64 = self
            .budget_lines
            .iter()
            .map(|line| {
                line.amounts
                    .for_month(month)
                    .unwrap_or_else(|| line.amounts.annual_total() / 12.0)
            })
            .sum();
        period_burn(planned, budgeted, month)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::with_tolerance(self.config.tolerance)
    }

    /// Map and melt one raw table; schema problems are errors, data problems
    /// are diagnostics.
    pub fn process_table(
        table: &RawTable,
        schema: &SourceSchema,
        stats: &mut RunStats,
    ) -> Result<(Vec<CanonicalEntry>, Vec<Diagnostic>)> {
        let mapped = map_columns(table, schema)?;
        let melted = melt(&mapped.rows, schema.number_format);

        stats.rows_mapped += mapped.rows.len();
        stats.dropped_missing += melted.dropped_missing;
        stats.dropped_incomplete += melted.dropped_incomplete;
        stats.coerced_to_zero += melted.coerced_to_zero;

        let mut diagnostics = mapped.diagnostics;
        diagnostics.extend(melted.diagnostics(&mapped.source));

        info!(
            source = %mapped.source,
            rows = mapped.rows.len(),
            entries = melted.entries.len(),
            dropped = melted.dropped_incomplete,
            "source melted"
        );
        Ok((melted.entries, diagnostics))
    }

    /// Run every configured source. Never fails: problems become diagnostics.
    pub fn run(&self, cache: &mut TableCache) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();
        let mut calendar_lines: Vec<CalendarEntry> = Vec::new();

        for source_config in &self.config.sources {
            let source = match open_sheet_source(source_config) {
                Ok(source) => source,
                Err(err) => {
                    warn!(error = %err, "source skipped");
                    outcome.stats.sources_failed += 1;
                    outcome.diagnostics.push(Diagnostic::from(&err));
                    continue;
                }
            };
            self.run_sheet_source(source.as_ref(), source_config, cache, &mut outcome, &mut calendar_lines);
        }

        for remote in &self.config.remotes {
            let source = JsonPagesSource::new(&remote.dir);
            for dataset in &remote.datasets {
                let result = cache.fetch_all(&source, &dataset.dataset).and_then(|records| {
                    if records.is_empty() && dataset.months.is_empty() {
                        return Ok((
                            Vec::new(),
                            vec![Diagnostic::info(&dataset.dataset, "dataset returned no records")],
                        ));
                    }
                    let (table, schema) = records_to_table(&dataset.dataset, &records, dataset);
                    Self::process_table(&table, &schema, &mut outcome.stats)
                });
                self.absorb(result, remote.role, &dataset.dataset, &mut outcome);
            }
        }

        outcome.calendar = build_calendar(&calendar_lines, &[]);

        info!(
            facts = outcome.facts.len(),
            realized = outcome.realized.len(),
            budget_lines = outcome.budget_lines.len(),
            calendar = outcome.calendar.len(),
            diagnostics = outcome.diagnostics.len(),
            "pipeline run complete"
        );
        outcome
    }

    fn run_sheet_source(
        &self,
        source: &dyn TabularSource,
        config: &SheetSourceConfig,
        cache: &mut TableCache,
        outcome: &mut PipelineOutcome,
        calendar_lines: &mut Vec<CalendarEntry>,
    ) {
        for sheet in &config.sheets {
            let schema = sheet.schema();
            let result = cache
                .read_sheet(source, &sheet.name)
                .and_then(|table| Self::process_table(&table, &schema, &mut outcome.stats));
            self.absorb(result, config.role, sheet.name.trim(), outcome);
        }

        for budget in &config.budgets {
            let result = cache
                .read_sheet(source, &budget.sheet)
                .and_then(|table| load_budget_lines(&table, budget));
            match result {
                Ok(lines) => outcome.budget_lines.extend(lines),
                Err(err) => {
                    warn!(sheet = %budget.sheet, error = %err, "budget sheet skipped");
                    outcome.diagnostics.push(Diagnostic::from(&err));
                }
            }
        }

        if let Some(calendar) = &config.calendar {
            let result = cache
                .read_sheet(source, &calendar.sheet)
                .and_then(|table| calendar_entries(&table, calendar));
            match result {
                Ok(lines) => calendar_lines.extend(lines),
                Err(err) => {
                    warn!(sheet = %calendar.sheet, error = %err, "calendar sheet skipped");
                    outcome.diagnostics.push(Diagnostic::from(&err));
                }
            }
        }
    }

    fn absorb(
        &self,
        result: Result<(Vec<CanonicalEntry>, Vec<Diagnostic>)>,
        role: SourceRole,
        name: &str,
        outcome: &mut PipelineOutcome,
    ) {
        match result {
            Ok((entries, diagnostics)) => {
                outcome.stats.sources_loaded += 1;
                outcome.diagnostics.extend(diagnostics);
                match role {
                    SourceRole::Planned => outcome.facts.extend(entries),
                    SourceRole::Realized => outcome.realized.extend(entries),
                }
            }
            Err(err) => {
                warn!(source = %name, error = %err, "source skipped");
                outcome.stats.sources_failed += 1;
                outcome.diagnostics.push(Diagnostic::from(&err));
            }
        }
    }
}

fn open_sheet_source(config: &SheetSourceConfig) -> Result<Box<dyn TabularSource>> {
    match (crate::sources::detect_source(&config.path)?, config.delimiter) {
        (SourceKind::CsvDirectory | SourceKind::CsvFile, Some(delimiter)) => Ok(Box::new(
            CsvSource::new(&config.path).with_delimiter(delimiter as u8),
        )),
        _ => open_source(&config.path),
    }
}
