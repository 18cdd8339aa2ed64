// Budget Pipeline - Core Library
// Normalizes heterogeneous budget sheets into one fact table and reconciles
// planned spend against budget ceilings. Used by the CLI, the API server and tests.

pub mod error;
pub mod month;          // Month Normalizer
pub mod numeric;        // Numeric Coercion
pub mod table;          // Raw tabular input
pub mod entry;          // Canonical model + validation
pub mod schema;         // Column Mapper
pub mod melt;           // Long-Format Transformer
pub mod aggregate;      // Aggregator
pub mod budget;         // Budget sheets
pub mod reconciliation; // Budget Reconciler
pub mod calendar;       // Project calendar
pub mod sources;        // CSV / workbook adapters
pub mod remote;         // Paginated remote records
pub mod cache;          // Memoizing source cache
pub mod config;
pub mod pipeline;
pub mod report;

// Re-export commonly used types
pub use error::{Diagnostic, PipelineError, Result, Severity};
pub use month::{normalize, recognized_months, MonthToken, ALL_MONTHS};
pub use numeric::{format_brl, parse_amount, to_number, to_number_with, NumberFormat};
pub use table::{CellValue, RawRecord, RawTable};
pub use entry::{
    validate_identity, CanonicalEntry, CanonicalField, CanonicalRow, CostKind, Identity,
    MonthCell, RowIssue,
};
pub use schema::{map_columns, MappedTable, MonthColumn, SourceSchema};
pub use melt::{melt, MeltOutput};
pub use aggregate::{
    aggregate, distinct_values, grand_total, monthly_series, sort_by_month, split_by_cost_kind,
    top_n, AggregateRow, CostSplit, EntryFilter, GroupField, DEFAULT_TOP_N,
};
pub use budget::{load_budget_lines, BudgetAmounts, BudgetLine, BudgetSchema};
pub use reconciliation::{
    budget_totals_by_type, burn_rate, normalize_key, period_burn, planned_totals_by_type,
    reconcile, variance_percent, BudgetStatus, BurnBand, ComparisonRecord, PeriodBurn,
    ReconciliationEngine, ReconciliationReport,
};
pub use calendar::{build_calendar, calendar_entries, CalendarEntry, CalendarRow, CalendarSchema};
pub use sources::{
    detect_source, open_source, CsvSource, MemorySource, SourceKind, TabularSource,
    WorkbookSource,
};
pub use remote::{
    fetch_all, parse_query_response, records_to_table, JsonPagesSource, PagedRecordSource,
    PropertyValue, RecordPage, RemoteRecord, RemoteSchema,
};
pub use cache::{CacheStats, TableCache};
pub use config::{PipelineConfig, SheetConfig, SheetSourceConfig, SourceRole};
pub use pipeline::{Pipeline, PipelineOutcome, RunStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
