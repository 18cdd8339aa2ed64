// Budget Pipeline - CLI
// Loads every configured source, then prints one view of the fact table.

use anyhow::{bail, Context, Result};
use budget_pipeline::{
    distinct_values, report, CostKind, EntryFilter, GroupField, MonthToken, Pipeline,
    PipelineConfig, PipelineOutcome, TableCache,
};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "budget-pipeline",
    version,
    about = "Normalizes budget sheets and reconciles planned spend against budget"
)]
struct Cli {
    /// Pipeline config (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Workbook or CSV directory to read with the standard sheet layout
    #[arg(long, conflicts_with = "config")]
    source: Option<PathBuf>,

    /// Sheets to read from --source (repeatable; default: every sheet)
    #[arg(long = "sheet")]
    sheets: Vec<String>,

    /// Log pipeline progress to stderr
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    area: Vec<String>,
    #[arg(long)]
    project: Vec<String>,
    #[arg(long)]
    category: Vec<String>,
    /// Budget type ("Google Ads", "Produção"...)
    #[arg(long = "type")]
    kind: Vec<String>,
    #[arg(long)]
    brand: Vec<String>,
    #[arg(long)]
    cost_center: Vec<String>,
    #[arg(long)]
    pillar: Vec<String>,
    /// fixed or variable (Fixo / Variável accepted)
    #[arg(long, value_parser = parse_cost_kind)]
    cost_kind: Vec<CostKind>,
    /// Month names in any accepted spelling (Jan, Fev, Março...)
    #[arg(long)]
    month: Vec<MonthToken>,
}

impl FilterArgs {
    fn to_filter(&self) -> EntryFilter {
        EntryFilter::new()
            .with_values(GroupField::SourceArea, self.area.clone())
            .with_values(GroupField::Project, self.project.clone())
            .with_values(GroupField::Category, self.category.clone())
            .with_values(GroupField::Type, self.kind.clone())
            .with_values(GroupField::Brand, self.brand.clone())
            .with_values(GroupField::CostCenter, self.cost_center.clone())
            .with_values(GroupField::Pillar, self.pillar.clone())
            .with_values(
                GroupField::CostKind,
                self.cost_kind.iter().map(|k| k.as_str().to_string()).collect(),
            )
            .with_months(self.month.clone())
    }
}

fn parse_cost_kind(text: &str) -> std::result::Result<CostKind, String> {
    CostKind::parse(text).ok_or_else(|| format!("expected fixed or variable, got '{}'", text))
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Totals, fixed/variable split and totals per area
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Largest projects by planned spend
    Ranking {
        #[arg(long)]
        top: Option<usize>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Planned spend per month
    Monthly {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Planned spend per type against budget ceilings
    Compare {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Burn rate of one month (default: current month)
    Burn {
        #[arg(long)]
        month: Option<MonthToken>,
    },
    /// Project calendar
    Calendar {
        #[arg(long)]
        month: Vec<MonthToken>,
    },
    /// Available filter values
    Filters,
    /// Write the fact table (or the budget comparison) as CSV
    Export {
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long)]
        comparison: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Warnings collected while loading sources
    Diagnostics,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let pipeline = Pipeline::new(config);
    let mut cache = TableCache::new();
    let outcome = pipeline.run(&mut cache);

    if outcome.stats.sources_loaded == 0 && outcome.budget_lines.is_empty() {
        eprintln!("{}", report::diagnostics(&outcome.diagnostics));
        bail!("no source could be loaded");
    }

    run_command(&cli.command, &pipeline, &outcome)?;

    let critical = outcome
        .diagnostics
        .iter()
        .filter(|d| d.severity == budget_pipeline::Severity::Critical)
        .count();
    if critical > 0 && !matches!(cli.command, Command::Diagnostics) {
        eprintln!("⚠️  {} source(s) skipped; run `diagnostics` for details", critical);
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    if let Some(path) = &cli.config {
        return PipelineConfig::load(path);
    }
    let Some(path) = &cli.source else {
        bail!("pass --config <file> or --source <workbook>");
    };

    let sheets = if cli.sheets.is_empty() {
        budget_pipeline::open_source(path)?
            .sheet_names()
            .with_context(|| format!("Failed to list sheets of {}", path.display()))?
    } else {
        cli.sheets.clone()
    };
    let config = PipelineConfig::for_path(path, &sheets);
    config.validate()?;
    Ok(config)
}

fn run_command(command: &Command, pipeline: &Pipeline, outcome: &PipelineOutcome) -> Result<()> {
    match command {
        Command::Summary { filter } => {
            let facts = filter.to_filter().apply(&outcome.facts);
            println!("📊 Budget overview ({} entries)\n", facts.len());
            print!("{}", report::overview(&facts, None));
        }
        Command::Ranking { top, filter } => {
            let facts = filter.to_filter().apply(&outcome.facts);
            let n = top.unwrap_or(pipeline.config().top_n);
            println!("🏆 Top {} projects\n", n);
            print!("{}", report::ranking(&facts, n));
        }
        Command::Monthly { filter } => {
            let facts = filter.to_filter().apply(&outcome.facts);
            println!("📅 Planned spend per month\n");
            print!("{}", report::monthly(&facts));
        }
        Command::Compare { filter } => {
            let selection = filter.to_filter();
            // Budgets are split by cost kind only when exactly one is selected
            let cost_kind = match filter.cost_kind.as_slice() {
                [kind] => Some(*kind),
                _ => None,
            };
            let result = outcome.compare_budget(
                &pipeline.engine(),
                cost_kind,
                &selection.months,
                &selection,
            );
            let label = cost_kind.map(|k| k.to_string()).unwrap_or_else(|| "All".to_string());
            println!("⚖️  Budget comparison ({})\n", label);
            print!("{}", report::comparison(&result));
        }
        Command::Burn { month } => {
            let month = month.unwrap_or_else(MonthToken::current);
            let burn = if outcome.realized.is_empty() {
                outcome.budget_burn(month)
            } else {
                outcome.realized_burn(month)
            };
            println!("🔥 {}", burn.summary());
        }
        Command::Calendar { month } => {
            let rows: Vec<_> = outcome
                .calendar
                .iter()
                .filter(|row| month.is_empty() || row.months.iter().any(|m| month.contains(m)))
                .cloned()
                .collect();
            println!("📅 Project calendar ({} projects)\n", rows.len());
            print!("{}", report::calendar(&rows));
        }
        Command::Filters => {
            for field in [
                GroupField::SourceArea,
                GroupField::Project,
                GroupField::Category,
                GroupField::Brand,
                GroupField::CostCenter,
                GroupField::Pillar,
                GroupField::Month,
            ] {
                let values = distinct_values(&outcome.facts, field);
                println!("{:?}: {}", field, values.join(" | "));
            }
        }
        Command::Export {
            output,
            comparison,
            filter,
        } => {
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let writer = BufWriter::new(file);
            let selection = filter.to_filter();
            if *comparison {
                let result =
                    outcome.compare_budget(&pipeline.engine(), None, &selection.months, &selection);
                report::write_comparison_csv(writer, &result.records)?;
                println!("✓ Wrote {} comparison rows to {}", result.records.len(), output.display());
            } else {
                let facts = selection.apply(&outcome.facts);
                report::write_facts_csv(writer, &facts)?;
                println!("✓ Wrote {} entries to {}", facts.len(), output.display());
            }
        }
        Command::Diagnostics => {
            let stats = &outcome.stats;
            println!(
                "🔍 {} source(s) loaded, {} failed, {} rows mapped",
                stats.sources_loaded, stats.sources_failed, stats.rows_mapped
            );
            println!(
                "   {} empty cells skipped, {} cells from incomplete rows dropped, {} amounts counted as zero\n",
                stats.dropped_missing, stats.dropped_incomplete, stats.coerced_to_zero
            );
            print!("{}", report::diagnostics(&outcome.diagnostics));
        }
    }
    Ok(())
}
