//! Healthcare staffing analytics over pre-aggregated warehouse views.
//!
//! The library holds the analytics layer ([`analytics`]), the warehouse
//! adapter ([`warehouse`]) and [`config`]; this file defines the `staffing`
//! CLI on top of them.

pub mod analytics;
pub mod config;
pub mod warehouse;

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use analytics::bucketing::{self, MonthBounds, month_label, parse_user_date};
use analytics::cache::ResultCache;
use analytics::catalog::{self, Catalog, QueryTemplate, TemplateArgs};
use analytics::export;
use analytics::reports::{
    self, BedView, FailureKind, HoursView, RankBy, Report, ReportOptions, Section, SectionOutcome,
    VariabilityMetric,
};
use analytics::transform::KpiSummary;
use analytics::types::{AnalyticsError, FilterState, ResultTable, Value};
use config::{Config, ConfigError};
use warehouse::{Dialect, RetrievalError, SqliteWarehouse};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
#[command(
    name = "staffing",
    version,
    about = "Staffing, occupancy and utilization reports over warehouse gold views"
)]
pub struct Cli {
    /// Machine-readable JSON on stdout; errors as a JSON envelope on stderr
    #[arg(long, global = true)]
    pub json: bool,

    /// Restrict to a state (repeatable). Defaults to the first six states
    #[arg(long = "state", value_name = "STATE", global = true)]
    pub states: Vec<String>,

    /// Restrict to a facility CCN (repeatable)
    #[arg(long = "facility", value_name = "CCN", global = true)]
    pub facilities: Vec<String>,

    /// First month of the window (YYYY-MM-DD or YYYY-MM)
    #[arg(long, value_parser = parse_date_arg, global = true)]
    pub start: Option<NaiveDate>,

    /// Last month of the window (YYYY-MM-DD or YYYY-MM)
    #[arg(long, value_parser = parse_date_arg, global = true)]
    pub end: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List every state with data
    States,
    /// List facilities in the selected states
    Facilities,
    /// Show the earliest and latest month with data and the default window
    Bounds,
    /// Print the SQL a query template renders for the current filters
    Sql {
        /// Template id, e.g. facility_hprd or bed_utilization
        template: QueryTemplate,
        /// Month for single-month templates
        #[arg(long, value_parser = parse_date_arg)]
        month: Option<NaiveDate>,
        /// State override for state-grain templates (repeatable)
        #[arg(long = "local-state", value_name = "STATE")]
        local_states: Vec<String>,
        /// SQL dialect to render (sqlite or ansi); defaults to STAFFING_SQL_DIALECT
        #[arg(long)]
        dialect: Option<Dialect>,
    },
    /// Build one report section
    Report(ReportArgs),
    /// Build every section and print a per-section status summary
    Dashboard {
        /// Row limit for ranked views
        #[arg(long)]
        top_n: Option<usize>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Section id: facility_hprd, state_hprd, total_hours, perm_contract,
    /// bed_utilization, staffing_occupancy
    pub section: Section,

    /// View mode (total_hours: facility_summary, state_ranked, state_dumbbell;
    /// bed_utilization: ranked, variability, dumbbell)
    #[arg(long)]
    pub view: Option<String>,

    /// Row limit for ranked views
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Month for single-month views; defaults to the latest available
    #[arg(long, value_parser = parse_date_arg)]
    pub month: Option<NaiveDate>,

    /// Page of the display table, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Permanent-vs-contract ordering (contract_share or total_hours)
    #[arg(long)]
    pub rank_by: Option<RankBy>,

    /// Variability metric (std_dev or spread)
    #[arg(long)]
    pub variability: Option<VariabilityMetric>,

    /// State override for state-grain views (repeatable)
    #[arg(long = "local-state", value_name = "STATE")]
    pub local_states: Vec<String>,

    /// Write the full table as CSV; without PATH writes <staging>/<export_key>.csv
    #[arg(long, num_args = 0..=1, value_name = "PATH")]
    pub export: Option<Option<PathBuf>>,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_user_date(s).ok_or_else(|| format!("expected YYYY-MM-DD or YYYY-MM, got '{s}'"))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

pub const EXIT_OTHER: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_RETRIEVAL: i32 = 3;

/// Error surfaced by the binary: an exit code plus the fields of the JSON
/// error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_OTHER,
            kind: "usage",
            message: message.into(),
            hint: Some("run `staffing --help` for usage".to_string()),
            retryable: false,
        }
    }

    fn other(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            code: EXIT_OTHER,
            kind,
            message: message.into(),
            hint: None,
            retryable: false,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        let hint = match &e {
            ConfigError::Missing(name) => format!("set {name} in the environment or in .env"),
            ConfigError::Invalid { name, .. } => format!("fix or unset {name}"),
        };
        Self {
            code: EXIT_CONFIG,
            kind: "config",
            message: e.to_string(),
            hint: Some(hint),
            retryable: false,
        }
    }
}

impl From<RetrievalError> for CliError {
    fn from(e: RetrievalError) -> Self {
        Self {
            code: EXIT_RETRIEVAL,
            kind: "retrieval",
            message: e.to_string(),
            hint: Some(format!(
                "check that {} points at a readable warehouse mirror",
                config::ENV_WAREHOUSE_PATH
            )),
            retryable: true,
        }
    }
}

impl From<AnalyticsError> for CliError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::Retrieval(r) => r.into(),
            AnalyticsError::InvalidArgument(m) => Self::usage(m),
            AnalyticsError::Export(m) => Self::other("export", m),
            other => Self::other("data", other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ParsedCli {
    pub cli: Cli,
}

/// Parse raw process arguments. Help and version requests print and exit.
pub fn parse_cli(raw_args: Vec<String>) -> Result<ParsedCli, CliError> {
    match Cli::try_parse_from(raw_args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => Err(CliError::usage(e.to_string().trim_end())),
    }
}

/// Install the stderr `tracing` subscriber; `RUST_LOG` overrides the default
/// `warn` level. A second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Registry};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal()),
    );
    tracing::subscriber::set_global_default(subscriber).ok();
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    init_tracing();
    let cli = parsed.cli;
    let config = Config::from_env()?;
    tracing::debug!(
        target: "staffing::cli",
        warehouse = %config.warehouse_path.display(),
        ttl_secs = config.cache_ttl.as_secs(),
        percentile = %config.percentile,
        "configuration loaded"
    );
    let today = chrono::Local::now().date_naive();
    let out = Output { json: cli.json };

    match &cli.command {
        Commands::Sql {
            template,
            month,
            local_states,
            dialect,
        } => {
            let filter = offline_filter(&cli, today)?;
            let args = TemplateArgs {
                local_states: local_states.iter().cloned().collect(),
                month: *month,
            };
            let spec = catalog::render(*template, &filter, &args, dialect.unwrap_or(config.dialect))?;
            if out.json {
                out.emit_json(&spec)
            } else {
                println!("{}", spec.sql);
                Ok(())
            }
        }
        command => {
            let catalog = build_catalog(&config);
            let result = dispatch(&cli, command, &catalog, &config, today, &out);
            catalog.cache().log_stats();
            result
        }
    }
}

fn build_catalog(config: &Config) -> Catalog {
    let warehouse = Arc::new(SqliteWarehouse::new(&config.warehouse_path));
    let cache = Arc::new(ResultCache::new(config.cache_ttl));
    Catalog::new(warehouse, cache).with_percentile(config.percentile)
}

fn dispatch(
    cli: &Cli,
    command: &Commands,
    catalog: &Catalog,
    config: &Config,
    today: NaiveDate,
    out: &Output,
) -> Result<(), CliError> {
    match command {
        Commands::States => {
            let states = catalog.states()?;
            if out.json {
                return out.emit_json(&states);
            }
            for state in &states {
                println!("{state}");
            }
            Ok(())
        }
        Commands::Facilities => {
            let filter = resolve_filter(cli, catalog, today)?;
            let table = catalog.facilities(&filter.selected_states)?;
            if out.json {
                return out.emit_json(&*table);
            }
            for row in table.iter() {
                let text = |c: &str| row.get(c).map(Value::to_string).unwrap_or_default();
                println!(
                    "{}",
                    catalog::facility_label(&text("provider_name"), &text("ccn"), &text("state"))
                );
            }
            Ok(())
        }
        Commands::Bounds => {
            let bounds = catalog.month_bounds(today)?;
            let (start, end) = bucketing::default_window(&bounds);
            if out.json {
                return out.emit_json(&json!({
                    "bounds": bounds,
                    "default_window": { "start": start, "end": end },
                }));
            }
            print_bounds(&bounds, start, end);
            Ok(())
        }
        Commands::Report(args) => {
            let filter = resolve_filter(cli, catalog, today)?;
            let options = report_options(args)?;
            let outcome = reports::run_section(catalog, args.section, &filter, &options);
            run_report(args, outcome, config, out)
        }
        Commands::Dashboard { top_n } => {
            let filter = resolve_filter(cli, catalog, today)?;
            let options = ReportOptions {
                top_n: *top_n,
                ..ReportOptions::default()
            };
            let outcomes = reports::run_dashboard(catalog, &filter, &options);
            print_dashboard(&outcomes, config, out)
        }
        Commands::Sql { .. } => Err(CliError::other("internal", "sql is handled offline")),
    }
}

// ---------------------------------------------------------------------------
// Filter and option resolution
// ---------------------------------------------------------------------------

/// The global filter: explicit flags win, anything left unset falls back to
/// the dashboard's initial selection.
fn resolve_filter(cli: &Cli, catalog: &Catalog, today: NaiveDate) -> Result<FilterState, CliError> {
    let states: Vec<String> = if cli.states.is_empty() {
        catalog
            .states()?
            .into_iter()
            .take(catalog::DEFAULT_STATE_COUNT)
            .collect()
    } else {
        trimmed(&cli.states)
    };
    let (start, end) = match (cli.start, cli.end) {
        (Some(start), Some(end)) => (start, end),
        (start, end) => {
            let bounds = catalog.month_bounds(today)?;
            let (default_start, default_end) = bucketing::default_window(&bounds);
            (start.unwrap_or(default_start), end.unwrap_or(default_end))
        }
    };
    let filter = FilterState::new(states, trimmed(&cli.facilities), start, end)?;
    tracing::debug!(target: "staffing::cli", ?filter, "resolved filter");
    Ok(filter)
}

/// Filter built from flags alone, for rendering SQL without a warehouse.
/// Unset states mean every state; an unset window is the bootstrap window.
fn offline_filter(cli: &Cli, today: NaiveDate) -> Result<FilterState, CliError> {
    let bounds = bucketing::bootstrap_bounds(today);
    let (default_start, default_end) = bucketing::default_window(&bounds);
    Ok(FilterState::new(
        trimmed(&cli.states),
        trimmed(&cli.facilities),
        cli.start.unwrap_or(default_start),
        cli.end.unwrap_or(default_end),
    )?)
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn report_options(args: &ReportArgs) -> Result<ReportOptions, CliError> {
    let mut options = ReportOptions {
        top_n: args.top_n,
        month: args.month,
        page: args.page.saturating_sub(1),
        local_states: trimmed(&args.local_states).into_iter().collect::<BTreeSet<_>>(),
        ..ReportOptions::default()
    };
    if let Some(rank_by) = args.rank_by {
        options.rank_by = rank_by;
    }
    if let Some(metric) = args.variability {
        options.variability = metric;
    }
    if let Some(view) = &args.view {
        match args.section {
            Section::TotalHours => {
                options.hours_view = view.parse::<HoursView>().map_err(CliError::usage)?;
            }
            Section::BedUtilization => {
                options.bed_view = view.parse::<BedView>().map_err(CliError::usage)?;
            }
            other => {
                return Err(CliError::usage(format!(
                    "section '{}' has no view modes",
                    other.id()
                )));
            }
        }
    }
    Ok(options)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

struct Output {
    json: bool,
}

impl Output {
    fn emit_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), CliError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| CliError::other("output", e.to_string()))?;
        println!("{text}");
        Ok(())
    }
}

fn run_report(
    args: &ReportArgs,
    outcome: SectionOutcome,
    config: &Config,
    out: &Output,
) -> Result<(), CliError> {
    if let SectionOutcome::Failed { kind, message } = &outcome {
        return Err(match kind {
            FailureKind::Retrieval => CliError {
                code: EXIT_RETRIEVAL,
                kind: "retrieval",
                message: message.clone(),
                hint: None,
                retryable: true,
            },
            FailureKind::Data => CliError::other("data", message.clone()),
        });
    }

    let exported = match (&outcome, &args.export) {
        (SectionOutcome::Ready(report), Some(target)) if report.notice.is_none() => {
            let path = target.clone().unwrap_or_else(|| {
                config
                    .export_dir()
                    .join(export::export_file_name(report.export_key))
            });
            Some(export::export_to_path(&report.table, &path)?)
        }
        _ => None,
    };

    if out.json {
        return out.emit_json(&json!({
            "section": args.section.id(),
            "outcome": outcome,
            "exported_to": exported,
        }));
    }

    match &outcome {
        SectionOutcome::Ready(report) => print_report(report),
        SectionOutcome::Empty { message } => println!("{message}"),
        SectionOutcome::Failed { .. } => {}
    }
    if let Some(path) = exported {
        println!("Exported to {}", path.display());
    }
    println!("{}", config.footer());
    Ok(())
}

fn print_dashboard(
    outcomes: &[(Section, SectionOutcome)],
    config: &Config,
    out: &Output,
) -> Result<(), CliError> {
    if out.json {
        let sections: Vec<_> = outcomes
            .iter()
            .map(|(section, outcome)| {
                let (rows, message) = match outcome {
                    SectionOutcome::Ready(report) => {
                        (Some(report.table.len()), report.notice.as_deref())
                    }
                    SectionOutcome::Empty { message } | SectionOutcome::Failed { message, .. } => {
                        (None, Some(message.as_str()))
                    }
                };
                json!({
                    "section": section.id(),
                    "status": outcome.status(),
                    "rows": rows,
                    "message": message,
                })
            })
            .collect();
        return out.emit_json(&sections);
    }

    for (section, outcome) in outcomes {
        let detail = match outcome {
            SectionOutcome::Ready(report) => match &report.notice {
                Some(notice) => notice.clone(),
                None => format!("{} rows", report.table.len()),
            },
            SectionOutcome::Empty { message } | SectionOutcome::Failed { message, .. } => {
                message.clone()
            }
        };
        println!("{:<20} {:<7} {detail}", section.id(), outcome.status());
    }
    println!("{}", config.footer());
    Ok(())
}

fn print_bounds(bounds: &MonthBounds, start: NaiveDate, end: NaiveDate) {
    if bounds.bootstrapped {
        println!("No monthly data; using the bootstrap window.");
    }
    println!(
        "Months with data: {} .. {}",
        month_label(bounds.min),
        month_label(bounds.max)
    );
    println!("Default window:   {start} .. {end}");
}

fn print_report(report: &Report) {
    println!("== {} ==", report.title);
    if let Some(month) = report.month {
        println!("Month: {}", month_label(month));
    }
    for kpi in &report.kpis {
        println!("{}", format_kpi(kpi));
    }
    println!();
    match &report.notice {
        Some(notice) => println!("{notice}"),
        None => print!("{}", render_table(&report.page.table)),
    }
    if report.page.paginated {
        println!(
            "Page {} of {} ({} rows)",
            report.page.page_number + 1,
            report.page.page_count,
            report.page.total_rows
        );
    }
    if let Some(map) = &report.map {
        println!(
            "Map: {} points for {} centered at ({:.3}, {:.3})",
            map.points.len(),
            month_label(map.month),
            map.center_lat,
            map.center_lon
        );
    }
    for warning in &report.warnings {
        println!(
            "warning: {} value(s) in '{}' could not be parsed",
            warning.failures, warning.column
        );
    }
}

fn format_kpi(kpi: &KpiSummary) -> String {
    let stat = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "n/a".into());
    let mut line = format!(
        "{}: count {} • mean {} • median {} • min {} • max {} • p90 {}",
        kpi.column,
        kpi.count,
        stat(kpi.mean),
        stat(kpi.median),
        stat(kpi.min),
        stat(kpi.max),
        stat(kpi.p90)
    );
    for (label, value) in &kpi.extras {
        line.push_str(&format!(" • {label} {}", format_cell(value)));
    }
    line
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Number(n) if n.fract() != 0.0 => format!("{n:.2}"),
        other => other.to_string(),
    }
}

/// Left-aligned plain-text rendering with a header row.
fn render_table(table: &ResultTable) -> String {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(format_cell).collect())
        .collect();
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut text = padded_line(table.columns.iter(), &widths);
    for row in &cells {
        text.push_str(&padded_line(row.iter(), &widths));
    }
    text
}

fn padded_line<'a>(values: impl Iterator<Item = &'a String>, widths: &[usize]) -> String {
    let mut line = values
        .zip(widths)
        .map(|(v, &w)| format!("{v:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}
